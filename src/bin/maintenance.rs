use std::collections::HashSet;
use std::env;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use oficios::{
    attachments::{remove_attachments, AttachmentStore, LocalStore},
    config::{AppConfig, StorageConfig},
    db, repository,
};

const USAGE: &str = "Usage: maintenance <migrate|prune-uploads>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate()?,
        Some("prune-uploads") => prune_uploads().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn migrate() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.database_url,
        "applying pending migrations"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    db::run_migrations(&mut conn)?;
    println!("Database is up to date.");
    Ok(())
}

/// Removes files in the upload directory that no oficio references anymore,
/// e.g. attachments dropped from a record while editing it.
async fn prune_uploads() -> Result<()> {
    let config = AppConfig::from_env()?;
    let StorageConfig::Local { uploads_dir } = &config.storage else {
        bail!("prune-uploads only applies to STORAGE_BACKEND=local");
    };
    tracing::info!(
        component = "maintenance",
        database_url = %config.database_url,
        uploads_dir = %uploads_dir.display(),
        "pruning unreferenced uploads"
    );

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let referenced: HashSet<String> = {
        let mut conn = pool.get().context("failed to get database connection")?;
        repository::all_references(&mut conn)?.into_iter().collect()
    };

    let store = LocalStore::new(uploads_dir.clone(), config.attachment_policy.clone());
    let mut orphans = Vec::new();
    let mut entries = tokio::fs::read_dir(store.root())
        .await
        .with_context(|| format!("failed to read {}", uploads_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !referenced.contains(&name) {
            orphans.push(name);
        }
    }

    if orphans.is_empty() {
        println!("No unreferenced uploads found.");
        return Ok(());
    }

    println!("Deleting {} unreferenced uploads…", orphans.len());
    let failures = remove_attachments(&store as &dyn AttachmentStore, &orphans).await;
    for failure in &failures {
        eprintln!("Failed to delete {}: {}", failure.reference, failure.error);
    }
    println!("Deleted {} uploads.", orphans.len() - failures.len());
    Ok(())
}
