pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod search;
pub mod state;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use crate::attachments::{AttachmentStore, LocalStore, RemoteStore};
use crate::config::{AppConfig, StorageConfig};
use crate::storage::S3Storage;

/// Builds the attachment store selected by configuration, creating the local
/// upload directory when needed.
pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn AttachmentStore>> {
    let policy = config.attachment_policy.clone();
    let store: Arc<dyn AttachmentStore> = match &config.storage {
        StorageConfig::Local { uploads_dir } => {
            Arc::new(LocalStore::open(uploads_dir.clone(), policy).await?)
        }
        StorageConfig::S3(settings) => {
            let client = s3::build_client(settings).await?;
            let storage = Arc::new(S3Storage::new(client, settings.bucket.clone()));
            Arc::new(
                RemoteStore::new(storage, settings.public_base_url.clone(), policy)
                    .with_deletion(settings.delete_objects),
            )
        }
    };
    Ok(store)
}
