use std::{env, path::PathBuf};

use anyhow::{bail, Context, Result};
use url::Url;

use crate::{attachments::UploadPolicy, db::DEFAULT_MAX_POOL_SIZE, search::SearchMode};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub max_upload_bytes: usize,
    pub cors_allowed_origin: Option<String>,
    pub search_mode: SearchMode,
    pub storage: StorageConfig,
    pub attachment_policy: UploadPolicy,
}

#[derive(Clone, Debug)]
pub enum StorageConfig {
    Local { uploads_dir: PathBuf },
    S3(S3Settings),
}

#[derive(Clone, Debug)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Prefix of every attachment URL, without a trailing slash.
    pub public_base_url: String,
    pub delete_objects: bool,
}

impl StorageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::Local { .. } => "local",
            StorageConfig::S3(_) => "s3",
        }
    }

    pub fn uploads_dir(&self) -> Option<&PathBuf> {
        match self {
            StorageConfig::Local { uploads_dir } => Some(uploads_dir),
            StorageConfig::S3(_) => None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL").unwrap_or_else(|| "oficios.db".to_string());
        let database_max_pool_size = var("DATABASE_MAX_POOL_SIZE")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = var("SERVER_PORT")
            .unwrap_or_else(|| "5000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(value) => value
                .parse()
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let cors_allowed_origin = var("CORS_ALLOWED_ORIGIN");
        let search_mode = if var("SEARCH_RAW_WILDCARDS").is_some_and(|v| parse_flag(&v)) {
            SearchMode::Pattern
        } else {
            SearchMode::Literal
        };

        let storage = match var("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageConfig::Local {
                uploads_dir: PathBuf::from(
                    var("UPLOAD_FOLDER").unwrap_or_else(|| "uploads".to_string()),
                ),
            },
            "s3" => StorageConfig::S3(s3_settings(&var)?),
            other => bail!("STORAGE_BACKEND must be `local` or `s3`, got `{other}`"),
        };

        let attachment_policy = match var("ATTACHMENT_EXTENSION_POLICY").as_deref() {
            Some("allow-list") => UploadPolicy::default(),
            Some("any") => UploadPolicy::AnyFile,
            Some(other) => {
                bail!("ATTACHMENT_EXTENSION_POLICY must be `allow-list` or `any`, got `{other}`")
            }
            None => match storage {
                StorageConfig::Local { .. } => UploadPolicy::default(),
                StorageConfig::S3(_) => UploadPolicy::AnyFile,
            },
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            max_upload_bytes,
            cors_allowed_origin,
            search_mode,
            storage,
            attachment_policy,
        })
    }
}

fn s3_settings(var: &dyn Fn(&str) -> Option<String>) -> Result<S3Settings> {
    let bucket = var("S3_BUCKET").context("S3_BUCKET must be set when STORAGE_BACKEND=s3")?;
    let access_key_id = var("AWS_ACCESS_KEY_ID")
        .context("AWS_ACCESS_KEY_ID must be set when STORAGE_BACKEND=s3")?;
    let secret_access_key = var("AWS_SECRET_ACCESS_KEY")
        .context("AWS_SECRET_ACCESS_KEY must be set when STORAGE_BACKEND=s3")?;
    let region = var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string());
    let endpoint_url = var("AWS_ENDPOINT_URL");
    let delete_objects = var("S3_DELETE_OBJECTS").is_some_and(|v| parse_flag(&v));

    let public_base_url = match var("S3_PUBLIC_BASE_URL") {
        Some(raw) => raw,
        None => match &endpoint_url {
            Some(endpoint) => format!("{}/{bucket}", endpoint.trim_end_matches('/')),
            None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
        },
    };
    let parsed = Url::parse(&public_base_url)
        .with_context(|| format!("invalid attachment base URL `{public_base_url}`"))?;
    if parsed.cannot_be_a_base() {
        bail!("attachment base URL `{public_base_url}` cannot be used as a prefix");
    }

    Ok(S3Settings {
        bucket,
        region,
        endpoint_url,
        access_key_id,
        secret_access_key,
        public_base_url: public_base_url.trim_end_matches('/').to_string(),
        delete_objects,
    })
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_storage_with_allow_list() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_url, "oficios.db");
        assert_eq!(config.server_port, 5000);
        assert_eq!(config.search_mode, SearchMode::Literal);
        assert_eq!(config.storage.kind(), "local");
        assert_eq!(
            config.storage.uploads_dir(),
            Some(&PathBuf::from("uploads"))
        );
        assert_eq!(config.attachment_policy, UploadPolicy::default());
    }

    #[test]
    fn s3_requires_all_three_credentials() {
        let err = load(&[
            ("STORAGE_BACKEND", "s3"),
            ("S3_BUCKET", "oficios"),
            ("AWS_ACCESS_KEY_ID", "key"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn s3_accepts_any_file_and_derives_public_url() {
        let config = load(&[
            ("STORAGE_BACKEND", "s3"),
            ("S3_BUCKET", "oficios"),
            ("AWS_ACCESS_KEY_ID", "key"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_REGION", "eu-west-1"),
        ])
        .unwrap();
        assert_eq!(config.attachment_policy, UploadPolicy::AnyFile);
        let StorageConfig::S3(settings) = config.storage else {
            panic!("expected s3 storage");
        };
        assert_eq!(
            settings.public_base_url,
            "https://oficios.s3.eu-west-1.amazonaws.com"
        );
        assert!(!settings.delete_objects);
    }

    #[test]
    fn custom_endpoint_uses_path_style_base_url() {
        let config = load(&[
            ("STORAGE_BACKEND", "s3"),
            ("S3_BUCKET", "oficios"),
            ("AWS_ACCESS_KEY_ID", "key"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_ENDPOINT_URL", "http://localhost:9000/"),
            ("S3_DELETE_OBJECTS", "true"),
        ])
        .unwrap();
        let StorageConfig::S3(settings) = config.storage else {
            panic!("expected s3 storage");
        };
        assert_eq!(settings.public_base_url, "http://localhost:9000/oficios");
        assert!(settings.delete_objects);
    }

    #[test]
    fn policy_and_search_mode_can_be_overridden() {
        let config = load(&[
            ("ATTACHMENT_EXTENSION_POLICY", "any"),
            ("SEARCH_RAW_WILDCARDS", "1"),
        ])
        .unwrap();
        assert_eq!(config.attachment_policy, UploadPolicy::AnyFile);
        assert_eq!(config.search_mode, SearchMode::Pattern);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(load(&[("STORAGE_BACKEND", "ftp")]).is_err());
    }
}
