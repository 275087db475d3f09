use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs;

use super::{secure_filename, AttachmentStore, Upload, UploadPolicy};
use crate::error::OficioError;

/// Attachments kept as files in a single directory, referenced by filename.
///
/// A second upload with the same sanitized name replaces the earlier file.
pub struct LocalStore {
    root: PathBuf,
    policy: UploadPolicy,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, policy: UploadPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// Creates the upload directory if it does not exist yet.
    pub async fn open(root: impl Into<PathBuf>, policy: UploadPolicy) -> anyhow::Result<Self> {
        let store = Self::new(root, policy);
        fs::create_dir_all(&store.root)
            .await
            .with_context(|| format!("failed to create upload directory {}", store.root.display()))?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a reference, or `None` if the reference is not a plain
    /// sanitized filename.
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        if reference.is_empty() || secure_filename(reference) != reference {
            return None;
        }
        Some(self.root.join(reference))
    }
}

#[async_trait]
impl AttachmentStore for LocalStore {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    async fn store(&self, upload: &Upload) -> Result<String, OficioError> {
        self.policy.check(&upload.filename)?;

        let filename = secure_filename(&upload.filename);
        if filename.is_empty() {
            return Err(OficioError::UploadRejected {
                filename: upload.filename.clone(),
                reason: "filename has no usable characters".to_string(),
            });
        }

        let path = self.root.join(&filename);
        fs::write(&path, &upload.bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
            .map_err(OficioError::StorageUnavailable)?;
        Ok(filename)
    }

    fn supports_deletion(&self) -> bool {
        true
    }

    async fn delete(&self, reference: &str) -> Result<(), OficioError> {
        let path = self
            .resolve(reference)
            .ok_or_else(|| OficioError::AttachmentNotFound(reference.to_string()))?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(OficioError::AttachmentNotFound(reference.to_string()))
            }
            Err(err) => Err(OficioError::StorageUnavailable(
                anyhow::Error::new(err).context(format!("failed to remove {}", path.display())),
            )),
        }
    }

    async fn check(&self) -> Result<(), OficioError> {
        let metadata = fs::metadata(&self.root)
            .await
            .with_context(|| format!("upload directory {} is missing", self.root.display()))
            .map_err(OficioError::StorageUnavailable)?;
        if !metadata.is_dir() {
            return Err(OficioError::StorageUnavailable(anyhow::anyhow!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}
