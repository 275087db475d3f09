use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{secure_filename, AttachmentStore, Upload, UploadPolicy};
use crate::error::OficioError;
use crate::storage::ObjectStorage;

const KEY_PREFIX: &str = "oficios";
const FALLBACK_NAME: &str = "archivo";

/// Attachments uploaded to object storage, referenced by public URL.
pub struct RemoteStore {
    storage: Arc<dyn ObjectStorage>,
    public_base_url: String,
    policy: UploadPolicy,
    delete_objects: bool,
}

impl RemoteStore {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        public_base_url: impl Into<String>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            storage,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            policy,
            delete_objects: false,
        }
    }

    /// Lets deleted records take their objects with them. Off by default, in
    /// which case remote blobs outlive their records.
    pub fn with_deletion(mut self, enabled: bool) -> Self {
        self.delete_objects = enabled;
        self
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }

    fn key_for(&self, reference: &str) -> Option<String> {
        reference
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| key.starts_with(KEY_PREFIX) && !key.contains(".."))
            .map(str::to_string)
    }
}

#[async_trait]
impl AttachmentStore for RemoteStore {
    fn kind(&self) -> &'static str {
        "s3"
    }

    fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    async fn store(&self, upload: &Upload) -> Result<String, OficioError> {
        self.policy.check(&upload.filename)?;

        let mut name = secure_filename(&upload.filename);
        if name.is_empty() {
            name = FALLBACK_NAME.to_string();
        }
        let key = format!("{KEY_PREFIX}/{}/{name}", Uuid::new_v4());
        let content_type = upload.content_type.clone().or_else(|| {
            mime_guess::from_path(&name)
                .first()
                .map(|mime| mime.essence_str().to_string())
        });

        self.storage
            .put_object(
                &key,
                upload.bytes.clone(),
                content_type,
                inline_content_disposition(&upload.filename),
            )
            .await
            .map_err(OficioError::StorageUnavailable)?;

        Ok(self.url_for(&key))
    }

    fn supports_deletion(&self) -> bool {
        self.delete_objects
    }

    async fn delete(&self, reference: &str) -> Result<(), OficioError> {
        let key = self
            .key_for(reference)
            .ok_or_else(|| OficioError::AttachmentNotFound(reference.to_string()))?;
        self.storage
            .delete_object(&key)
            .await
            .map_err(OficioError::StorageUnavailable)
    }

    async fn check(&self) -> Result<(), OficioError> {
        self.storage
            .head_bucket()
            .await
            .map_err(OficioError::StorageUnavailable)
    }
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    let ascii_fallback: String = sanitized
        .chars()
        .map(|ch| if ch.is_ascii() { ch } else { '_' })
        .collect();
    Some(format!(
        "inline; filename=\"{ascii_fallback}\"; filename*=UTF-8''{encoded}"
    ))
}
