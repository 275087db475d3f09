//! Attachment storage: save an uploaded blob, get back a stable reference.
//!
//! Two backends implement [`AttachmentStore`]: [`LocalStore`] keeps files in a
//! directory and answers with the sanitized filename, [`RemoteStore`] uploads
//! to S3-compatible object storage and answers with a URL. What each accepts
//! is decided by the [`UploadPolicy`] it is constructed with.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::OficioError;

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "png", "jpg", "jpeg", "gif", "doc", "docx", "xls", "xlsx",
];

/// A file part received from a form submission.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPolicy {
    /// Only filenames whose last extension (lowercased) is listed.
    AllowList(Vec<String>),
    AnyFile,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::allow_list(DEFAULT_ALLOWED_EXTENSIONS.iter().copied())
    }
}

impl UploadPolicy {
    pub fn allow_list<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::AllowList(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        )
    }

    pub fn allowed_extensions(&self) -> Option<&[String]> {
        match self {
            Self::AllowList(extensions) => Some(extensions.as_slice()),
            Self::AnyFile => None,
        }
    }

    pub fn check(&self, filename: &str) -> Result<(), OficioError> {
        let Self::AllowList(extensions) = self else {
            return Ok(());
        };
        let reject = |reason: &str| OficioError::UploadRejected {
            filename: filename.to_string(),
            reason: reason.to_string(),
        };
        let (_, extension) = filename
            .rsplit_once('.')
            .ok_or_else(|| reject("filename has no extension"))?;
        let extension = extension.to_lowercase();
        if extensions.iter().any(|allowed| *allowed == extension) {
            Ok(())
        } else {
            Err(reject(&format!("extension .{extension} is not allowed")))
        }
    }
}

#[async_trait]
pub trait AttachmentStore: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn kind(&self) -> &'static str;

    fn policy(&self) -> &UploadPolicy;

    /// Validates `upload` against [`Self::policy`] and persists it.
    async fn store(&self, upload: &Upload) -> Result<String, OficioError>;

    fn supports_deletion(&self) -> bool;

    async fn delete(&self, reference: &str) -> Result<(), OficioError>;

    /// Readiness check used by the health endpoint.
    async fn check(&self) -> Result<(), OficioError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadWarning {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct StoredUploads {
    pub references: Vec<String>,
    pub rejected: Vec<UploadWarning>,
}

/// Stores each upload in order. Files without a name are skipped, rejected
/// files are reported in [`StoredUploads::rejected`], and a storage failure
/// aborts the batch leaving earlier files stored.
pub async fn store_uploads(
    store: &dyn AttachmentStore,
    uploads: &[Upload],
) -> Result<StoredUploads, OficioError> {
    let mut outcome = StoredUploads::default();
    for upload in uploads {
        if upload.filename.is_empty() {
            continue;
        }
        match store.store(upload).await {
            Ok(reference) => {
                debug!(
                    store = store.kind(),
                    filename = %upload.filename,
                    reference = %reference,
                    "stored attachment"
                );
                outcome.references.push(reference);
            }
            Err(OficioError::UploadRejected { filename, reason }) => {
                warn!(store = store.kind(), filename = %filename, reason = %reason, "attachment rejected");
                outcome.rejected.push(UploadWarning { filename, reason });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupWarning {
    pub reference: String,
    pub error: String,
}

/// Best-effort removal of stored blobs; failures come back as warnings.
pub async fn remove_attachments(
    store: &dyn AttachmentStore,
    references: &[String],
) -> Vec<CleanupWarning> {
    if !store.supports_deletion() {
        return Vec::new();
    }

    let mut warnings = Vec::new();
    for reference in references.iter().filter(|reference| !reference.is_empty()) {
        if let Err(err) = store.delete(reference).await {
            warn!(store = store.kind(), reference = %reference, error = %err, "failed to delete attachment");
            warnings.push(CleanupWarning {
                reference: reference.clone(),
                error: err.to_string(),
            });
        }
    }
    warnings
}

/// Reduces a client filename to a safe single path component: accents are
/// folded to their base letters and other non-ASCII is dropped,
/// separators become spaces, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped, and leading or trailing `.`/`_` are trimmed.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|ch| if ch == '/' || ch == '\\' { ' ' } else { ch })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|ch| ch == '.' || ch == '_').to_string()
}
