use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use diesel::dsl::max;
use diesel::prelude::*;
use http_body_util::BodyExt;
use oficios::attachments::{AttachmentStore, LocalStore, RemoteStore, UploadPolicy};
use oficios::config::{AppConfig, S3Settings, StorageConfig, DEFAULT_MAX_UPLOAD_BYTES};
use oficios::db;
use oficios::routes;
use oficios::schema::oficios as oficios_table;
use oficios::search::SearchMode;
use oficios::state::AppState;
use oficios::storage::ObjectStorage;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

pub const PUBLIC_BASE_URL: &str = "https://files.example.test/oficios-bucket";

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    failing: AtomicBool,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("object storage is down");
        }
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn head_bucket(&self) -> Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
impl FakeStorage {
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

/// One part of a multipart form submission.
#[allow(dead_code)]
pub enum Part {
    Text(&'static str, String),
    File {
        filename: String,
        content_type: &'static str,
        data: Vec<u8>,
    },
}

#[allow(dead_code)]
impl Part {
    pub fn text(name: &'static str, value: impl Into<String>) -> Self {
        Part::Text(name, value.into())
    }

    pub fn file(filename: impl Into<String>, content_type: &'static str, data: &[u8]) -> Self {
        Part::File {
            filename: filename.into(),
            content_type,
            data: data.to_vec(),
        }
    }
}

/// Fields every oficio form needs; callers append or override parts.
#[allow(dead_code)]
pub fn oficio_form(tipo: &str, fecha: &str, asunto: &str) -> Vec<Part> {
    vec![
        Part::text("numero_oficio", "OF-2024-001"),
        Part::text("tipo", tipo),
        Part::text("fecha", fecha),
        Part::text("remitente", "Dirección General"),
        Part::text("destinatario", "Secretaría Técnica"),
        Part::text("asunto", asunto),
        Part::text("cuerpo", "Por medio del presente se informa..."),
        Part::text("observaciones", ""),
    ]
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct OficioView {
    pub id: i32,
    pub numero_oficio: Option<String>,
    pub tipo: String,
    pub fecha: String,
    pub asunto: String,
    pub estado: String,
    pub observaciones: Option<String>,
    pub archivo_adjunto: Vec<String>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct IndexView {
    pub search_query: String,
    pub oficios_recibidos: Vec<OficioView>,
    pub oficios_enviados: Vec<OficioView>,
    pub total_recibidos: usize,
    pub total_enviados: usize,
}

#[derive(Deserialize)]
struct DetailView {
    oficio: OficioView,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Option<Arc<FakeStorage>>,
    // Keeps the database and upload directory alive for the test.
    dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    /// App backed by a local upload directory with the default allow list.
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create temp dir")?;
        let uploads_dir = dir.path().join("uploads");
        let config = base_config(
            &dir,
            StorageConfig::Local {
                uploads_dir: uploads_dir.clone(),
            },
            UploadPolicy::default(),
        );
        let store: Arc<dyn AttachmentStore> =
            Arc::new(LocalStore::open(uploads_dir, config.attachment_policy.clone()).await?);
        Self::build(dir, config, store, None)
    }

    /// App backed by fake object storage that accepts any file.
    pub async fn remote(delete_objects: bool) -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create temp dir")?;
        let settings = S3Settings {
            bucket: "oficios-bucket".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            public_base_url: PUBLIC_BASE_URL.to_string(),
            delete_objects,
        };
        let config = base_config(&dir, StorageConfig::S3(settings), UploadPolicy::AnyFile);

        let storage = Arc::new(FakeStorage::default());
        let storage_for_store: Arc<dyn ObjectStorage> = storage.clone();
        let store: Arc<dyn AttachmentStore> = Arc::new(
            RemoteStore::new(
                storage_for_store,
                PUBLIC_BASE_URL,
                config.attachment_policy.clone(),
            )
            .with_deletion(delete_objects),
        );
        Self::build(dir, config, store, Some(storage))
    }

    fn build(
        dir: TempDir,
        config: AppConfig,
        store: Arc<dyn AttachmentStore>,
        storage: Option<Arc<FakeStorage>>,
    ) -> Result<Self> {
        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
            db::run_migrations(&mut conn)?;
        }

        let state = AppState::new(pool, config, store);
        let router = routes::create_router(state.clone());
        Ok(Self {
            state,
            router,
            storage,
            dir,
        })
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone().expect("remote test app")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.uploads_dir().join(name)
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_empty(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_form(&self, path: &str, parts: &[Part]) -> Result<hyper::Response<Body>> {
        let boundary = "oficios-test-boundary";
        let mut body = Vec::new();
        for part in parts {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend(value.as_bytes());
                }
                Part::File {
                    filename,
                    content_type,
                    data,
                } => {
                    body.extend(
                        format!(
                            "Content-Disposition: form-data; name=\"archivo_adjunto\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    body.extend(data);
                }
            }
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        self.send(request).await
    }

    /// Submits a create form and returns the id of the row it inserted,
    /// whether or not its tipo shows up in a listing.
    pub async fn create(&self, parts: &[Part]) -> Result<i32> {
        let response = self.post_form("/agregar", parts).await?;
        expect_redirect(response)?;
        self.newest_id()?.context("no oficio stored")
    }

    pub fn newest_id(&self) -> Result<Option<i32>> {
        let mut conn = self
            .state
            .db()
            .map_err(|err| anyhow!("failed to acquire connection: {}", err.message()))?;
        let newest = oficios_table::table
            .select(max(oficios_table::id))
            .first::<Option<i32>>(&mut *conn)?;
        Ok(newest)
    }

    pub async fn index(&self, query: &str) -> Result<IndexView> {
        let path = if query.is_empty() {
            "/".to_string()
        } else {
            format!("/?q={query}")
        };
        let response = self.get(&path).await?;
        if response.status() != StatusCode::OK {
            bail!("index failed with status {}", response.status());
        }
        let body = body_to_vec(response.into_body()).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn oficio(&self, id: i32) -> Result<OficioView> {
        let response = self.get(&format!("/editar/{id}")).await?;
        if response.status() != StatusCode::OK {
            bail!("oficio {id} returned status {}", response.status());
        }
        let body = body_to_vec(response.into_body()).await?;
        let detail: DetailView = serde_json::from_slice(&body)?;
        Ok(detail.oficio)
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

fn base_config(dir: &TempDir, storage: StorageConfig, policy: UploadPolicy) -> AppConfig {
    AppConfig {
        database_url: database_path(dir.path()),
        database_max_pool_size: 2,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        cors_allowed_origin: None,
        search_mode: SearchMode::Literal,
        storage,
        attachment_policy: policy,
    }
}

fn database_path(dir: &Path) -> String {
    dir.join("oficios.db").to_string_lossy().into_owned()
}

pub fn expect_redirect(response: hyper::Response<Body>) -> Result<()> {
    if response.status() != StatusCode::SEE_OTHER {
        bail!("expected redirect, got {}", response.status());
    }
    let location = response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok());
    if location != Some("/") {
        bail!("expected redirect to /, got {location:?}");
    }
    Ok(())
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}
