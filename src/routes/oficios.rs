use std::collections::HashMap;

use axum::extract::{Json, Multipart, Path, Query, State};
use axum::response::Redirect;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::attachments::{remove_attachments, store_uploads, Upload};
use crate::error::{AppError, AppResult};
use crate::models::{Oficio, OficioFields};
use crate::repository::{self, ESTADO_ENVIADO, ESTADO_PENDIENTE, TIPOS, TIPO_ENVIADO, TIPO_RECIBIDO};
use crate::state::AppState;

pub const FILE_FIELD: &str = "archivo_adjunto";
pub const EXISTING_FILES_FIELD: &str = "archivos_actuales";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct IndexResponse {
    pub search_query: String,
    pub oficios_recibidos: Vec<Oficio>,
    pub oficios_enviados: Vec<Oficio>,
    pub total_recibidos: usize,
    pub total_enviados: usize,
}

#[derive(Serialize)]
pub struct FormDescriptor {
    pub tipos: &'static [&'static str],
    pub estados: [&'static str; 2],
    pub file_field: &'static str,
    /// `None` when the store accepts any file.
    pub allowed_extensions: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct OficioDetail {
    pub oficio: Oficio,
}

pub async fn index(
    State(state): State<AppState>,
    Query(params): Query<IndexQuery>,
) -> AppResult<Json<IndexResponse>> {
    let filter = state.search_filter(params.q);
    let mut conn = state.db()?;

    let oficios_recibidos = repository::list(&mut conn, TIPO_RECIBIDO, &filter)?;
    let oficios_enviados = repository::list(&mut conn, TIPO_ENVIADO, &filter)?;

    Ok(Json(IndexResponse {
        search_query: filter.query().to_string(),
        total_recibidos: oficios_recibidos.len(),
        total_enviados: oficios_enviados.len(),
        oficios_recibidos,
        oficios_enviados,
    }))
}

pub async fn new_form(State(state): State<AppState>) -> Json<FormDescriptor> {
    Json(FormDescriptor {
        tipos: TIPOS,
        estados: [ESTADO_ENVIADO, ESTADO_PENDIENTE],
        file_field: FILE_FIELD,
        allowed_extensions: state
            .store
            .policy()
            .allowed_extensions()
            .map(|extensions| extensions.to_vec()),
    })
}

pub async fn create_oficio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Redirect> {
    let submission = Submission::read(multipart).await?;
    let fields = submission.oficio_fields()?;

    let stored = store_uploads(state.store.as_ref(), &submission.uploads)
        .await
        .map_err(|err| {
            error!(error = %err, "attachment upload failed, oficio not created");
            AppError::from(err)
        })?;

    let mut conn = state.db()?;
    let id = repository::create(&mut conn, &fields, &stored.references)?;
    info!(
        oficio_id = id,
        tipo = %fields.tipo,
        attachments = stored.references.len(),
        rejected = stored.rejected.len(),
        "oficio created"
    );
    Ok(Redirect::to("/"))
}

pub async fn edit_form(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<OficioDetail>> {
    let mut conn = state.db()?;
    let oficio = repository::get(&mut conn, id)?;
    Ok(Json(OficioDetail { oficio }))
}

pub async fn update_oficio(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Redirect> {
    {
        let mut conn = state.db()?;
        repository::get(&mut conn, id)?;
    }

    let submission = Submission::read(multipart).await?;
    let fields = submission.oficio_fields()?;
    let estado = submission.required("estado")?;
    let existing_refs = submission.existing_refs();

    let stored = store_uploads(state.store.as_ref(), &submission.uploads)
        .await
        .map_err(|err| {
            error!(oficio_id = id, error = %err, "attachment upload failed, oficio not updated");
            AppError::from(err)
        })?;

    let mut conn = state.db()?;
    repository::update(
        &mut conn,
        id,
        &fields,
        estado,
        &existing_refs,
        &stored.references,
    )?;
    info!(
        oficio_id = id,
        kept_attachments = existing_refs.len(),
        new_attachments = stored.references.len(),
        rejected = stored.rejected.len(),
        "oficio updated"
    );
    Ok(Redirect::to("/"))
}

pub async fn delete_oficio(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Redirect> {
    let (references, orphaned) = {
        let mut conn = state.db()?;
        let references = repository::delete(&mut conn, id)?;
        let orphaned = repository::unreferenced(&mut conn, &references)?;
        (references, orphaned)
    };

    let warnings = remove_attachments(state.store.as_ref(), &orphaned).await;
    if warnings.is_empty() {
        info!(
            oficio_id = id,
            attachments = references.len(),
            removed = orphaned.len(),
            "oficio deleted"
        );
    } else {
        warn!(
            oficio_id = id,
            attachments = references.len(),
            cleanup_failures = warnings.len(),
            "oficio deleted with attachment cleanup failures"
        );
    }
    Ok(Redirect::to("/"))
}

/// Text fields and file parts of a multipart form submission.
struct Submission {
    fields: HashMap<String, String>,
    uploads: Vec<Upload>,
}

impl Submission {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut fields = HashMap::new();
        let mut uploads = Vec::new();

        while let Some(field) = multipart.next_field().await.map_err(|err| {
            error!(error = %err, "invalid multipart data");
            AppError::bad_request(format!("invalid multipart data: {err}"))
        })? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == FILE_FIELD {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|err| {
                    error!(error = %err, filename = %filename, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                uploads.push(Upload {
                    filename,
                    content_type,
                    bytes,
                });
            } else {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid value for {name}: {err}"))
                })?;
                fields.insert(name, value);
            }
        }

        Ok(Self { fields, uploads })
    }

    fn required(&self, name: &str) -> AppResult<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::bad_request(format!("missing form field `{name}`")))
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }

    fn oficio_fields(&self) -> AppResult<OficioFields> {
        let fecha_raw = self.required("fecha")?;
        let fecha = NaiveDate::parse_from_str(fecha_raw.trim(), DATE_FORMAT).map_err(|_| {
            AppError::bad_request(format!("fecha must be a YYYY-MM-DD date, got `{fecha_raw}`"))
        })?;

        Ok(OficioFields {
            numero_oficio: self.optional("numero_oficio"),
            tipo: self.required("tipo")?.to_string(),
            fecha,
            remitente: self.required("remitente")?.to_string(),
            destinatario: self.required("destinatario")?.to_string(),
            asunto: self.required("asunto")?.to_string(),
            cuerpo: self.required("cuerpo")?.to_string(),
            observaciones: self.optional("observaciones"),
        })
    }

    /// Attachment references the edit form carried over, in order.
    fn existing_refs(&self) -> Vec<String> {
        self.fields
            .get(EXISTING_FILES_FIELD)
            .map(|joined| {
                joined
                    .split(',')
                    .filter(|reference| !reference.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
