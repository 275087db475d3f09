//! Persistence for oficios and their ordered attachment references.
//!
//! Every function takes the connection explicitly; callers own its lifetime.

use std::collections::HashSet;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::error::OficioError;
use crate::models::{NewOficioAdjunto, Oficio, OficioAdjunto, OficioFields, OficioRow};
use crate::schema::{oficio_adjuntos, oficios};
use crate::search::{SearchFilter, LIKE_ESCAPE};

pub const TIPO_ENVIADO: &str = "enviado";
pub const TIPO_RECIBIDO: &str = "recibido";
pub const TIPOS: &[&str] = &[TIPO_ENVIADO, TIPO_RECIBIDO];

pub const ESTADO_ENVIADO: &str = "Enviado";
pub const ESTADO_PENDIENTE: &str = "Pendiente";

/// Status assigned at creation: sent letters start as sent, anything else
/// waits for an answer.
pub fn estado_inicial(tipo: &str) -> &'static str {
    if tipo == TIPO_ENVIADO {
        ESTADO_ENVIADO
    } else {
        ESTADO_PENDIENTE
    }
}

pub fn create(
    conn: &mut SqliteConnection,
    fields: &OficioFields,
    attachment_refs: &[String],
) -> Result<i32, OficioError> {
    let estado = estado_inicial(&fields.tipo);
    let id = conn.transaction(|conn| {
        let id: i32 = diesel::insert_into(oficios::table)
            .values(fields.as_new(estado))
            .returning(oficios::id)
            .get_result(conn)?;
        replace_attachments(conn, id, attachment_refs.iter())?;
        Ok::<_, diesel::result::Error>(id)
    })?;
    Ok(id)
}

pub fn get(conn: &mut SqliteConnection, id: i32) -> Result<Oficio, OficioError> {
    let row: OficioRow = oficios::table
        .find(id)
        .select(OficioRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(OficioError::NotFound(id))?;
    let adjuntos: Vec<OficioAdjunto> = OficioAdjunto::belonging_to(&row)
        .select(OficioAdjunto::as_select())
        .order(oficio_adjuntos::position.asc())
        .load(conn)?;
    Ok(Oficio::from_row(row, adjuntos))
}

/// Records of one `tipo`, newest `fecha` first, ties in insertion order.
pub fn list(
    conn: &mut SqliteConnection,
    tipo: &str,
    filter: &SearchFilter,
) -> Result<Vec<Oficio>, OficioError> {
    let mut query = oficios::table
        .filter(oficios::tipo.eq(tipo))
        .select(OficioRow::as_select())
        .into_boxed();

    if let Some(pattern) = filter.like_pattern() {
        query = query.filter(
            oficios::asunto
                .like(pattern.clone())
                .escape(LIKE_ESCAPE)
                .or(oficios::remitente.like(pattern.clone()).escape(LIKE_ESCAPE))
                .or(oficios::destinatario
                    .like(pattern.clone())
                    .escape(LIKE_ESCAPE))
                .or(oficios::numero_oficio.like(pattern).escape(LIKE_ESCAPE)),
        );
    }

    let rows: Vec<OficioRow> = query
        .order((oficios::fecha.desc(), oficios::id.asc()))
        .load(conn)?;
    with_attachments(conn, rows)
}

/// Replaces every editable field. The stored attachment list becomes
/// `existing_refs` (minus empty entries) followed by `new_refs`.
pub fn update(
    conn: &mut SqliteConnection,
    id: i32,
    fields: &OficioFields,
    estado: &str,
    existing_refs: &[String],
    new_refs: &[String],
) -> Result<(), OficioError> {
    conn.transaction(|conn| {
        let updated = diesel::update(oficios::table.find(id))
            .set(fields.as_changeset(estado))
            .execute(conn)?;
        if updated == 0 {
            return Err(OficioError::NotFound(id));
        }
        replace_attachments(conn, id, existing_refs.iter().chain(new_refs))?;
        Ok(())
    })
}

/// Removes the record and returns the attachment references it held.
pub fn delete(conn: &mut SqliteConnection, id: i32) -> Result<Vec<String>, OficioError> {
    conn.transaction(|conn| {
        let references: Vec<String> = oficio_adjuntos::table
            .filter(oficio_adjuntos::oficio_id.eq(id))
            .order(oficio_adjuntos::position.asc())
            .select(oficio_adjuntos::reference)
            .load(conn)?;
        diesel::delete(oficio_adjuntos::table.filter(oficio_adjuntos::oficio_id.eq(id)))
            .execute(conn)?;
        let deleted = diesel::delete(oficios::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(OficioError::NotFound(id));
        }
        Ok(references)
    })
}

/// Every attachment reference held by any record.
pub fn all_references(conn: &mut SqliteConnection) -> Result<Vec<String>, OficioError> {
    let references = oficio_adjuntos::table
        .select(oficio_adjuntos::reference)
        .distinct()
        .load(conn)?;
    Ok(references)
}

/// The references no remaining record lists, deduplicated, in input order.
/// Local uploads with the same sanitized name share one file, so a deleted
/// record must leave those alone.
pub fn unreferenced(
    conn: &mut SqliteConnection,
    references: &[String],
) -> Result<Vec<String>, OficioError> {
    if references.is_empty() {
        return Ok(Vec::new());
    }
    let still_used: HashSet<String> = oficio_adjuntos::table
        .filter(oficio_adjuntos::reference.eq_any(references))
        .select(oficio_adjuntos::reference)
        .load::<String>(conn)?
        .into_iter()
        .collect();

    let mut seen = HashSet::new();
    Ok(references
        .iter()
        .filter(|reference| !still_used.contains(*reference) && seen.insert(*reference))
        .cloned()
        .collect())
}

fn replace_attachments<'a, I>(
    conn: &mut SqliteConnection,
    oficio_id: i32,
    references: I,
) -> QueryResult<()>
where
    I: Iterator<Item = &'a String>,
{
    diesel::delete(oficio_adjuntos::table.filter(oficio_adjuntos::oficio_id.eq(oficio_id)))
        .execute(conn)?;

    let rows: Vec<NewOficioAdjunto<'_>> = references
        .filter(|reference| !reference.is_empty())
        .enumerate()
        .map(|(position, reference)| NewOficioAdjunto {
            oficio_id,
            position: position as i32,
            reference,
        })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(oficio_adjuntos::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(())
}

fn with_attachments(
    conn: &mut SqliteConnection,
    rows: Vec<OficioRow>,
) -> Result<Vec<Oficio>, OficioError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let adjuntos: Vec<OficioAdjunto> = OficioAdjunto::belonging_to(&rows)
        .select(OficioAdjunto::as_select())
        .order(oficio_adjuntos::position.asc())
        .load(conn)?;
    let grouped = adjuntos.grouped_by(&rows);
    Ok(rows
        .into_iter()
        .zip(grouped)
        .map(|(row, adjuntos)| Oficio::from_row(row, adjuntos))
        .collect())
}
