use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::*;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = oficios)]
pub struct OficioRow {
    pub id: i32,
    pub numero_oficio: Option<String>,
    pub tipo: String,
    pub fecha: NaiveDate,
    pub remitente: String,
    pub destinatario: String,
    pub asunto: String,
    pub cuerpo: String,
    pub estado: String,
    pub observaciones: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = oficios)]
pub struct NewOficio<'a> {
    pub numero_oficio: Option<&'a str>,
    pub tipo: &'a str,
    pub fecha: NaiveDate,
    pub remitente: &'a str,
    pub destinatario: &'a str,
    pub asunto: &'a str,
    pub cuerpo: &'a str,
    pub estado: &'a str,
    pub observaciones: Option<&'a str>,
}

/// Full replacement of a record's editable columns; `None` clears the column.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = oficios)]
#[diesel(treat_none_as_null = true)]
pub struct OficioChangeset<'a> {
    pub numero_oficio: Option<&'a str>,
    pub tipo: &'a str,
    pub fecha: NaiveDate,
    pub remitente: &'a str,
    pub destinatario: &'a str,
    pub asunto: &'a str,
    pub cuerpo: &'a str,
    pub estado: &'a str,
    pub observaciones: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = oficio_adjuntos)]
#[diesel(belongs_to(OficioRow, foreign_key = oficio_id))]
pub struct OficioAdjunto {
    pub id: i32,
    pub oficio_id: i32,
    pub position: i32,
    pub reference: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = oficio_adjuntos)]
pub struct NewOficioAdjunto<'a> {
    pub oficio_id: i32,
    pub position: i32,
    pub reference: &'a str,
}

/// A stored record together with its ordered attachment references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Oficio {
    pub id: i32,
    pub numero_oficio: Option<String>,
    pub tipo: String,
    pub fecha: NaiveDate,
    pub remitente: String,
    pub destinatario: String,
    pub asunto: String,
    pub cuerpo: String,
    pub estado: String,
    pub observaciones: Option<String>,
    pub archivo_adjunto: Vec<String>,
}

impl Oficio {
    pub fn from_row(row: OficioRow, adjuntos: Vec<OficioAdjunto>) -> Self {
        Self {
            id: row.id,
            numero_oficio: row.numero_oficio,
            tipo: row.tipo,
            fecha: row.fecha,
            remitente: row.remitente,
            destinatario: row.destinatario,
            asunto: row.asunto,
            cuerpo: row.cuerpo,
            estado: row.estado,
            observaciones: row.observaciones,
            archivo_adjunto: adjuntos.into_iter().map(|adjunto| adjunto.reference).collect(),
        }
    }
}

/// User-editable fields shared by the create and edit forms.
#[derive(Debug, Clone, PartialEq)]
pub struct OficioFields {
    pub numero_oficio: Option<String>,
    pub tipo: String,
    pub fecha: NaiveDate,
    pub remitente: String,
    pub destinatario: String,
    pub asunto: String,
    pub cuerpo: String,
    pub observaciones: Option<String>,
}

impl OficioFields {
    pub(crate) fn as_new<'a>(&'a self, estado: &'a str) -> NewOficio<'a> {
        NewOficio {
            numero_oficio: self.numero_oficio.as_deref(),
            tipo: &self.tipo,
            fecha: self.fecha,
            remitente: &self.remitente,
            destinatario: &self.destinatario,
            asunto: &self.asunto,
            cuerpo: &self.cuerpo,
            estado,
            observaciones: self.observaciones.as_deref(),
        }
    }

    pub(crate) fn as_changeset<'a>(&'a self, estado: &'a str) -> OficioChangeset<'a> {
        OficioChangeset {
            numero_oficio: self.numero_oficio.as_deref(),
            tipo: &self.tipo,
            fecha: self.fecha,
            remitente: &self.remitente,
            destinatario: &self.destinatario,
            asunto: &self.asunto,
            cuerpo: &self.cuerpo,
            estado,
            observaciones: self.observaciones.as_deref(),
        }
    }
}
