//! Form schema for document create/update.

use shared::domain::{DocumentPayload, Documento, Estado};

use crate::error::FieldErrors;

/// Raw form input, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentDraft {
    pub titulo: String,
    pub autor: String,
    pub tipo: String,
    pub estado: String,
}

impl DocumentDraft {
    pub fn new(
        titulo: impl Into<String>,
        autor: impl Into<String>,
        tipo: impl Into<String>,
        estado: impl Into<String>,
    ) -> Self {
        Self {
            titulo: titulo.into(),
            autor: autor.into(),
            tipo: tipo.into(),
            estado: estado.into(),
        }
    }
}

impl From<&Documento> for DocumentDraft {
    fn from(doc: &Documento) -> Self {
        Self::new(
            doc.titulo.clone(),
            doc.autor.clone(),
            doc.tipo.clone(),
            doc.estado.as_str(),
        )
    }
}

pub trait DocumentValidator: Send + Sync {
    fn validate(&self, draft: &DocumentDraft) -> Result<DocumentPayload, FieldErrors>;
}

/// Minimum lengths per field, counted in characters.
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator {
    pub titulo_min: usize,
    pub autor_min: usize,
    pub tipo_min: usize,
    pub estado_min: usize,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self {
            titulo_min: 3,
            autor_min: 3,
            tipo_min: 2,
            estado_min: 2,
        }
    }
}

fn check(errors: &mut FieldErrors, field: &str, value: &str, min: usize, message: &str) {
    if value.trim().chars().count() < min {
        errors.insert(field.to_string(), message.to_string());
    }
}

impl DocumentValidator for SchemaValidator {
    fn validate(&self, draft: &DocumentDraft) -> Result<DocumentPayload, FieldErrors> {
        let mut errors = FieldErrors::new();
        check(&mut errors, "titulo", &draft.titulo, self.titulo_min, "El título es obligatorio");
        check(&mut errors, "autor", &draft.autor, self.autor_min, "El autor es obligatorio");
        check(&mut errors, "tipo", &draft.tipo, self.tipo_min, "Seleccione un tipo");
        check(&mut errors, "estado", &draft.estado, self.estado_min, "Seleccione un estado");

        let estado = draft.estado.parse::<Estado>();
        if estado.is_err() {
            errors
                .entry("estado".to_string())
                .or_insert_with(|| "Seleccione un estado".to_string());
        }

        match estado {
            Ok(estado) if errors.is_empty() => Ok(DocumentPayload {
                titulo: draft.titulo.trim().to_string(),
                autor: draft.autor.trim().to_string(),
                tipo: draft.tipo.trim().to_string(),
                estado,
            }),
            _ => Err(errors),
        }
    }
}
