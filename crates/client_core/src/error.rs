//! Failure taxonomy shared by the query cache and the mutation orchestrator.

use std::{collections::BTreeMap, time::Duration};

use shared::error::ApiErrorBody;
use thiserror::Error;

/// Field name -> human readable message, as produced by the schema validator.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport could not complete (connect failure, timeout, reset).
    Network,
    /// Payload rejected locally before any request was made.
    Validation,
    /// Server answered with a non-success status or an unusable body.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("{message}")]
    Remote { status: u16, message: String },
    #[error("unexpected response from server: {0}")]
    InvalidResponse(String),
    #[error("validation failed for {}", field_list(.0))]
    Validation(FieldErrors),
}

fn field_list(errors: &FieldErrors) -> String {
    errors.keys().cloned().collect::<Vec<_>>().join(", ")
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Timeout(_) | ClientError::Network(_) => ErrorKind::Network,
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Remote { .. } | ClientError::InvalidResponse(_) => ErrorKind::Remote,
        }
    }

    /// Builds a remote rejection from a non-2xx response body. The body's own
    /// message is used verbatim when present.
    pub fn remote(status: u16, body: &[u8]) -> Self {
        let message = ApiErrorBody::message_from_body(body)
            .unwrap_or_else(|| generic_status_message(status));
        ClientError::Remote { status, message }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ClientError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(timeout)
        } else if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::Remote {
                status: status.as_u16(),
                message: generic_status_message(status.as_u16()),
            }
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

pub fn generic_status_message(status: u16) -> String {
    match status {
        400 => "La solicitud no es válida (400)".to_string(),
        401 | 403 => format!("No autorizado ({status})"),
        404 => "El documento no existe (404)".to_string(),
        409 => "El documento fue modificado por otra operación (409)".to_string(),
        500..=599 => format!("Error del servidor ({status})"),
        _ => format!("La solicitud falló con código {status}"),
    }
}
