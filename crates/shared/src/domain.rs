use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(DocumentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Estado {
    Registrado,
    Pendiente,
    Validado,
    Archivado,
}

impl Estado {
    pub const ALL: [Estado; 4] = [
        Estado::Registrado,
        Estado::Pendiente,
        Estado::Validado,
        Estado::Archivado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Estado::Registrado => "Registrado",
            Estado::Pendiente => "Pendiente",
            Estado::Validado => "Validado",
            Estado::Archivado => "Archivado",
        }
    }
}

impl fmt::Display for Estado {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown estado '{0}'")]
pub struct UnknownEstado(pub String);

impl FromStr for Estado {
    type Err = UnknownEstado;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Estado::ALL
            .into_iter()
            .find(|estado| estado.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownEstado(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Documento {
    pub id: DocumentId,
    pub titulo: String,
    pub autor: String,
    pub tipo: String,
    pub estado: Estado,
    #[serde(deserialize_with = "deserialize_registro")]
    pub fecha_registro: DateTime<Utc>,
}

/// Writable fields of a document. `id` and `fechaRegistro` are assigned by the
/// server and never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub titulo: String,
    pub autor: String,
    pub tipo: String,
    pub estado: Estado,
}

// The registry API emits offset-less timestamps; those are taken as UTC.
fn deserialize_registro<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_registro(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_registro(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Ok(parsed.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}
