use serde::{Deserialize, Serialize};

use crate::domain::{DocumentId, Documento, Estado};

/// Query string of `GET /documentos/buscar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub pagina: u32,
    pub tam: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<Estado>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentPage {
    pub items: Vec<Documento>,
    pub total: u64,
}

impl DocumentPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub pagina: u32,
    pub tam: u32,
    pub total: u64,
}

/// Both shapes the search endpoint has shipped with.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Flat { items: Vec<Documento>, total: u64 },
    Envelope { data: Vec<Documento>, meta: PageMeta },
}

impl<'de> Deserialize<'de> for DocumentPage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match SearchResponse::deserialize(deserializer)? {
            SearchResponse::Flat { items, total } => DocumentPage { items, total },
            SearchResponse::Envelope { data, meta } => DocumentPage {
                items: data,
                total: meta.total,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    pub document_id: DocumentId,
    pub nuevo_estado: Estado,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeResponse {
    pub ok: bool,
    pub id: DocumentId,
    pub estado_anterior: Estado,
    pub estado_nuevo: Estado,
    #[serde(default)]
    pub rows_affected: u64,
}

/// Body returned by `DELETE /documentos/{id}`. The API does not commit to a
/// shape, so the payload is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeleteReceipt(pub serde_json::Value);
