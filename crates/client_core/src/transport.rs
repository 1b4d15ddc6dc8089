//! Remote collaborators: the registry CRUD/search API and the status webhook.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{DocumentId, DocumentPayload, Documento},
    protocol::{DeleteReceipt, DocumentPage, SearchQuery, StatusChangeRequest, StatusChangeResponse},
};
use tracing::debug;

use crate::{config::ClientSettings, error::ClientError};

#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<DocumentPage, ClientError>;
    async fn fetch(&self, id: DocumentId) -> Result<Documento, ClientError>;
    async fn create(&self, payload: &DocumentPayload) -> Result<Documento, ClientError>;
    async fn update(
        &self,
        id: DocumentId,
        payload: &DocumentPayload,
    ) -> Result<Documento, ClientError>;
    async fn delete(&self, id: DocumentId) -> Result<DeleteReceipt, ClientError>;
    async fn health(&self) -> Result<Value, ClientError>;
}

#[async_trait]
pub trait StatusWebhook: Send + Sync {
    async fn change_status(
        &self,
        request: &StatusChangeRequest,
    ) -> Result<StatusChangeResponse, ClientError>;
}

fn build_http_client(timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ClientError::Network(format!("failed to build http client: {err}")))
}

async fn send(request: RequestBuilder, timeout: Duration) -> Result<Vec<u8>, ClientError> {
    let response = request
        .send()
        .await
        .map_err(|err| ClientError::from_reqwest(err, timeout))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| ClientError::from_reqwest(err, timeout))?;
    if !status.is_success() {
        return Err(ClientError::remote(status.as_u16(), &body));
    }
    Ok(body.to_vec())
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice(body).map_err(|err| ClientError::InvalidResponse(err.to_string()))
}

pub struct HttpDocumentApi {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDocumentApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        Self::new(settings.api_base_url.as_str(), settings.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn search(&self, query: &SearchQuery) -> Result<DocumentPage, ClientError> {
        debug!(?query, "searching documentos");
        let body = send(
            self.http.get(self.url("/documentos/buscar")).query(query),
            self.timeout,
        )
        .await?;
        decode(&body)
    }

    async fn fetch(&self, id: DocumentId) -> Result<Documento, ClientError> {
        let body = send(
            self.http.get(self.url(&format!("/documentos/{id}"))),
            self.timeout,
        )
        .await?;
        decode(&body)
    }

    async fn create(&self, payload: &DocumentPayload) -> Result<Documento, ClientError> {
        let body = send(
            self.http.post(self.url("/documentos")).json(payload),
            self.timeout,
        )
        .await?;
        decode(&body)
    }

    async fn update(
        &self,
        id: DocumentId,
        payload: &DocumentPayload,
    ) -> Result<Documento, ClientError> {
        let body = send(
            self.http
                .put(self.url(&format!("/documentos/{id}")))
                .json(payload),
            self.timeout,
        )
        .await?;
        decode(&body)
    }

    async fn delete(&self, id: DocumentId) -> Result<DeleteReceipt, ClientError> {
        let body = send(
            self.http.delete(self.url(&format!("/documentos/{id}"))),
            self.timeout,
        )
        .await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(DeleteReceipt(Value::Null));
        }
        decode(&body)
    }

    async fn health(&self) -> Result<Value, ClientError> {
        let body = send(self.http.get(self.url("/health")), self.timeout).await?;
        decode(&body)
    }
}

pub struct HttpStatusWebhook {
    http: Client,
    url: String,
    timeout: Duration,
}

impl HttpStatusWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            url: url.into(),
            timeout,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        Self::new(settings.webhook_url.as_str(), settings.request_timeout)
    }
}

#[async_trait]
impl StatusWebhook for HttpStatusWebhook {
    async fn change_status(
        &self,
        request: &StatusChangeRequest,
    ) -> Result<StatusChangeResponse, ClientError> {
        debug!(document_id = %request.document_id, nuevo_estado = %request.nuevo_estado, "calling status webhook");
        let body = send(self.http.post(&self.url).json(request), self.timeout).await?;
        let response: StatusChangeResponse = decode(&body)?;
        if !response.ok {
            let message = shared::error::ApiErrorBody::message_from_body(&body)
                .unwrap_or_else(|| "El webhook no aplicó el cambio de estado".to_string());
            return Err(ClientError::Remote {
                status: StatusCode::OK.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
