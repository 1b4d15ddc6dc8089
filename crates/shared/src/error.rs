use serde::{Deserialize, Serialize};

/// Error body returned by the registry API and the status webhook on non-2xx
/// responses. Every field is optional; the first human readable one wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ApiErrorBody {
    pub fn human_message(&self) -> Option<&str> {
        [&self.message, &self.mensaje, &self.detail, &self.title]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .find(|text| !text.is_empty())
    }

    /// Extracts the message from a raw response body, if it is JSON and has one.
    pub fn message_from_body(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.human_message().map(str::to_string))
    }
}
