//! HTTP client for the personality-chat service

use super::types::HistoryEntry;
use super::{BackendConfig, ChatBackend, ChatBackendError};
use crate::db::Persona;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Client for the `/personality_chat`, `/script_chat`, `/script_media` and
/// `/unpersona_chat` endpoints
pub struct SinhomeClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    session_id: &'a str,
    message: &'a str,
    history: &'a [HistoryEntry],
    persona_data: Option<&'a Persona>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<&'a str>,
}

impl SinhomeClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ChatBackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, endpoint: &str, payload: &ChatPayload<'_>) -> Result<String, ChatBackendError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self.client.post(&url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatBackendError::http(status.as_u16(), &body));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ChatBackendError::malformed(format!("Invalid JSON: {e}")))?;
        extract_response(data)
    }
}

/// Pull the `response` field out of the service's JSON answer
fn extract_response(data: Value) -> Result<String, ChatBackendError> {
    let Value::Object(mut fields) = data else {
        return Err(ChatBackendError::malformed(format!("Unexpected response: {data}")));
    };
    match fields.remove("response") {
        Some(Value::String(text)) => Ok(text),
        Some(other) => Ok(other.to_string()),
        None => Err(ChatBackendError::malformed(format!(
            "Unexpected response: {}",
            Value::Object(fields)
        ))),
    }
}

#[async_trait]
impl ChatBackend for SinhomeClient {
    async fn personality_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
    ) -> Result<String, ChatBackendError> {
        let payload = ChatPayload {
            session_id,
            message,
            history,
            persona_data: Some(persona),
            script: None,
            media: None,
        };
        self.post("personality_chat", &payload).await
    }

    async fn script_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
    ) -> Result<String, ChatBackendError> {
        let payload = ChatPayload {
            session_id,
            message,
            history,
            persona_data: Some(persona),
            script: Some(script),
            media: None,
        };
        self.post("script_chat", &payload).await
    }

    async fn script_media(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
        media: &str,
    ) -> Result<String, ChatBackendError> {
        let payload = ChatPayload {
            session_id,
            message,
            history,
            persona_data: Some(persona),
            script: Some(script),
            media: Some(media),
        };
        self.post("script_media", &payload).await
    }

    async fn unpersona_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<String, ChatBackendError> {
        let payload = ChatPayload {
            session_id,
            message,
            history,
            persona_data: None,
            script: None,
            media: None,
        };
        self.post("unpersona_chat", &payload).await
    }
}
