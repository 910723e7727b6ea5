//! Chat backend abstraction
//!
//! The external personality-chat service answers every subscriber message.
//! The progression engine only decides which of its four calls to make.

mod error;
mod sinhome;
mod types;

pub use error::{ChatBackendError, ChatBackendErrorKind};
pub use sinhome::SinhomeClient;
pub use types::*;

use crate::db::Persona;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8001";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the chat backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("SINHOME_API_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: std::env::var("SINHOME_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Common interface for the chat service
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn personality_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
    ) -> Result<String, ChatBackendError>;

    async fn script_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
    ) -> Result<String, ChatBackendError>;

    async fn script_media(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
        media: &str,
    ) -> Result<String, ChatBackendError>;

    async fn unpersona_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<String, ChatBackendError>;

    /// Make the call the engine asked for
    async fn dispatch(
        &self,
        call: &BackendCall,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
    ) -> Result<String, ChatBackendError> {
        match call {
            BackendCall::Personality => {
                self.personality_chat(session_id, message, history, persona)
                    .await
            }
            BackendCall::Script { script } => {
                self.script_chat(session_id, message, history, persona, script)
                    .await
            }
            BackendCall::ScriptMedia { script, media } => {
                self.script_media(session_id, message, history, persona, script, media)
                    .await
            }
            BackendCall::Unpersona => self.unpersona_chat(session_id, message, history).await,
        }
    }
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn personality_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
    ) -> Result<String, ChatBackendError> {
        (**self)
            .personality_chat(session_id, message, history, persona)
            .await
    }

    async fn script_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
    ) -> Result<String, ChatBackendError> {
        (**self)
            .script_chat(session_id, message, history, persona, script)
            .await
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
        (**self)
            .script_media(session_id, message, history, persona, script, media)
            .await
    }

    async fn unpersona_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<String, ChatBackendError> {
        (**self).unpersona_chat(session_id, message, history).await
    }
}

/// Logging wrapper for chat backends
pub struct LoggingBackend {
    inner: Arc<dyn ChatBackend>,
}

impl LoggingBackend {
    pub fn new(inner: Arc<dyn ChatBackend>) -> Self {
        Self { inner }
    }

    async fn logged<F>(&self, call: &'static str, session_id: &str, fut: F) -> Result<String, ChatBackendError>
    where
        F: Future<Output = Result<String, ChatBackendError>> + Send,
    {
        let start = std::time::Instant::now();
        let result = fut.await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    call,
                    session_id,
                    duration_ms = %duration.as_millis(),
                    reply_chars = reply.chars().count(),
                    "Chat backend call completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    call,
                    session_id,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    error = %e.message,
                    "Chat backend call failed"
                );
            }
        }

        result
    }
}

#[async_trait]
impl ChatBackend for LoggingBackend {
    async fn personality_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
    ) -> Result<String, ChatBackendError> {
        self.logged(
            "personality_chat",
            session_id,
            self.inner.personality_chat(session_id, message, history, persona),
        )
        .await
    }

    async fn script_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
        persona: &Persona,
        script: &str,
    ) -> Result<String, ChatBackendError> {
        self.logged(
            "script_chat",
            session_id,
            self.inner
                .script_chat(session_id, message, history, persona, script),
        )
        .await
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
        self.logged(
            "script_media",
            session_id,
            self.inner
                .script_media(session_id, message, history, persona, script, media),
        )
        .await
    }

    async fn unpersona_chat(
        &self,
        session_id: &str,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<String, ChatBackendError> {
        self.logged(
            "unpersona_chat",
            session_id,
            self.inner.unpersona_chat(session_id, message, history),
        )
        .await
    }
}
