//! Runtime for driving conversations
//!
//! Serializes every action on a conversation, feeds the pure transition
//! function with a fresh snapshot and executes the resulting effects.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{ConversationRuntime, ExecutionReport, BACKEND_ERROR_PREFIX};
pub use traits::*;

use crate::chat_backend::{BackendCall, ChatBackend, LoggingBackend};
use crate::db::{Conversation, DbError, Message};
use crate::paywall::PaywallMarker;
use crate::state_machine::{transition, ConvContext, Event, TransitionError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = RuntimeManager<DatabaseStorage, LoggingBackend>;

/// Default number of trailing messages sent as history
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] DbError),
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("Rejected: {0}")]
    Rejected(TransitionError),
}

/// Result of an operator action
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub applied: bool,
    /// Why the action was not applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
    pub conversation: Conversation,
}

/// Result of a subscriber message
#[derive(Debug, Serialize)]
pub struct Exchange {
    pub user_message: Message,
    pub reply: Message,
    pub paywall: Option<PaywallMarker>,
    /// Backend failure that produced the reply, if any
    pub error: Option<String>,
    pub conversation: Conversation,
}

/// Per-conversation serialization and UI session
struct ConversationHandle {
    lock: Mutex<()>,
    session_id: String,
}

/// Manager for all conversation runtimes
pub struct RuntimeManager<S, B>
where
    S: Storage,
    B: ChatBackend,
{
    storage: S,
    backend: B,
    history_limit: usize,
    handles: RwLock<HashMap<i64, Arc<ConversationHandle>>>,
}

impl<S, B> RuntimeManager<S, B>
where
    S: Storage,
    B: ChatBackend,
{
    pub fn new(storage: S, backend: B, history_limit: usize) -> Self {
        Self {
            storage,
            backend,
            history_limit,
            handles: RwLock::new(HashMap::new()),
        }
    }

    async fn handle(&self, conv_id: i64) -> Arc<ConversationHandle> {
        if let Some(handle) = self.handles.read().await.get(&conv_id) {
            return Arc::clone(handle);
        }
        let mut handles = self.handles.write().await;
        Arc::clone(handles.entry(conv_id).or_insert_with(|| {
            Arc::new(ConversationHandle {
                lock: Mutex::new(()),
                session_id: uuid::Uuid::new_v4().to_string(),
            })
        }))
    }

    /// Session id sent to the chat backend for this conversation
    pub async fn session_id(&self, conv_id: i64) -> String {
        self.handle(conv_id).await.session_id.clone()
    }

    /// Drop the in-memory handle of a deleted conversation
    pub async fn forget(&self, conv_id: i64) {
        self.handles.write().await.remove(&conv_id);
    }

    /// Answer a subscriber message.
    ///
    /// A backend failure is not an error here: it becomes the stored reply
    /// and the conversation state is left untouched.
    pub async fn send_message(
        &self,
        conv_id: i64,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<Exchange, RuntimeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RuntimeError::EmptyMessage);
        }

        let handle = self.handle(conv_id).await;
        let _guard = handle.lock.lock().await;
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&handle.session_id);

        let report = self
            .run(
                conv_id,
                session_id,
                Event::UserMessage {
                    text: text.to_string(),
                },
            )
            .await?
            .map_err(RuntimeError::Rejected)?;

        tracing::debug!(conv_id, state_saved = report.state_saved, "Exchange committed");
        let (Some(user_message), Some(reply)) = (report.user_message, report.reply) else {
            return Err(RuntimeError::Store(DbError::ConversationNotFound(conv_id)));
        };
        Ok(Exchange {
            user_message,
            reply,
            paywall: report.paywall,
            error: report.backend_error.map(|e| e.message),
            conversation: self.storage.get_conversation(conv_id).await?,
        })
    }

    /// Apply an operator action (pay, lock, unlock, mode switch, reset).
    ///
    /// Actions that are not allowed in the current state change nothing and
    /// come back with `applied: false`.
    pub async fn apply_action(&self, conv_id: i64, event: Event) -> Result<Outcome, RuntimeError> {
        let handle = self.handle(conv_id).await;
        let _guard = handle.lock.lock().await;

        let action = event.name();
        let rejection = match self.run(conv_id, &handle.session_id, event).await? {
            Ok(_) => {
                tracing::info!(conv_id, action, "Operator action applied");
                None
            }
            Err(e) => {
                tracing::debug!(conv_id, action, reason = %e, "Operator action rejected");
                Some(e.to_string())
            }
        };

        Ok(Outcome {
            applied: rejection.is_none(),
            rejection,
            conversation: self.storage.get_conversation(conv_id).await?,
        })
    }

    /// Snapshot, transition and execute one event. Must hold the handle lock.
    async fn run(
        &self,
        conv_id: i64,
        session_id: &str,
        event: Event,
    ) -> Result<Result<ExecutionReport, TransitionError>, RuntimeError> {
        let snapshot = self.storage.load_snapshot(conv_id).await?;
        // History never includes the message being answered
        let history = if matches!(event, Event::UserMessage { .. }) {
            self.storage.recent_history(conv_id, self.history_limit).await?
        } else {
            Vec::new()
        };

        let state = snapshot.conversation.state;
        let context = ConvContext::new(conv_id, snapshot.steps);
        let result = match transition(&state, &context, event) {
            Ok(result) => result,
            Err(e) => return Ok(Err(e)),
        };
        tracing::debug!(
            conv_id = context.conversation_id,
            call = result.backend_call().map(BackendCall::name),
            paywall = result.shows_paywall(),
            "Transition computed"
        );

        let runtime = ConversationRuntime {
            storage: &self.storage,
            backend: &self.backend,
            conversation_id: conv_id,
            session_id,
            persona: &snapshot.persona,
            history: &history,
        };
        Ok(Ok(runtime.execute(&state, result).await?))
    }
}
