//! Conversation runtime executor
//!
//! Carries out the effects of one transition against the store and the chat
//! backend. State writes are deferred to the end so that a failed backend
//! call leaves the conversation exactly as it was.

use super::traits::Storage;
use crate::chat_backend::{ChatBackend, ChatBackendError, HistoryEntry};
use crate::db::{DbResult, Message, MessageRole, Persona};
use crate::paywall::PaywallMarker;
use crate::state_machine::{ConvState, Effect, TransitionResult};

/// Prefix of the reply stored when the chat backend fails
pub const BACKEND_ERROR_PREFIX: &str = "Erreur API: ";

/// What executing a transition's effects produced
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub user_message: Option<Message>,
    pub reply: Option<Message>,
    /// Marker appended to the reply, if any
    pub paywall: Option<PaywallMarker>,
    pub backend_error: Option<ChatBackendError>,
    /// Whether the new state was written
    pub state_saved: bool,
}

/// Executes effects for one conversation
pub struct ConversationRuntime<'a, S, B>
where
    S: Storage,
    B: ChatBackend,
{
    pub storage: &'a S,
    pub backend: &'a B,
    pub conversation_id: i64,
    pub session_id: &'a str,
    pub persona: &'a Persona,
    /// History as it was before this action's user message
    pub history: &'a [HistoryEntry],
}

impl<S, B> ConversationRuntime<'_, S, B>
where
    S: Storage,
    B: ChatBackend,
{
    pub async fn execute(&self, previous: &ConvState, result: TransitionResult) -> DbResult<ExecutionReport> {
        let TransitionResult { new_state, effects } = result;
        let mut report = ExecutionReport::default();
        let mut user_text = String::new();
        let mut reply_text: Option<String> = None;
        let mut persist_state = false;
        let mut clear_messages = false;

        for effect in effects {
            match effect {
                Effect::PersistUserMessage { text } => {
                    let message = self
                        .storage
                        .add_message(self.conversation_id, MessageRole::User, &text)
                        .await?;
                    report.user_message = Some(message);
                    user_text = text;
                }

                Effect::Reply { text } => reply_text = Some(text),

                Effect::CallBackend { call, paywall } => {
                    tracing::debug!(
                        conv_id = self.conversation_id,
                        call = call.name(),
                        paywall = paywall.is_some(),
                        "Calling chat backend"
                    );
                    match self
                        .backend
                        .dispatch(&call, self.session_id, &user_text, self.history, self.persona)
                        .await
                    {
                        Ok(reply) => {
                            reply_text = Some(match &paywall {
                                Some(marker) => marker.append_to(&reply),
                                None => reply,
                            });
                            report.paywall = paywall;
                        }
                        Err(e) => {
                            tracing::warn!(
                                conv_id = self.conversation_id,
                                call = call.name(),
                                error = %e,
                                "Backend call failed, keeping state"
                            );
                            reply_text = Some(format!("{BACKEND_ERROR_PREFIX}{e}"));
                            report.backend_error = Some(e);
                        }
                    }
                }

                Effect::PersistState => persist_state = true,

                Effect::ClearMessages => clear_messages = true,
            }
        }

        let save = persist_state && report.backend_error.is_none();
        if let Some(reply) = reply_text {
            let new = save.then_some(&new_state);
            let commit = self
                .storage
                .commit_exchange(self.conversation_id, previous, new, &reply)
                .await?;
            report.reply = Some(commit.reply);
            report.state_saved = commit.state_saved;
        } else if clear_messages {
            self.storage
                .reset_conversation(self.conversation_id, &new_state)
                .await?;
            report.state_saved = true;
        } else if save {
            self.storage.save_state(self.conversation_id, &new_state).await?;
            report.state_saved = true;
        }

        Ok(report)
    }
}
