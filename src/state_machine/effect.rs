//! Effects produced by state transitions

use crate::chat_backend::BackendCall;
use crate::paywall::PaywallMarker;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Store the incoming subscriber message
    PersistUserMessage { text: String },

    /// Answer with a fixed text, no backend call
    Reply { text: String },

    /// Ask the chat backend for the reply. When a marker is present it is
    /// appended to the backend's reply.
    CallBackend {
        call: BackendCall,
        paywall: Option<PaywallMarker>,
    },

    /// Persist the new state. Skipped when the backend call failed.
    PersistState,

    /// Delete every message of the conversation
    ClearMessages,
}

impl Effect {
    pub fn persist_user_message(text: impl Into<String>) -> Self {
        Effect::PersistUserMessage { text: text.into() }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Effect::Reply { text: text.into() }
    }

    pub fn call_backend(call: BackendCall) -> Self {
        Effect::CallBackend {
            call,
            paywall: None,
        }
    }

    pub fn call_backend_with_paywall(call: BackendCall, marker: PaywallMarker) -> Self {
        Effect::CallBackend {
            call,
            paywall: Some(marker),
        }
    }
}
