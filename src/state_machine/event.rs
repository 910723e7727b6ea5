//! Events that can occur in a conversation

use super::state::ConvMode;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Subscriber events
    UserMessage {
        text: String,
    },

    // Operator actions
    /// Confirm payment of the current paywall step
    Pay,
    /// Fix the conversation to sequential progression through its script
    Lock,
    Unlock,
    SwitchMode {
        mode: ConvMode,
        script_id: Option<i64>,
    },
    /// Drop all messages and restart progression
    Reset,
}

impl Event {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::Pay => "pay",
            Event::Lock => "lock",
            Event::Unlock => "unlock",
            Event::SwitchMode { .. } => "switch_mode",
            Event::Reset => "reset",
        }
    }
}
