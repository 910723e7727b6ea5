//! API request and response types

use crate::db::{Conversation, ConversationSummary, Message, MoveDirection, Persona, Script, Step, Subscriber};
use crate::paywall::PaywallMarker;
use crate::state_machine::ConvMode;
use serde::{Deserialize, Serialize};

/// Request to rename the bot and replace its persona
#[derive(Debug, Deserialize)]
pub struct UpdateBotRequest {
    pub name: String,
    #[serde(default)]
    pub persona: Persona,
}

/// Request to create or edit a script
#[derive(Debug, Deserialize)]
pub struct ScriptRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request to reorder a step
#[derive(Debug, Deserialize)]
pub struct MoveStepRequest {
    pub direction: MoveDirection,
}

/// Request to create (or rename) a subscriber
#[derive(Debug, Deserialize)]
pub struct SubscriberRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Request to open a conversation with a subscriber
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mode: ConvMode,
    #[serde(default)]
    pub script_id: Option<i64>,
}

/// Request to send a subscriber message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    /// Overrides the per-conversation session id
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Request to change mode and script
#[derive(Debug, Deserialize)]
pub struct SwitchModeRequest {
    pub mode: ConvMode,
    #[serde(default)]
    pub script_id: Option<i64>,
}

/// Script with its ordered steps
#[derive(Debug, Serialize)]
pub struct ScriptResponse {
    #[serde(flatten)]
    pub script: Script,
    pub steps: Vec<Step>,
}

/// Response for step reordering
#[derive(Debug, Serialize)]
pub struct MoveStepResponse {
    pub moved: bool,
    pub steps: Vec<Step>,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// Message with its paywall marker split out for display
#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    /// Content without the trailing marker
    pub text: String,
    pub paywall: Option<PaywallMarker>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        let (text, paywall) = match PaywallMarker::split(&message.content) {
            Some((text, marker)) => (text.to_string(), Some(marker)),
            None => (message.content.clone(), None),
        };
        Self {
            message,
            text,
            paywall,
        }
    }
}

/// Response with conversation and messages
#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation: Conversation,
    pub subscriber: Subscriber,
    pub messages: Vec<MessageView>,
    /// The current step is an unpaid paywall step of a locked script
    pub show_pay: bool,
}

/// Response for delete actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
