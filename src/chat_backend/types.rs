//! Common types for chat backend calls

use crate::db::MessageRole;
use serde::{Deserialize, Serialize};

/// One prior message sent as conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Which backend endpoint answers a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// Persona chat without script
    Personality,
    /// Persona chat steered by a step's script text
    Script { script: String },
    /// Like `Script`, with a media description to present
    ScriptMedia { script: String, media: String },
    /// Chat without persona
    Unpersona,
}

impl BackendCall {
    /// Endpoint name, also used as the log field
    pub fn name(&self) -> &'static str {
        match self {
            BackendCall::Personality => "personality_chat",
            BackendCall::Script { .. } => "script_chat",
            BackendCall::ScriptMedia { .. } => "script_media",
            BackendCall::Unpersona => "unpersona_chat",
        }
    }
}
