//! Database schema and types

use crate::state_machine::state::UnknownVariant;
pub use crate::state_machine::{ConvMode, ConvState, Progress, StepKind};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS bots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    persona_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    bot_id INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (bot_id) REFERENCES bots(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS script_steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    script_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    step_type TEXT NOT NULL,
    title TEXT,
    script_text TEXT NOT NULL,
    media_desc TEXT,
    price TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (script_id) REFERENCES scripts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_steps_script_pos ON script_steps(script_id, position);

CREATE TABLE IF NOT EXISTS subscribers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscriber_id INTEGER NOT NULL,
    bot_id INTEGER NOT NULL,
    script_id INTEGER,
    mode TEXT NOT NULL,
    current_step INTEGER NOT NULL DEFAULT 1,
    paywall_unlocked INTEGER NOT NULL DEFAULT 0,
    script_started INTEGER NOT NULL DEFAULT 0,
    paywall_counter INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (subscriber_id) REFERENCES subscribers(id) ON DELETE CASCADE,
    FOREIGN KEY (bot_id) REFERENCES bots(id) ON DELETE CASCADE,
    FOREIGN KEY (script_id) REFERENCES scripts(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conv_id ON messages(conversation_id, id);
";

/// Columns added after the first release. Each statement fails with
/// "duplicate column" on databases that already have it.
pub const MIGRATION_ADD_COLUMNS: &[&str] = &[
    "ALTER TABLE script_steps ADD COLUMN price TEXT",
    "ALTER TABLE script_steps ADD COLUMN title TEXT",
    "ALTER TABLE conversations ADD COLUMN script_started INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE conversations ADD COLUMN paywall_counter INTEGER NOT NULL DEFAULT 0",
];

/// Fold the legacy `is_paywall` flag into the step kind, then clear it so it
/// can never disagree with a kind edited later.
///
/// Only databases created by the first release have the column; on fresh
/// databases the first statement fails with "no such column" and is ignored.
pub const MIGRATION_LEGACY_PAYWALL: &str = r"
UPDATE script_steps
SET step_type = CASE
    WHEN step_type = 'media_text' THEN 'paywall_media_text'
    ELSE 'paywall_text'
END
WHERE is_paywall = 1 AND step_type NOT LIKE 'paywall_%';
UPDATE script_steps SET is_paywall = 0 WHERE is_paywall != 0;
";

/// Display name of the single creator bot
pub const CREATOR_NAME: &str = "Créatrice";

// ============================================================
// Bot & Persona
// ============================================================

const SLIDER_MIN: u8 = 1;
const SLIDER_MAX: u8 = 5;

/// Persona sent to the chat backend as `persona_data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub name: String,
    pub base_prompt: String,
    pub dominance: u8,
    pub audacity: u8,
    pub sales_tactic: u8,
    pub tone: u8,
    pub emotion: u8,
    pub initiative: u8,
    pub vocabulary: u8,
    pub emojis: u8,
    pub imperfection: u8,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: CREATOR_NAME.to_string(),
            base_prompt: String::new(),
            dominance: 3,
            audacity: 3,
            sales_tactic: 2,
            tone: 2,
            emotion: 3,
            initiative: 3,
            vocabulary: 3,
            emojis: 3,
            imperfection: 1,
        }
    }
}

impl Persona {
    /// Parse the stored JSON; anything unreadable yields the defaults
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str::<Self>(json)
            .map(Self::clamped)
            .unwrap_or_default()
    }

    /// Force every slider into 1..=5
    pub fn clamped(mut self) -> Self {
        for slider in [
            &mut self.dominance,
            &mut self.audacity,
            &mut self.sales_tactic,
            &mut self.tone,
            &mut self.emotion,
            &mut self.initiative,
            &mut self.vocabulary,
            &mut self.emojis,
            &mut self.imperfection,
        ] {
            *slider = (*slider).clamp(SLIDER_MIN, SLIDER_MAX);
        }
        self
    }
}

/// Bot record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub persona: Persona,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================
// Scripts & Steps
// ============================================================

/// Script record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub bot_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One scripted beat of a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub script_id: i64,
    /// 1-based, dense within the script
    pub position: u32,
    pub kind: StepKind,
    pub title: Option<String>,
    pub text: String,
    pub media_desc: Option<String>,
    pub price: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable fields of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDraft {
    pub kind: StepKind,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub media_desc: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

impl StepDraft {
    pub fn new(kind: StepKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: None,
            text: text.into(),
            media_desc: None,
            price: None,
        }
    }

    /// Trim every field and drop the ones the kind does not use.
    ///
    /// Title and price only exist on paywall kinds, the media description
    /// only on media kinds.
    pub(crate) fn normalized(&self) -> Option<Self> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let paywall = self.kind.is_paywall();
        let media = self.kind.has_media();
        Some(Self {
            kind: self.kind,
            title: self.title.as_deref().filter(|_| paywall).and_then(non_blank),
            text: text.to_string(),
            media_desc: self.media_desc.as_deref().filter(|_| media).and_then(non_blank),
            price: self.price.as_deref().filter(|_| paywall).and_then(non_blank),
        })
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Direction for reordering a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

// ============================================================
// Subscribers & Conversations
// ============================================================

/// Subscriber record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub subscriber_id: i64,
    pub bot_id: i64,
    #[serde(flatten)]
    pub state: ConvState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Conversation joined with the names the console lists it by
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub subscriber_username: String,
    pub subscriber_display_name: Option<String>,
    pub bot_name: String,
    pub script_name: Option<String>,
}

// ============================================================
// Messages
// ============================================================

/// Message record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// What `commit_exchange` wrote
#[derive(Debug, Clone)]
pub struct ExchangeCommit {
    pub reply: Message,
    /// Whether the new conversation state was written
    pub state_saved: bool,
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(UnknownVariant {
                kind: "message role",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================
// SQL conversions
// ============================================================

/// Store an enum as its text name
macro_rules! text_column {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: UnknownVariant| FromSqlError::Other(Box::new(e)))
            }
        }
    )+};
}

text_column!(ConvMode, StepKind, MessageRole);
