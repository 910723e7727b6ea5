//! Conversation progression state types

use crate::db::Step;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stored enum value that does not name a known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// Conversation Mode
// ============================================================================

/// How incoming subscriber messages are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvMode {
    /// Persona chat, no script
    #[default]
    Free,
    /// Sequential progression through the active script
    Script,
    /// Unstructured chat without any persona
    Chloe,
}

impl ConvMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConvMode::Free => "free",
            ConvMode::Script => "script",
            ConvMode::Chloe => "chloe",
        }
    }
}

impl fmt::Display for ConvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConvMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(ConvMode::Free),
            "script" => Ok(ConvMode::Script),
            "chloe" => Ok(ConvMode::Chloe),
            other => Err(UnknownVariant {
                kind: "conversation mode",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Step Kind
// ============================================================================

/// Kind of a script step. Paywall-ness and media-ness derive from the kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Text,
    MediaText,
    PaywallText,
    PaywallMediaText,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [
        StepKind::Text,
        StepKind::MediaText,
        StepKind::PaywallText,
        StepKind::PaywallMediaText,
    ];

    /// Whether the step must be paid before its content is revealed
    pub fn is_paywall(self) -> bool {
        matches!(self, StepKind::PaywallText | StepKind::PaywallMediaText)
    }

    /// Whether the step carries a media description
    pub fn has_media(self) -> bool {
        matches!(self, StepKind::MediaText | StepKind::PaywallMediaText)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Text => "text",
            StepKind::MediaText => "media_text",
            StepKind::PaywallText => "paywall_text",
            StepKind::PaywallMediaText => "paywall_media_text",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "step kind",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Persisted progression fields of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based pointer into the active script's steps
    pub current_step: u32,
    /// One-shot: the current paywall step has been paid
    pub paywall_unlocked: bool,
    /// The script is locked for sequential progression
    pub script_started: bool,
    /// Messages received on the current unpaid paywall step
    pub paywall_counter: u32,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            current_step: 1,
            paywall_unlocked: false,
            script_started: false,
            paywall_counter: 0,
        }
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Everything the progression engine reads and writes on a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvState {
    pub mode: ConvMode,
    pub script_id: Option<i64>,
    #[serde(flatten)]
    pub progress: Progress,
}

impl ConvState {
    pub fn new(mode: ConvMode, script_id: Option<i64>) -> Self {
        Self {
            mode,
            script_id: if mode == ConvMode::Script {
                script_id
            } else {
                None
            },
            progress: Progress::default(),
        }
    }

    /// Script mode with a script selected
    pub fn has_active_script(&self) -> bool {
        self.mode == ConvMode::Script && self.script_id.is_some()
    }

    /// Whether the operator can confirm a payment for the step the
    /// conversation is currently sitting on
    pub fn awaiting_payment(&self, steps: &[Step]) -> bool {
        if !self.has_active_script() || !self.progress.script_started || self.progress.paywall_unlocked
        {
            return false;
        }
        super::transition::resolve_step_index(self.progress.current_step, steps.len())
            .is_some_and(|index| steps[index].kind.is_paywall())
    }
}

/// Context for the active script, read once per operator action
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub conversation_id: i64,
    /// Ordered steps of the active script, empty if none
    pub steps: Vec<Step>,
}

impl ConvContext {
    pub fn new(conversation_id: i64, steps: Vec<Step>) -> Self {
        Self {
            conversation_id,
            steps,
        }
    }
}
