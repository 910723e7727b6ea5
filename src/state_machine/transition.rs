//! Pure state transition function
//!
//! Per-message decisions (in order):
//! 1. `chloe` mode answers through the unstructured backend.
//! 2. `free` mode, or script mode without a script, answers with the persona.
//! 3. A selected script must be locked before chatting.
//! 4. A locked script with no steps answers with a fixed notice.
//! 5. Otherwise the current step drives the reply: an unpaid paywall step is
//!    nagged on a counter cadence, any other step is played and the pointer
//!    advances.

use super::{ConvContext, ConvMode, ConvState, Effect, Event, Progress};
use crate::chat_backend::BackendCall;
use crate::db::Step;
use crate::paywall::PaywallMarker;
use thiserror::Error;

/// Reply when a script is selected but not locked yet
pub const LOCK_REQUIRED_REPLY: &str = "Verrouille le script avec 'Lock' avant de discuter.";

/// Reply when the locked script has no steps
pub const EMPTY_SCRIPT_REPLY: &str = "Le script n'a pas d'étapes.";

/// Nag cadence divisor for unpaid paywall steps
const NAG_EVERY: u32 = 3;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// The backend call this transition asks for, if any
    pub fn backend_call(&self) -> Option<&BackendCall> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::CallBackend { call, .. } => Some(call),
            _ => None,
        })
    }

    /// Whether the reply will carry a paywall marker
    pub fn shows_paywall(&self) -> bool {
        self.effects
            .iter()
            .any(|effect| matches!(effect, Effect::CallBackend { paywall: Some(_), .. }))
    }
}

/// Operator actions that are not allowed in the current state.
///
/// These are rejected without touching the conversation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Script is already locked")]
    AlreadyStarted,
    #[error("Script is not locked")]
    NotStarted,
    #[error("No script selected")]
    NoScriptSelected,
    #[error("Script has no steps")]
    EmptyScript,
    #[error("Current step is already unlocked")]
    AlreadyUnlocked,
    #[error("Unlock the script before changing it")]
    ScriptLocked,
    #[error("Mode and script are unchanged")]
    NoChange,
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::UserMessage { text } => Ok(on_user_message(state, &context.steps, text)),

        Event::Pay => {
            if !state.progress.script_started {
                return Err(TransitionError::NotStarted);
            }
            if state.progress.paywall_unlocked {
                return Err(TransitionError::AlreadyUnlocked);
            }
            Ok(with_progress(
                state,
                Progress {
                    paywall_unlocked: true,
                    paywall_counter: 0,
                    ..state.progress
                },
            ))
        }

        Event::Lock => {
            if !state.has_active_script() {
                return Err(TransitionError::NoScriptSelected);
            }
            if state.progress.script_started {
                return Err(TransitionError::AlreadyStarted);
            }
            if context.steps.is_empty() {
                return Err(TransitionError::EmptyScript);
            }
            Ok(with_progress(
                state,
                Progress {
                    script_started: true,
                    ..Progress::default()
                },
            ))
        }

        Event::Unlock => {
            if !state.progress.script_started {
                return Err(TransitionError::NotStarted);
            }
            Ok(with_progress(
                state,
                Progress {
                    script_started: false,
                    ..state.progress
                },
            ))
        }

        Event::SwitchMode { mode, script_id } => {
            // Escaping script mode is always allowed
            if state.progress.script_started && mode == ConvMode::Script {
                return Err(TransitionError::ScriptLocked);
            }
            let new_state = ConvState::new(mode, script_id);
            if new_state.mode == state.mode && new_state.script_id == state.script_id {
                return Err(TransitionError::NoChange);
            }
            Ok(TransitionResult::new(new_state).with_effect(Effect::PersistState))
        }

        Event::Reset => Ok(TransitionResult::new(ConvState {
            progress: Progress::default(),
            ..state.clone()
        })
        .with_effect(Effect::ClearMessages)
        .with_effect(Effect::PersistState)),
    }
}

fn with_progress(state: &ConvState, progress: Progress) -> TransitionResult {
    TransitionResult::new(ConvState {
        progress,
        ..state.clone()
    })
    .with_effect(Effect::PersistState)
}

// ============================================================
// User Message Handling
// ============================================================

fn on_user_message(state: &ConvState, steps: &[Step], text: String) -> TransitionResult {
    let unchanged = TransitionResult::new(state.clone()).with_effect(Effect::persist_user_message(text));

    match (state.mode, state.script_id) {
        (ConvMode::Chloe, _) => unchanged.with_effect(Effect::call_backend(BackendCall::Unpersona)),

        (ConvMode::Free, _) | (ConvMode::Script, None) => {
            unchanged.with_effect(Effect::call_backend(BackendCall::Personality))
        }

        (ConvMode::Script, Some(_)) if !state.progress.script_started => {
            unchanged.with_effect(Effect::reply(LOCK_REQUIRED_REPLY))
        }

        (ConvMode::Script, Some(_)) => match resolve_step_index(state.progress.current_step, steps.len()) {
            None => unchanged.with_effect(Effect::reply(EMPTY_SCRIPT_REPLY)),
            Some(index) => on_script_step(state, steps, index, unchanged),
        },
    }
}

fn on_script_step(
    state: &ConvState,
    steps: &[Step],
    index: usize,
    mut result: TransitionResult,
) -> TransitionResult {
    let step = &steps[index];
    let progress = state.progress;

    if step.kind.is_paywall() && !progress.paywall_unlocked {
        let counter = progress.paywall_counter.saturating_add(1);
        let effect = if should_nag(counter) {
            Effect::call_backend_with_paywall(
                step_call(step),
                PaywallMarker::new(step.title.as_deref(), step.price.as_deref()),
            )
        } else {
            // Keep chatting naturally between nags
            Effect::call_backend(BackendCall::Personality)
        };
        result.new_state.progress.paywall_counter = counter;
        return result.with_effect(effect).with_effect(Effect::PersistState);
    }

    let step_count = u32::try_from(steps.len()).unwrap_or(u32::MAX);
    let next_step = progress.current_step.saturating_add(1).min(step_count);
    let entering_paywall = next_step != progress.current_step
        && resolve_step_index(next_step, steps.len()).is_some_and(|next| steps[next].kind.is_paywall());

    result.new_state.progress = Progress {
        current_step: next_step,
        // Unlocking only covers the step active at payment time
        paywall_unlocked: false,
        paywall_counter: if entering_paywall {
            0
        } else {
            progress.paywall_counter
        },
        ..progress
    };
    result
        .with_effect(Effect::call_backend(step_call(step)))
        .with_effect(Effect::PersistState)
}

/// Scripted backend call for a step, media variant for media kinds
fn step_call(step: &Step) -> BackendCall {
    if step.kind.has_media() {
        BackendCall::ScriptMedia {
            script: step.text.clone(),
            media: step.media_desc.clone().unwrap_or_default(),
        }
    } else {
        BackendCall::Script {
            script: step.text.clone(),
        }
    }
}

// Helper functions

/// Index of the step a 1-based pointer refers to, clamped into the list.
///
/// `None` only when there are no steps.
pub fn resolve_step_index(current_step: u32, step_count: usize) -> Option<usize> {
    let last = step_count.checked_sub(1)?;
    let index = usize::try_from(current_step.saturating_sub(1)).unwrap_or(usize::MAX);
    Some(index.min(last))
}

/// Whether an unpaid paywall step shows its marker at this counter value:
/// on the first message, then every third.
pub fn should_nag(counter: u32) -> bool {
    counter == 1 || (counter != 0 && counter % NAG_EVERY == 0)
}
