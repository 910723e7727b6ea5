//! Conversation progression engine
//!
//! Implements the Elm Architecture pattern with pure state transitions.
//! Every decision about which backend call to make, when to show the
//! paywall and when to advance the step pointer is taken here, without I/O.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{ConvContext, ConvMode, ConvState, Progress, StepKind};
pub use transition::{transition, TransitionError, TransitionResult};
