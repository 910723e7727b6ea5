//! Property-based tests for the progression engine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::*;
use super::*;
use crate::chat_backend::BackendCall;
use crate::db::{test_step, Step};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn message() -> Event {
    Event::UserMessage {
        text: "hello".to_string(),
    }
}

fn locked_state(progress: Progress) -> ConvState {
    ConvState {
        mode: ConvMode::Script,
        script_id: Some(1),
        progress: Progress {
            script_started: true,
            ..progress
        },
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_kind() -> impl Strategy<Value = StepKind> {
    prop_oneof![
        Just(StepKind::Text),
        Just(StepKind::MediaText),
        Just(StepKind::PaywallText),
        Just(StepKind::PaywallMediaText),
    ]
}

fn arb_steps(min: usize) -> impl Strategy<Value = Vec<Step>> {
    proptest::collection::vec(arb_kind(), min..8).prop_map(|kinds| {
        kinds
            .into_iter()
            .zip(1u32..)
            .map(|(kind, position)| test_step(position, kind, &format!("step {position}")))
            .collect()
    })
}

fn arb_mode() -> impl Strategy<Value = ConvMode> {
    prop_oneof![
        Just(ConvMode::Free),
        Just(ConvMode::Script),
        Just(ConvMode::Chloe),
    ]
}

fn arb_progress() -> impl Strategy<Value = Progress> {
    (1u32..20, any::<bool>(), any::<bool>(), 0u32..50).prop_map(
        |(current_step, paywall_unlocked, script_started, paywall_counter)| Progress {
            current_step,
            paywall_unlocked,
            script_started,
            paywall_counter,
        },
    )
}

fn arb_state() -> impl Strategy<Value = ConvState> {
    (arb_mode(), proptest::option::of(1i64..5), arb_progress()).prop_map(
        |(mode, script_id, progress)| ConvState {
            mode,
            script_id,
            progress,
        },
    )
}

/// Step a user message was answered from, if it was a scripted call
fn played_step<'a>(result: &TransitionResult, steps: &'a [Step]) -> Option<&'a Step> {
    match result.backend_call()? {
        BackendCall::Script { script } | BackendCall::ScriptMedia { script, .. } => {
            steps.iter().find(|step| &step.text == script)
        }
        _ => None,
    }
}

proptest! {
    #[test]
    fn prop_resolved_index_is_clamped(current_step in 1u32..40, len in 1usize..30) {
        let index = resolve_step_index(current_step, len).unwrap();
        let expected = (current_step as usize - 1).min(len - 1);
        prop_assert_eq!(index, expected);
    }

    #[test]
    fn prop_no_index_without_steps(current_step in any::<u32>()) {
        prop_assert_eq!(resolve_step_index(current_step, 0), None);
    }

    #[test]
    fn prop_decision_uses_clamped_step(
        steps in arb_steps(1),
        extra in 0u32..6,
    ) {
        let len = u32::try_from(steps.len()).unwrap();
        let current_step = 1 + (extra + len) % (len + 5);
        let state = locked_state(Progress {
            current_step,
            paywall_unlocked: true,
            ..Progress::default()
        });
        let ctx = ConvContext::new(1, steps.clone());
        let result = transition(&state, &ctx, message()).unwrap();

        let expected = &steps[(current_step as usize - 1).min(steps.len() - 1)];
        prop_assert_eq!(played_step(&result, &steps).map(|s| s.position), Some(expected.position));
    }

    #[test]
    fn prop_paywall_nags_on_cadence(counter in 0u32..200) {
        let mut step = test_step(1, StepKind::PaywallText, "offer");
        step.title = Some("Bonus".to_string());
        let ctx = ConvContext::new(1, vec![step]);
        let state = locked_state(Progress {
            paywall_counter: counter,
            ..Progress::default()
        });

        let result = transition(&state, &ctx, message()).unwrap();
        let next = counter + 1;
        prop_assert_eq!(result.new_state.progress.paywall_counter, next);
        prop_assert_eq!(result.shows_paywall(), next == 1 || next % 3 == 0);
        prop_assert_eq!(result.new_state.progress.current_step, 1);
        if !result.shows_paywall() {
            prop_assert_eq!(result.backend_call(), Some(&BackendCall::Personality));
        }
    }

    #[test]
    fn prop_pay_then_message_takes_unlocked_branch(
        counter in 0u32..100,
        kind in prop_oneof![Just(StepKind::PaywallText), Just(StepKind::PaywallMediaText)],
    ) {
        let steps = vec![
            test_step(1, kind, "offer"),
            test_step(2, StepKind::Text, "thanks"),
        ];
        let ctx = ConvContext::new(1, steps);
        let state = locked_state(Progress {
            paywall_counter: counter,
            ..Progress::default()
        });

        let paid = transition(&state, &ctx, Event::Pay).unwrap();
        prop_assert!(paid.new_state.progress.paywall_unlocked);
        prop_assert_eq!(paid.new_state.progress.paywall_counter, 0);

        let result = transition(&paid.new_state, &ctx, message()).unwrap();
        prop_assert!(!result.shows_paywall());
        prop_assert_eq!(result.new_state.progress.current_step, 2);
        prop_assert!(!result.new_state.progress.paywall_unlocked);
    }

    #[test]
    fn prop_playable_step_advances_by_one(steps in arb_steps(1), start in 1u32..10) {
        let len = u32::try_from(steps.len()).unwrap();
        let current_step = start.min(len);
        let state = locked_state(Progress {
            current_step,
            paywall_unlocked: true,
            paywall_counter: 5,
            ..Progress::default()
        });
        let ctx = ConvContext::new(1, steps.clone());
        let result = transition(&state, &ctx, message()).unwrap();
        let progress = result.new_state.progress;

        prop_assert_eq!(progress.current_step, (current_step + 1).min(len));
        prop_assert!(!progress.paywall_unlocked);
        let entered = progress.current_step != current_step;
        if entered && steps[progress.current_step as usize - 1].kind.is_paywall() {
            prop_assert_eq!(progress.paywall_counter, 0);
        } else {
            prop_assert_eq!(progress.paywall_counter, 5);
        }
    }

    #[test]
    fn prop_lock_rejected_when_started(state in arb_state(), steps in arb_steps(1)) {
        let mut state = state;
        state.progress.script_started = true;
        let ctx = ConvContext::new(1, steps);
        prop_assert!(transition(&state, &ctx, Event::Lock).is_err());
    }

    #[test]
    fn prop_switch_into_script_rejected_when_started(
        state in arb_state(),
        script_id in proptest::option::of(1i64..5),
    ) {
        let mut state = state;
        state.progress.script_started = true;
        let ctx = ConvContext::new(1, vec![]);
        let result = transition(&state, &ctx, Event::SwitchMode { mode: ConvMode::Script, script_id });
        prop_assert_eq!(result.unwrap_err(), TransitionError::ScriptLocked);
    }

    #[test]
    fn prop_accepted_switch_resets_progress(
        state in arb_state(),
        mode in arb_mode(),
        script_id in proptest::option::of(1i64..5),
    ) {
        let ctx = ConvContext::new(1, vec![]);
        if let Ok(result) = transition(&state, &ctx, Event::SwitchMode { mode, script_id }) {
            prop_assert_eq!(result.new_state.progress, Progress::default());
            prop_assert_eq!(result.new_state.mode, mode);
            if mode != ConvMode::Script {
                prop_assert_eq!(result.new_state.script_id, None);
            }
        }
    }

    #[test]
    fn prop_user_message_always_stored_first(state in arb_state(), steps in arb_steps(0)) {
        let ctx = ConvContext::new(1, steps);
        let result = transition(&state, &ctx, message()).unwrap();
        prop_assert_eq!(&result.effects[0], &Effect::persist_user_message("hello"));
    }

    #[test]
    fn prop_outside_script_mode_state_unchanged(state in arb_state(), steps in arb_steps(0)) {
        prop_assume!(state.mode != ConvMode::Script);
        let ctx = ConvContext::new(1, steps);
        let result = transition(&state, &ctx, message()).unwrap();
        prop_assert_eq!(result.new_state, state);
        prop_assert!(!result.effects.contains(&Effect::PersistState));
    }
}
