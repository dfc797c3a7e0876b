//! Property tests for the change protocol.

use keel_core::{Fault, OutcomeKind, PolicyError};
use keel_store::{FnPolicy, Store};
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
enum Why {
    Locked,
    TooLarge,
}

/// What one generated attempt does at each step.
#[derive(Debug, Clone)]
struct Script {
    deny: bool,
    fault_transform: bool,
    delta: i64,
    clamp: Option<i64>,
    fault_adjust: bool,
    ceiling: i64,
}

fn script() -> impl Strategy<Value = Script> {
    (
        proptest::bool::weighted(0.15),
        proptest::bool::weighted(0.15),
        -50i64..50,
        proptest::option::of(-20i64..20),
        proptest::bool::weighted(0.1),
        -100i64..100,
    )
        .prop_map(|(deny, fault_transform, delta, clamp, fault_adjust, ceiling)| Script {
            deny,
            fault_transform,
            delta,
            clamp,
            fault_adjust,
            ceiling,
        })
}

fn policy_for(s: &Script) -> FnPolicy<i64, Why> {
    let deny = s.deny;
    let clamp = s.clamp;
    let fault_adjust = s.fault_adjust;
    let ceiling = s.ceiling;
    FnPolicy::<i64, Why>::new()
        .with_allow(move |_| if deny { Err(PolicyError::Reject(Why::Locked)) } else { Ok(()) })
        .with_adjust(move |_, p| {
            if fault_adjust {
                return Err(Fault::new("adjust fault"));
            }
            Ok(match clamp {
                Some(c) => (*p).min(c),
                None => *p,
            })
        })
        .reject_if(move |v| (*v > ceiling).then_some(Why::TooLarge))
}

proptest! {
    #[test]
    fn one_attempt_resolves_consistently(initial in -100i64..100, s in script()) {
        let store = Store::with_policy("prop", initial, policy_for(&s));
        let commits_before = store.commits();
        let fault = s.fault_transform;
        let delta = s.delta;
        let outcome = store.change(move |x| {
            if fault { Err("transform fault") } else { Ok(x + delta) }
        });

        // Exactly one tag, and the narrowed view agrees with it.
        let present = [
            outcome.as_not_allowed().is_some(),
            outcome.as_accepted().is_some(),
            outcome.as_adjusted().is_some(),
            outcome.as_rejected().is_some(),
            outcome.as_failed().is_some(),
        ];
        prop_assert_eq!(present.iter().filter(|p| **p).count(), 1);

        prop_assert_eq!(*outcome.original_data(), initial);
        prop_assert_eq!(store.current(), *outcome.value());
        prop_assert!(store.commits() - commits_before <= 1);
        prop_assert_eq!(store.commits() - commits_before, u64::from(outcome.has_changed()));

        match outcome.kind() {
            OutcomeKind::NotAllowed => {
                prop_assert!(s.deny);
            }
            OutcomeKind::Accepted => {
                let a = outcome.as_accepted().unwrap();
                prop_assert_eq!(*a.new_data(), initial + delta);
            }
            OutcomeKind::Adjusted => {
                let a = outcome.as_adjusted().unwrap();
                prop_assert_eq!(*a.proposed_data(), initial + delta);
                prop_assert_ne!(a.proposed_data(), a.adjusted_data());
            }
            OutcomeKind::Rejected => {
                let r = outcome.as_rejected().unwrap();
                // The raw transform output, even when adjust clamped it.
                prop_assert_eq!(*r.propose(), initial + delta);
                prop_assert_eq!(r.rollback(), r.original_data());
                prop_assert_eq!(store.current(), initial);
            }
            OutcomeKind::Failed => {
                prop_assert!(s.fault_transform || s.fault_adjust);
                prop_assert_eq!(store.current(), initial);
            }
        }
    }

    #[test]
    fn identity_adjust_never_adjusts(initial in any::<i32>(), delta in any::<i32>()) {
        let store = Store::with_policy(
            "identity",
            i64::from(initial),
            FnPolicy::<i64, Why>::new().map_proposal(|_, p| *p),
        );
        let outcome = store.update(|x| x + i64::from(delta));
        prop_assert_eq!(outcome.kind(), OutcomeKind::Accepted);
    }

    #[test]
    fn denied_store_repeats_not_allowed(initial in any::<i64>(), tries in 1usize..20) {
        let store = Store::with_policy(
            "denied",
            initial,
            FnPolicy::new().with_allow(|_: &i64| Err(PolicyError::Reject(Why::Locked))),
        );
        for _ in 0..tries {
            let outcome = store.update(|x| x.wrapping_add(1));
            let n = outcome.as_not_allowed().unwrap();
            prop_assert_eq!(*n.original_data(), initial);
            prop_assert_eq!(n.reason(), &Why::Locked);
        }
        prop_assert_eq!(store.commits(), 0);
    }
}
