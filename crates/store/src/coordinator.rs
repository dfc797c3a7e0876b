//! The change-attempt state machine.
//!
//! ```text
//! allow(original) --reject--> NotAllowed
//!   |
//! transform(original) --err/panic--> Failed
//!   |
//! adjust(original, proposed) --err/panic--> Failed
//!   |
//! commit(original, adjusted) --reject--> Rejected (rollback = original)
//!   |
//! write slot --> Accepted if adjusted == proposed, else Adjusted
//! ```
//!
//! Hook faults from allow/commit also land in `Failed`. Callers hold
//! exclusive access to the slot for the whole call; the slot is written at
//! most once, and only on the last step.

use crate::policy::ChangePolicy;
use keel_core::{Failed, NotAllowed, Outcome, PolicyError, Problem, Stage, StoreRef};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// An outcome plus whether the slot was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt<D, R> {
    pub outcome: Outcome<D, R>,
    pub committed: bool,
}

impl<D, R> Attempt<D, R> {
    fn kept(outcome: Outcome<D, R>) -> Self {
        Self {
            outcome,
            committed: false,
        }
    }

    fn failed(store: &StoreRef, original: D, problem: Problem) -> Self {
        Self::kept(Outcome::Failed(Failed::new(store.clone(), original, problem)))
    }
}

/// Runs one attempt against `slot`.
pub fn run_attempt<D, P, F, E>(
    store: &StoreRef,
    slot: &mut D,
    policy: &P,
    transform: F,
) -> Attempt<D, P::Reason>
where
    D: Clone + PartialEq,
    P: ChangePolicy<D> + ?Sized,
    F: FnOnce(&D) -> Result<D, E>,
    E: fmt::Display,
{
    let original = slot.clone();

    match run_gate(Stage::Allow, || policy.allow(&original)) {
        Ok(None) => {}
        Ok(Some(reason)) => {
            return Attempt::kept(Outcome::NotAllowed(NotAllowed::new(
                store.clone(),
                original,
                reason,
            )))
        }
        Err(problem) => return Attempt::failed(store, original, problem),
    }

    let proposed = match contain(Stage::Transform, || transform(&original)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            let problem = Problem::error(Stage::Transform, err.to_string());
            return Attempt::failed(store, original, problem);
        }
        Err(problem) => return Attempt::failed(store, original, problem),
    };

    let adjusted = match contain(Stage::Adjust, || policy.adjust(&original, &proposed)) {
        Ok(Ok(value)) => value,
        Ok(Err(fault)) => {
            let problem = Problem::error(Stage::Adjust, fault.into_message());
            return Attempt::failed(store, original, problem);
        }
        Err(problem) => return Attempt::failed(store, original, problem),
    };

    match run_gate(Stage::Commit, || policy.commit(&original, &adjusted)) {
        Ok(None) => {}
        // Nothing has been written, so the slot already holds the rollback.
        Ok(Some(reason)) => {
            return Attempt::kept(Outcome::rolled_back(
                store.clone(),
                original,
                proposed,
                reason,
            ))
        }
        Err(problem) => return Attempt::failed(store, original, problem),
    }

    *slot = adjusted.clone();
    Attempt {
        outcome: Outcome::committed(store.clone(), original, proposed, adjusted),
        committed: true,
    }
}

/// Runs `f`, turning an unwind into a [`Problem`].
fn contain<T>(stage: Stage, f: impl FnOnce() -> T) -> Result<T, Problem> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| Problem::panic(stage, payload.as_ref()))
}

/// Runs an allow/commit hook. `Ok(Some(reason))` is a refusal.
fn run_gate<R>(
    stage: Stage,
    hook: impl FnOnce() -> Result<(), PolicyError<R>>,
) -> Result<Option<R>, Problem> {
    match contain(stage, hook)? {
        Ok(()) => Ok(None),
        Err(PolicyError::Reject(reason)) => Ok(Some(reason)),
        Err(PolicyError::Fault(fault)) => Err(Problem::error(stage, fault.into_message())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FnPolicy, NoPolicy};
    use keel_core::{Fault, OutcomeKind, ProblemKind};
    use std::convert::Infallible;

    #[derive(Debug, Clone, PartialEq)]
    enum Why {
        Frozen,
        NegativeValue,
    }

    fn inc(x: &i64) -> Result<i64, Infallible> {
        Ok(x + 1)
    }

    #[test]
    fn accepted_writes_slot() {
        let store = StoreRef::allocate("t");
        let mut slot = 5i64;
        let a = run_attempt(&store, &mut slot, &NoPolicy, inc);
        assert!(a.committed);
        assert_eq!(slot, 6);
        let acc = a.outcome.as_accepted().unwrap();
        assert_eq!((*acc.original_data(), *acc.new_data()), (5, 6));
        assert_eq!(acc.store(), &store);
    }

    #[test]
    fn allow_refusal_skips_transform() {
        let store = StoreRef::allocate("t");
        let policy = FnPolicy::new().deny_if(|_: &i64| Some(Why::Frozen));
        let mut slot = 5i64;
        let mut ran = false;
        let a = run_attempt(&store, &mut slot, &policy, |x| {
            ran = true;
            inc(x)
        });
        assert!(!ran);
        assert!(!a.committed);
        assert_eq!(slot, 5);
        assert_eq!(a.outcome.as_not_allowed().unwrap().reason(), &Why::Frozen);
    }

    #[test]
    fn adjust_changes_committed_value() {
        let store = StoreRef::allocate("t");
        let policy = FnPolicy::<i64, Why>::new().map_proposal(|_, p| (*p).min(10));
        let mut slot = 5i64;
        let a = run_attempt(&store, &mut slot, &policy, |_| Ok::<_, Infallible>(42));
        assert_eq!(slot, 10);
        let adj = a.outcome.as_adjusted().unwrap();
        assert_eq!((*adj.proposed_data(), *adj.adjusted_data()), (42, 10));
    }

    #[test]
    fn identity_adjust_yields_accepted() {
        let store = StoreRef::allocate("t");
        let policy = FnPolicy::<i64, Why>::new().map_proposal(|_, p| *p);
        let mut slot = 1i64;
        let a = run_attempt(&store, &mut slot, &policy, inc);
        assert_eq!(a.outcome.kind(), OutcomeKind::Accepted);
    }

    #[test]
    fn commit_rejection_rolls_back() {
        let store = StoreRef::allocate("t");
        let policy = FnPolicy::new().reject_if(|v: &i64| (*v < 0).then_some(Why::NegativeValue));
        let mut slot = 6i64;
        let a = run_attempt(&store, &mut slot, &policy, |_| Ok::<_, Infallible>(-1));
        assert!(!a.committed);
        assert_eq!(slot, 6);
        let r = a.outcome.as_rejected().unwrap();
        assert_eq!((*r.original_data(), *r.propose(), *r.rollback()), (6, -1, 6));
        assert_eq!(r.reason(), &Why::NegativeValue);
    }

    #[test]
    fn rejection_after_adjust_reports_raw_proposal() {
        let store = StoreRef::allocate("t");
        let policy = FnPolicy::<i64, Why>::new()
            .map_proposal(|_, p| (*p).max(-5))
            .reject_if(|v| (*v < 0).then_some(Why::NegativeValue));
        let mut slot = 6i64;
        let a = run_attempt(&store, &mut slot, &policy, |_| Ok::<_, Infallible>(-40));
        assert!(!a.committed);
        assert_eq!(slot, 6);
        let r = a.outcome.as_rejected().unwrap();
        assert_eq!((*r.original_data(), *r.propose(), *r.rollback()), (6, -40, 6));
    }

    #[test]
    fn transform_error_fails() {
        let store = StoreRef::allocate("t");
        let mut slot = 6i64;
        let a = run_attempt(&store, &mut slot, &NoPolicy, |_| Err::<i64, _>("disk on fire"));
        assert_eq!(slot, 6);
        let p = a.outcome.as_failed().unwrap().problem();
        assert_eq!(p.stage(), Stage::Transform);
        assert_eq!(p.kind(), ProblemKind::Error);
        assert_eq!(p.message(), "disk on fire");
    }

    #[test]
    fn transform_panic_fails() {
        let store = StoreRef::allocate("t");
        let mut slot = 6i64;
        let a = run_attempt(&store, &mut slot, &NoPolicy, |_| -> Result<i64, Infallible> {
            panic!("overflow in transform")
        });
        assert_eq!(slot, 6);
        let p = a.outcome.as_failed().unwrap().problem();
        assert_eq!(p.kind(), ProblemKind::Panic);
        assert_eq!(p.message(), "overflow in transform");
    }

    #[test]
    fn hook_faults_are_failed_with_stage() {
        let store = StoreRef::allocate("t");

        let allow =
            FnPolicy::<i64, Why>::new().with_allow(|_| Err(Fault::new("allow broke").into()));
        let mut slot = 1i64;
        let a = run_attempt(&store, &mut slot, &allow, inc);
        assert_eq!(a.outcome.as_failed().unwrap().problem().stage(), Stage::Allow);

        let adjust =
            FnPolicy::<i64, Why>::new().with_adjust(|_, _| Err(Fault::new("adjust broke")));
        let a = run_attempt(&store, &mut slot, &adjust, inc);
        assert_eq!(a.outcome.as_failed().unwrap().problem().stage(), Stage::Adjust);

        let commit = FnPolicy::<i64, Why>::new().with_commit(|_, _| panic!("commit broke"));
        let a = run_attempt(&store, &mut slot, &commit, inc);
        let p = a.outcome.as_failed().unwrap().problem();
        assert_eq!((p.stage(), p.kind()), (Stage::Commit, ProblemKind::Panic));

        assert_eq!(slot, 1);
    }
}
