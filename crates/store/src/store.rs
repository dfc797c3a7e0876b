//! Blocking store: a value behind a `parking_lot` mutex.
//!
//! The lock is held for the whole allow/transform/adjust/commit sequence, so
//! concurrent attempts on one store are serialized and each observes the
//! value committed by the attempt before it.

use crate::coordinator::{run_attempt, Attempt};
use crate::policy::{ChangePolicy, NoPolicy};
use keel_core::{Outcome, StoreRef};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::fmt;

/// Locked state: the value and how many times it has been written.
#[derive(Debug)]
pub(crate) struct Slot<D> {
    pub(crate) value: D,
    pub(crate) commits: u64,
}

impl<D> Slot<D> {
    pub(crate) fn new(value: D) -> Self {
        Self { value, commits: 0 }
    }
}

/// A change-governed value shared across threads (`Store` is `Sync` when
/// `D` and `P` are).
///
/// ```ignore
/// let store = Store::new("counter", 5i64);
/// let outcome = store.update(|x| x + 1);
/// assert!(outcome.is_accepted());
/// assert_eq!(store.current(), 6);
/// ```
pub struct Store<D, P = NoPolicy> {
    handle: StoreRef,
    slot: Mutex<Slot<D>>,
    policy: P,
}

impl<D: Clone + PartialEq> Store<D, NoPolicy> {
    /// A store without policy: every well-formed change is accepted.
    pub fn new(label: &str, initial: D) -> Self {
        Self::with_policy(label, initial, NoPolicy)
    }
}

impl<D, P> Store<D, P>
where
    D: Clone + PartialEq,
    P: ChangePolicy<D>,
{
    pub fn with_policy(label: &str, initial: D, policy: P) -> Self {
        let handle = StoreRef::allocate(label);
        tracing::debug!(store = %handle, "store created");
        Self {
            handle,
            slot: Mutex::new(Slot::new(initial)),
            policy,
        }
    }

    /// Identity handle carried by every outcome from this store.
    pub fn handle(&self) -> &StoreRef {
        &self.handle
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Snapshot of the current value.
    pub fn current(&self) -> D {
        self.slot.lock().value.clone()
    }

    /// Borrows the current value under the lock.
    pub fn read<T>(&self, f: impl FnOnce(&D) -> T) -> T {
        f(&self.slot.lock().value)
    }

    /// Number of committed writes since creation.
    pub fn commits(&self) -> u64 {
        self.slot.lock().commits
    }

    /// Runs one policy-governed change attempt.
    ///
    /// Never returns an error and never unwinds because of the transform or a
    /// hook: every failure is an [`Outcome`] variant.
    pub fn change<F, E>(&self, transform: F) -> Outcome<D, P::Reason>
    where
        F: FnOnce(&D) -> Result<D, E>,
        E: fmt::Display,
    {
        let attempt = {
            let mut slot = self.slot.lock();
            let attempt = run_attempt(&self.handle, &mut slot.value, &self.policy, transform);
            if attempt.committed {
                slot.commits += 1;
            }
            attempt
        };
        log_attempt(&self.handle, &attempt);
        attempt.outcome
    }

    /// [`change`](Self::change) with an infallible transform.
    pub fn update(&self, f: impl FnOnce(&D) -> D) -> Outcome<D, P::Reason> {
        self.change(|current| Ok::<D, Infallible>(f(current)))
    }

    /// Writes `next` if the store still holds `expected`. Bypasses the policy.
    pub fn compare_and_set(&self, expected: &D, next: D) -> bool {
        let mut slot = self.slot.lock();
        if slot.value != *expected {
            return false;
        }
        slot.value = next;
        slot.commits += 1;
        true
    }
}

impl<D, P> fmt::Debug for Store<D, P>
where
    D: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("Store")
            .field("handle", &self.handle)
            .field("value", &slot.value)
            .field("commits", &slot.commits)
            .finish()
    }
}

pub(crate) fn log_attempt<D, R>(handle: &StoreRef, attempt: &Attempt<D, R>) {
    match &attempt.outcome {
        Outcome::Failed(failed) => {
            tracing::warn!(store = %handle, problem = %failed.problem(), "change failed");
        }
        outcome => {
            tracing::debug!(
                store = %handle,
                outcome = %outcome.kind(),
                committed = attempt.committed,
                "change attempt"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FnPolicy;
    use keel_core::{Problem, Stage};

    #[derive(Debug, Clone, PartialEq)]
    enum Why {
        NegativeValue,
    }

    fn guarded(initial: i64) -> Store<i64, FnPolicy<i64, Why>> {
        Store::with_policy(
            "guarded",
            initial,
            FnPolicy::new().reject_if(|v: &i64| (*v < 0).then_some(Why::NegativeValue)),
        )
    }

    #[test]
    fn increment_is_accepted() {
        let store = Store::new("counter", 5i64);
        let outcome = store.update(|x| x + 1);
        let acc = outcome.as_accepted().unwrap();
        assert_eq!((*acc.original_data(), *acc.new_data()), (5, 6));
        assert_eq!(store.current(), 6);
        assert_eq!(store.commits(), 1);
    }

    #[test]
    fn negative_value_is_rejected() {
        let store = guarded(6);
        let outcome = store.update(|_| -1);
        let r = outcome.as_rejected().unwrap();
        assert_eq!((*r.original_data(), *r.propose(), *r.rollback()), (6, -1, 6));
        assert_eq!(r.reason(), &Why::NegativeValue);
        assert_eq!(store.current(), 6);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn faulting_transform_is_failed() {
        let store = guarded(6);
        let outcome = store.change(|_| Err::<i64, _>("no quota"));
        let f = outcome.as_failed().unwrap();
        assert_eq!(*f.original_data(), 6);
        assert_eq!(f.problem(), &Problem::error(Stage::Transform, "no quota"));
        assert_eq!(store.current(), 6);
    }

    #[test]
    fn outcome_carries_store_handle() {
        let store = Store::new("h", 0u8);
        assert_eq!(store.update(|x| x + 1).store(), store.handle());
    }

    #[test]
    fn accepted_noop_counts_as_commit() {
        let store = Store::new("noop", 3i64);
        let outcome = store.update(|x| *x);
        assert!(outcome.is_accepted());
        assert!(outcome.has_changed());
        assert_eq!(store.commits(), 1);
    }

    #[test]
    fn compare_and_set_requires_expected() {
        let store = Store::new("cas", 1i64);
        assert!(!store.compare_and_set(&2, 10));
        assert_eq!(store.current(), 1);
        assert!(store.compare_and_set(&1, 10));
        assert_eq!(store.current(), 10);
        assert_eq!(store.commits(), 1);
    }

    #[test]
    fn read_borrows_value() {
        let store = Store::new("vec", vec![1, 2, 3]);
        assert_eq!(store.read(|v| v.len()), 3);
    }

    #[test]
    fn debug_shows_value() {
        let store = Store::new("dbg", 7i64);
        let text = format!("{store:?}");
        assert!(text.contains("value: 7"));
        assert!(text.contains("commits: 0"));
    }
}
