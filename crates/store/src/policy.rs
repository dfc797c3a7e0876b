//! Policy hooks consulted during a change attempt.
//!
//! Order within one attempt: `allow(original)` -> transform ->
//! `adjust(original, proposed)` -> `commit(original, adjusted)`.
//! A hook left at its default allows, keeps the proposal, and commits.

use keel_core::{Fault, PolicyError};
use std::convert::Infallible;
use std::fmt;

/// Validation, adjustment and commit rules for a store.
///
/// Hooks may run while the store is locked, so they should be quick and
/// free of side effects.
pub trait ChangePolicy<D: Clone> {
    /// Why a change was refused, carried by `NotAllowed` and `Rejected`.
    type Reason;

    /// Gate before the transform runs.
    fn allow(&self, current: &D) -> Result<(), PolicyError<Self::Reason>> {
        let _ = current;
        Ok(())
    }

    /// Returns the value to commit in place of `proposed`.
    fn adjust(&self, original: &D, proposed: &D) -> Result<D, Fault> {
        let _ = original;
        Ok(proposed.clone())
    }

    /// Final gate. A `Reject` rolls the store back to `original`.
    fn commit(&self, original: &D, adjusted: &D) -> Result<(), PolicyError<Self::Reason>> {
        let _ = (original, adjusted);
        Ok(())
    }
}

/// Allows everything and adjusts nothing.
///
/// `Reason = Infallible`, so a store under `NoPolicy` can only produce
/// `Accepted` or `Failed`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPolicy;

impl<D: Clone> ChangePolicy<D> for NoPolicy {
    type Reason = Infallible;
}

// ---------------------------------------------------------------------------
// Closure-backed policy
// ---------------------------------------------------------------------------

type AllowFn<D, R> = Box<dyn Fn(&D) -> Result<(), PolicyError<R>> + Send + Sync>;
type AdjustFn<D> = Box<dyn Fn(&D, &D) -> Result<D, Fault> + Send + Sync>;
type CommitFn<D, R> = Box<dyn Fn(&D, &D) -> Result<(), PolicyError<R>> + Send + Sync>;

/// A [`ChangePolicy`] assembled from closures.
///
/// ```ignore
/// let policy = FnPolicy::new()
///     .map_proposal(|_, p: &i64| (*p).min(100))
///     .reject_if(|v: &i64| (*v < 0).then_some(Why::NegativeValue));
/// let store = Store::with_policy("balance", 0i64, policy);
/// ```
pub struct FnPolicy<D, R> {
    allow: Option<AllowFn<D, R>>,
    adjust: Option<AdjustFn<D>>,
    commit: Option<CommitFn<D, R>>,
}

impl<D, R> FnPolicy<D, R> {
    pub fn new() -> Self {
        Self {
            allow: None,
            adjust: None,
            commit: None,
        }
    }

    /// Sets the allow hook.
    pub fn with_allow<F>(mut self, f: F) -> Self
    where
        F: Fn(&D) -> Result<(), PolicyError<R>> + Send + Sync + 'static,
    {
        self.allow = Some(Box::new(f));
        self
    }

    /// Refuses the attempt when `f` returns a reason for the current value.
    pub fn deny_if<F>(self, f: F) -> Self
    where
        F: Fn(&D) -> Option<R> + Send + Sync + 'static,
    {
        self.with_allow(move |current| match f(current) {
            Some(reason) => Err(PolicyError::Reject(reason)),
            None => Ok(()),
        })
    }

    /// Sets the adjust hook.
    pub fn with_adjust<F>(mut self, f: F) -> Self
    where
        F: Fn(&D, &D) -> Result<D, Fault> + Send + Sync + 'static,
    {
        self.adjust = Some(Box::new(f));
        self
    }

    /// Infallible form of [`with_adjust`](Self::with_adjust).
    pub fn map_proposal<F>(self, f: F) -> Self
    where
        F: Fn(&D, &D) -> D + Send + Sync + 'static,
    {
        self.with_adjust(move |original, proposed| Ok(f(original, proposed)))
    }

    /// Sets the commit hook.
    pub fn with_commit<F>(mut self, f: F) -> Self
    where
        F: Fn(&D, &D) -> Result<(), PolicyError<R>> + Send + Sync + 'static,
    {
        self.commit = Some(Box::new(f));
        self
    }

    /// Rejects and rolls back when `f` returns a reason for the adjusted value.
    pub fn reject_if<F>(self, f: F) -> Self
    where
        F: Fn(&D) -> Option<R> + Send + Sync + 'static,
    {
        self.with_commit(move |_, adjusted| match f(adjusted) {
            Some(reason) => Err(PolicyError::Reject(reason)),
            None => Ok(()),
        })
    }
}

impl<D, R> Default for FnPolicy<D, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, R> fmt::Debug for FnPolicy<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy")
            .field("allow", &self.allow.is_some())
            .field("adjust", &self.adjust.is_some())
            .field("commit", &self.commit.is_some())
            .finish()
    }
}

impl<D: Clone, R> ChangePolicy<D> for FnPolicy<D, R> {
    type Reason = R;

    fn allow(&self, current: &D) -> Result<(), PolicyError<R>> {
        match &self.allow {
            Some(f) => f(current),
            None => Ok(()),
        }
    }

    fn adjust(&self, original: &D, proposed: &D) -> Result<D, Fault> {
        match &self.adjust {
            Some(f) => f(original, proposed),
            None => Ok(proposed.clone()),
        }
    }

    fn commit(&self, original: &D, adjusted: &D) -> Result<(), PolicyError<R>> {
        match &self.commit {
            Some(f) => f(original, adjusted),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Why {
        Frozen,
        NegativeValue,
    }

    #[test]
    fn unset_hooks_fall_back_to_defaults() {
        let p: FnPolicy<i64, Why> = FnPolicy::new();
        assert_eq!(p.allow(&1), Ok(()));
        assert_eq!(p.adjust(&1, &5), Ok(5));
        assert_eq!(p.commit(&1, &5), Ok(()));
    }

    #[test]
    fn no_policy_defaults() {
        assert_eq!(ChangePolicy::<i64>::allow(&NoPolicy, &1), Ok(()));
        assert_eq!(ChangePolicy::<i64>::adjust(&NoPolicy, &1, &5), Ok(5));
        assert_eq!(ChangePolicy::<i64>::commit(&NoPolicy, &1, &5), Ok(()));
    }

    #[test]
    fn deny_if_maps_reason_to_reject() {
        let p = FnPolicy::new().deny_if(|v: &i64| (*v >= 10).then_some(Why::Frozen));
        assert_eq!(p.allow(&3), Ok(()));
        assert_eq!(p.allow(&10), Err(PolicyError::Reject(Why::Frozen)));
    }

    #[test]
    fn reject_if_checks_adjusted_value() {
        let p = FnPolicy::new().reject_if(|v: &i64| (*v < 0).then_some(Why::NegativeValue));
        assert_eq!(p.commit(&6, &7), Ok(()));
        assert_eq!(p.commit(&6, &-1), Err(PolicyError::Reject(Why::NegativeValue)));
    }

    #[test]
    fn map_proposal_sees_original_and_proposal() {
        let p = FnPolicy::<i64, Why>::new().map_proposal(|o, p| (*p).min(o + 2));
        assert_eq!(p.adjust(&5, &6), Ok(6));
        assert_eq!(p.adjust(&5, &50), Ok(7));
    }

    #[test]
    fn debug_lists_configured_hooks() {
        let p = FnPolicy::<i64, Why>::new().map_proposal(|_, p| *p);
        assert_eq!(
            format!("{p:?}"),
            "FnPolicy { allow: false, adjust: true, commit: false }"
        );
    }
}
