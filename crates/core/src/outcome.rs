//! The closed result set of a single change attempt.
//!
//! Every attempt resolves to exactly one [`Outcome`]. All variants carry the
//! store handle and the value observed when the attempt started; the rest is
//! variant-specific:
//!
//! | Variant      | Extra fields                       | Store afterwards  |
//! |--------------|------------------------------------|-------------------|
//! | `NotAllowed` | `reason`                           | unchanged         |
//! | `Accepted`   | `new_data`                         | `new_data`        |
//! | `Adjusted`   | `proposed_data`, `adjusted_data`   | `adjusted_data`   |
//! | `Rejected`   | `propose`, `rollback`, `reason`    | `rollback`        |
//! | `Failed`     | `problem`                          | unchanged         |
//!
//! Payload structs have private fields. The validated constructors are the
//! only way in, and once built a payload is read-only.

use crate::error::{KeelError, KeelResult};
use crate::types::{Problem, StoreRef};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Fieldless tag of an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    NotAllowed,
    Accepted,
    Adjusted,
    Rejected,
    Failed,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 5] = [
        OutcomeKind::NotAllowed,
        OutcomeKind::Accepted,
        OutcomeKind::Adjusted,
        OutcomeKind::Rejected,
        OutcomeKind::Failed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::NotAllowed => "not_allowed",
            OutcomeKind::Accepted => "accepted",
            OutcomeKind::Adjusted => "adjusted",
            OutcomeKind::Rejected => "rejected",
            OutcomeKind::Failed => "failed",
        }
    }

    /// Only the two success tags commit a value.
    #[inline]
    pub const fn has_changed(self) -> bool {
        matches!(self, OutcomeKind::Accepted | OutcomeKind::Adjusted)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Variant payloads
// ---------------------------------------------------------------------------

/// The allow hook refused; the transform never ran.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NotAllowed<D, R> {
    store: StoreRef,
    original_data: D,
    reason: R,
}

impl<D, R> NotAllowed<D, R> {
    pub fn new(store: StoreRef, original_data: D, reason: R) -> Self {
        Self {
            store,
            original_data,
            reason,
        }
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn original_data(&self) -> &D {
        &self.original_data
    }

    pub fn reason(&self) -> &R {
        &self.reason
    }
}

/// The proposal was committed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Accepted<D> {
    store: StoreRef,
    original_data: D,
    new_data: D,
}

impl<D> Accepted<D> {
    pub fn new(store: StoreRef, original_data: D, new_data: D) -> Self {
        Self {
            store,
            original_data,
            new_data,
        }
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn original_data(&self) -> &D {
        &self.original_data
    }

    pub fn new_data(&self) -> &D {
        &self.new_data
    }
}

/// The adjust hook altered the proposal before it was committed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Adjusted<D> {
    store: StoreRef,
    original_data: D,
    proposed_data: D,
    adjusted_data: D,
}

impl<D: PartialEq> Adjusted<D> {
    /// Fails when `adjusted_data == proposed_data`: that attempt was
    /// accepted, not adjusted.
    pub fn new(
        store: StoreRef,
        original_data: D,
        proposed_data: D,
        adjusted_data: D,
    ) -> KeelResult<Self> {
        if proposed_data == adjusted_data {
            return Err(KeelError::InvalidOutcome(
                "adjusted value equals the proposal; the attempt is accepted".into(),
            ));
        }
        Ok(Self {
            store,
            original_data,
            proposed_data,
            adjusted_data,
        })
    }
}

impl<D> Adjusted<D> {
    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn original_data(&self) -> &D {
        &self.original_data
    }

    /// Raw output of the transform.
    pub fn proposed_data(&self) -> &D {
        &self.proposed_data
    }

    /// The value that was committed.
    pub fn adjusted_data(&self) -> &D {
        &self.adjusted_data
    }
}

/// The commit hook refused a computed value; the store kept `rollback`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Rejected<D, R> {
    store: StoreRef,
    original_data: D,
    propose: D,
    rollback: D,
    reason: R,
}

impl<D: PartialEq, R> Rejected<D, R> {
    /// Fails when `rollback != original_data`.
    pub fn new(
        store: StoreRef,
        original_data: D,
        propose: D,
        rollback: D,
        reason: R,
    ) -> KeelResult<Self> {
        if rollback != original_data {
            return Err(KeelError::InvalidOutcome(
                "rollback must restore the pre-attempt value".into(),
            ));
        }
        Ok(Self {
            store,
            original_data,
            propose,
            rollback,
            reason,
        })
    }
}

impl<D, R> Rejected<D, R> {
    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn original_data(&self) -> &D {
        &self.original_data
    }

    /// The transform's raw output. When the adjust hook changed it, the
    /// adjusted value is not kept: only the proposal is reported.
    pub fn propose(&self) -> &D {
        &self.propose
    }

    pub fn rollback(&self) -> &D {
        &self.rollback
    }

    pub fn reason(&self) -> &R {
        &self.reason
    }
}

/// The transform or a hook faulted; nothing was committed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Failed<D> {
    store: StoreRef,
    original_data: D,
    problem: Problem,
}

impl<D> Failed<D> {
    pub fn new(store: StoreRef, original_data: D, problem: Problem) -> Self {
        Self {
            store,
            original_data,
            problem,
        }
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn original_data(&self) -> &D {
        &self.original_data
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one change attempt. `R` is the policy's rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<D, R> {
    NotAllowed(NotAllowed<D, R>),
    Accepted(Accepted<D>),
    Adjusted(Adjusted<D>),
    Rejected(Rejected<D, R>),
    Failed(Failed<D>),
}

impl<D: PartialEq, R> Outcome<D, R> {
    /// Outcome of a committed attempt: `Accepted` when the committed value
    /// equals the proposal, `Adjusted` otherwise.
    pub fn committed(store: StoreRef, original_data: D, proposed: D, adjusted: D) -> Self {
        if proposed == adjusted {
            Outcome::Accepted(Accepted::new(store, original_data, adjusted))
        } else {
            Outcome::Adjusted(Adjusted {
                store,
                original_data,
                proposed_data: proposed,
                adjusted_data: adjusted,
            })
        }
    }
}

impl<D: Clone, R> Outcome<D, R> {
    /// Outcome of a commit-time rejection. The rollback is the original.
    pub fn rolled_back(store: StoreRef, original_data: D, propose: D, reason: R) -> Self {
        Outcome::Rejected(Rejected {
            store,
            rollback: original_data.clone(),
            original_data,
            propose,
            reason,
        })
    }
}

impl<D, R> Outcome<D, R> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::NotAllowed(_) => OutcomeKind::NotAllowed,
            Outcome::Accepted(_) => OutcomeKind::Accepted,
            Outcome::Adjusted(_) => OutcomeKind::Adjusted,
            Outcome::Rejected(_) => OutcomeKind::Rejected,
            Outcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    #[inline]
    pub fn is_not_allowed(&self) -> bool {
        matches!(self, Outcome::NotAllowed(_))
    }

    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    #[inline]
    pub fn is_adjusted(&self) -> bool {
        matches!(self, Outcome::Adjusted(_))
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn as_not_allowed(&self) -> Option<&NotAllowed<D, R>> {
        match self {
            Outcome::NotAllowed(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_accepted(&self) -> Option<&Accepted<D>> {
        match self {
            Outcome::Accepted(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_adjusted(&self) -> Option<&Adjusted<D>> {
        match self {
            Outcome::Adjusted(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_rejected(&self) -> Option<&Rejected<D, R>> {
        match self {
            Outcome::Rejected(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_failed(&self) -> Option<&Failed<D>> {
        match self {
            Outcome::Failed(v) => Some(v),
            _ => None,
        }
    }

    /// Follows the tag, not value equality: an accepted no-op still changed.
    #[inline]
    pub fn has_changed(&self) -> bool {
        self.kind().has_changed()
    }

    pub fn store(&self) -> &StoreRef {
        match self {
            Outcome::NotAllowed(v) => &v.store,
            Outcome::Accepted(v) => &v.store,
            Outcome::Adjusted(v) => &v.store,
            Outcome::Rejected(v) => &v.store,
            Outcome::Failed(v) => &v.store,
        }
    }

    pub fn original_data(&self) -> &D {
        match self {
            Outcome::NotAllowed(v) => &v.original_data,
            Outcome::Accepted(v) => &v.original_data,
            Outcome::Adjusted(v) => &v.original_data,
            Outcome::Rejected(v) => &v.original_data,
            Outcome::Failed(v) => &v.original_data,
        }
    }

    /// The value the store holds after the attempt.
    pub fn value(&self) -> &D {
        match self {
            Outcome::NotAllowed(v) => &v.original_data,
            Outcome::Accepted(v) => &v.new_data,
            Outcome::Adjusted(v) => &v.adjusted_data,
            Outcome::Rejected(v) => &v.rollback,
            Outcome::Failed(v) => &v.original_data,
        }
    }

    pub fn into_value(self) -> D {
        match self {
            Outcome::NotAllowed(v) => v.original_data,
            Outcome::Accepted(v) => v.new_data,
            Outcome::Adjusted(v) => v.adjusted_data,
            Outcome::Rejected(v) => v.rollback,
            Outcome::Failed(v) => v.original_data,
        }
    }
}

impl<D: fmt::Debug, R: fmt::Debug> fmt::Display for Outcome<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NotAllowed(v) => write!(
                f,
                "not_allowed on {}: original={:?} reason={:?}",
                v.store, v.original_data, v.reason
            ),
            Outcome::Accepted(v) => write!(
                f,
                "accepted on {}: {:?} -> {:?}",
                v.store, v.original_data, v.new_data
            ),
            Outcome::Adjusted(v) => write!(
                f,
                "adjusted on {}: {:?} -> {:?} (proposed {:?})",
                v.store, v.original_data, v.adjusted_data, v.proposed_data
            ),
            Outcome::Rejected(v) => write!(
                f,
                "rejected on {}: proposed {:?}, rolled back to {:?} reason={:?}",
                v.store, v.propose, v.rollback, v.reason
            ),
            Outcome::Failed(v) => write!(
                f,
                "failed on {}: original={:?} problem: {}",
                v.store, v.original_data, v.problem
            ),
        }
    }
}
