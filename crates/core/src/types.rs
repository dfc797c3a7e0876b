//! Store identity and fault types shared by every crate.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Store identity
// ---------------------------------------------------------------------------

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique store number. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(u64);

impl StoreId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to the cell an outcome was produced by.
///
/// Equality, ordering and hashing go through the id only: two stores that
/// share a label are still different stores. Cloning is cheap (`Arc<str>`).
#[derive(Debug, Clone, Serialize)]
pub struct StoreRef {
    id: StoreId,
    label: Arc<str>,
}

impl StoreRef {
    /// Mints a handle with a fresh id.
    pub fn allocate(label: impl Into<Arc<str>>) -> Self {
        Self {
            id: StoreId(NEXT_STORE_ID.fetch_add(1, AtomicOrdering::Relaxed)),
            label: label.into(),
        }
    }

    #[inline]
    pub fn id(&self) -> StoreId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for StoreRef {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StoreRef {}

impl Hash for StoreRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for StoreRef {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoreRef {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}

// ---------------------------------------------------------------------------
// Problems
// ---------------------------------------------------------------------------

/// Step of a change attempt at which a fault was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Allow,
    Transform,
    Adjust,
    Commit,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Allow => "allow",
            Stage::Transform => "transform",
            Stage::Adjust => "adjust",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Error` for a returned error, `Panic` for an unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    Error,
    Panic,
}

/// A captured fault, carried by [`Failed`](crate::Failed).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Problem {
    stage: Stage,
    kind: ProblemKind,
    message: String,
}

impl Problem {
    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: ProblemKind::Error,
            message: message.into(),
        }
    }

    /// Builds a problem from a `catch_unwind` payload.
    ///
    /// Payloads from `panic!` are `&'static str` or `String`; anything else
    /// is recorded without text.
    pub fn panic(stage: Stage, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            stage,
            kind: ProblemKind::Panic,
            message,
        }
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[inline]
    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ProblemKind::Error => write!(f, "{} failed: {}", self.stage, self.message),
            ProblemKind::Panic => write!(f, "{} panicked: {}", self.stage, self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Hook faults
// ---------------------------------------------------------------------------

/// Error returned by a policy hook that could not do its job.
///
/// Deliberately not `std::error::Error`, so any error converts into it
/// with `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault(String);

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }

    pub fn into_message(self) -> String {
        self.0
    }
}

impl<E: std::error::Error> From<E> for Fault {
    fn from(err: E) -> Self {
        Self(err.to_string())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answer of an allow or commit hook that said no.
///
/// `Reject` is a policy decision; `Fault` means the hook itself broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError<R> {
    Reject(R),
    Fault(Fault),
}

impl<R> From<Fault> for PolicyError<R> {
    fn from(fault: Fault) -> Self {
        PolicyError::Fault(fault)
    }
}
