//! Outcome algebra, store identity, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod error;
pub mod outcome;
pub mod types;

pub use error::{KeelError, KeelResult};
pub use outcome::{Accepted, Adjusted, Failed, NotAllowed, Outcome, OutcomeKind, Rejected};
pub use types::{Fault, PolicyError, Problem, ProblemKind, Stage, StoreId, StoreRef};
