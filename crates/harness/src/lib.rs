//! Contention drivers, ordering verification, report generator, and data sinks.

pub mod contention;
pub mod report;
pub mod sink;
pub mod verify;

pub use contention::{run_async, run_blocking, AttemptRecord, ContentionConfig, Mode, Reason, Run, TicketPolicy};
pub use verify::{verify_chain, ChainCheck};
