//! Data sink for contention runs.
//!
//! Two row schemas:
//! - [`RunSummaryRow`]: one per run
//! - [`OutcomeRow`]: one per change attempt (denormalized)
//!
//! One backend: NDJSON to any `Write` impl ([`json_stream`]).

pub mod json_stream;

use crate::contention::Run;
use crate::report::Report;
use keel_core::{Outcome, OutcomeKind};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

/// One row per change attempt.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRow {
    pub row: &'static str,
    pub store: String,
    pub worker: usize,
    pub seq: usize,
    pub outcome: OutcomeKind,
    pub original_data: i64,
    pub value: i64,
    /// Proposal for `Adjusted`/`Rejected`, absent otherwise.
    pub proposed: Option<i64>,
    /// Rejection reason or captured problem, rendered as text.
    pub detail: Option<String>,
    pub created_at_ms: u64,
}

/// One row per run: summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummaryRow {
    pub row: &'static str,
    pub store: String,
    pub driver: String,
    pub workers: u32,
    pub total_attempts: u32,
    pub not_allowed: u32,
    pub accepted: u32,
    pub adjusted: u32,
    pub rejected: u32,
    pub failed: u32,
    pub initial: i64,
    pub final_value: i64,
    pub commits: u64,
    pub ordering_ok: bool,
    pub violations: u32,
    pub elapsed_ms: u64,
    pub created_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Builder: Report + Run → Rows
// ---------------------------------------------------------------------------

impl Report {
    /// Flatten the report and its run into sink-ready rows.
    pub fn to_rows(&self, run: &Run) -> (RunSummaryRow, Vec<OutcomeRow>) {
        let now = now_ms();

        let summary = RunSummaryRow {
            row: "summary",
            store: self.store.clone(),
            driver: self.mode.to_string(),
            workers: self.workers as u32,
            total_attempts: self.total_attempts as u32,
            not_allowed: self.count(OutcomeKind::NotAllowed) as u32,
            accepted: self.count(OutcomeKind::Accepted) as u32,
            adjusted: self.count(OutcomeKind::Adjusted) as u32,
            rejected: self.count(OutcomeKind::Rejected) as u32,
            failed: self.count(OutcomeKind::Failed) as u32,
            initial: self.initial,
            final_value: self.final_value,
            commits: self.commits,
            ordering_ok: self.chain.is_ok(),
            violations: self.chain.violations.len() as u32,
            elapsed_ms: self.elapsed.as_millis() as u64,
            created_at_ms: now,
        };

        let rows = run
            .records
            .iter()
            .map(|rec| {
                let (proposed, detail) = match &rec.outcome {
                    Outcome::NotAllowed(n) => (None, Some(n.reason().to_string())),
                    Outcome::Accepted(_) => (None, None),
                    Outcome::Adjusted(a) => (Some(*a.proposed_data()), None),
                    Outcome::Rejected(r) => (Some(*r.propose()), Some(r.reason().to_string())),
                    Outcome::Failed(f) => (None, Some(f.problem().to_string())),
                };
                OutcomeRow {
                    row: "outcome",
                    store: run.store_label.clone(),
                    worker: rec.worker,
                    seq: rec.seq,
                    outcome: rec.outcome.kind(),
                    original_data: *rec.outcome.original_data(),
                    value: *rec.outcome.value(),
                    proposed,
                    detail,
                    created_at_ms: now,
                }
            })
            .collect();

        (summary, rows)
    }
}

/// Milliseconds since the Unix epoch; zero if the clock is before it.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
