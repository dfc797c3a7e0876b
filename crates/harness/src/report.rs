//! Contention report generator.
//!
//! Takes a finished [`Run`] and produces outcome counts, fault and
//! rejection breakdowns, the ordering check, and a boxed text rendering.

use crate::contention::{Mode, Reason, Run};
use crate::verify::{verify_chain, ChainCheck};
use keel_core::{Outcome, OutcomeKind, Stage};
use std::collections::BTreeMap;
use std::time::Duration;

/// Summary of a contention run.
#[derive(Debug)]
pub struct Report {
    pub mode: Mode,
    pub store: String,
    pub workers: usize,
    pub total_attempts: usize,
    pub counts: BTreeMap<OutcomeKind, usize>,
    pub failures_by_stage: BTreeMap<Stage, usize>,
    pub reserved_hits: usize,
    pub exhausted_hits: usize,
    pub initial: i64,
    pub final_value: i64,
    pub commits: u64,
    pub chain: ChainCheck,
    pub elapsed: Duration,
}

impl Report {
    pub fn build(run: &Run) -> Self {
        let mut counts: BTreeMap<OutcomeKind, usize> =
            OutcomeKind::ALL.iter().map(|k| (*k, 0)).collect();
        let mut failures_by_stage: BTreeMap<Stage, usize> = BTreeMap::new();
        let mut reserved_hits = 0;
        let mut exhausted_hits = 0;

        for rec in &run.records {
            *counts.entry(rec.outcome.kind()).or_default() += 1;
            match &rec.outcome {
                Outcome::Failed(f) => {
                    *failures_by_stage.entry(f.problem().stage()).or_default() += 1;
                }
                Outcome::Rejected(r) => {
                    if matches!(r.reason(), Reason::Reserved { .. }) {
                        reserved_hits += 1;
                    }
                }
                Outcome::NotAllowed(n) => {
                    if matches!(n.reason(), Reason::Exhausted { .. }) {
                        exhausted_hits += 1;
                    }
                }
                Outcome::Accepted(_) | Outcome::Adjusted(_) => {}
            }
        }

        Report {
            mode: run.mode,
            store: run.store_label.clone(),
            workers: run.config.workers,
            total_attempts: run.records.len(),
            counts,
            failures_by_stage,
            reserved_hits,
            exhausted_hits,
            initial: run.config.initial,
            final_value: run.final_value,
            commits: run.commits,
            chain: verify_chain(run),
            elapsed: run.elapsed,
        }
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Attempts per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_attempts as f64 / secs
    }

    /// Render the report as a formatted string.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                   KEEL CONTENTION REPORT                     ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        out.push_str(&format!("║  Store:              {:>39} ║\n", self.store));
        out.push_str(&format!("║  Driver:             {:>39} ║\n", self.mode));
        out.push_str(&format!("║  Workers:            {:>39} ║\n", self.workers));
        out.push_str(&format!("║  Attempts:           {:>39} ║\n", self.total_attempts));
        out.push_str(&format!(
            "║  Value:              {:>39} ║\n",
            format!("{} -> {}", self.initial, self.final_value)
        ));
        out.push_str(&format!("║  Commits:            {:>39} ║\n", self.commits));
        out.push_str(&format!("║  Elapsed:            {:>39} ║\n", format!("{:?}", self.elapsed)));
        out.push_str(&format!(
            "║  Throughput:         {:>39} ║\n",
            format!("{:.0} attempts/s", self.throughput())
        ));
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        out.push_str("║  OUTCOMES                                                    ║\n");

        for (kind, n) in &self.counts {
            let share = if self.total_attempts == 0 {
                0.0
            } else {
                *n as f64 * 100.0 / self.total_attempts as f64
            };
            out.push_str(&format!(
                "║    {:<16} {:>10}  {:>6.2}%                         ║\n",
                kind.as_str(),
                n,
                share
            ));
        }

        if !self.failures_by_stage.is_empty() {
            out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
            out.push_str("║  FAILURES BY STAGE                                           ║\n");
            for (stage, n) in &self.failures_by_stage {
                out.push_str(&format!("║    {:<16} {:>10}                                  ║\n", stage.as_str(), n));
            }
        }

        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        if self.chain.is_ok() {
            out.push_str("║  Ordering: OK (one unbroken commit chain)                    ║\n");
        } else {
            out.push_str(&format!(
                "║  Ordering: {} VIOLATION(S)\n",
                self.chain.violations.len()
            ));
            for v in self.chain.violations.iter().take(10) {
                out.push_str(&format!("║    - {v}\n"));
            }
        }
        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}
