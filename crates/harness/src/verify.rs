//! Ordering checks over a finished [`Run`].
//!
//! The ticket workload only ever moves the counter up, so committed values
//! are distinct and sorting changed outcomes by `original_data` recovers the
//! commit order. That order must form one unbroken chain from the initial
//! value to the final one.

use crate::contention::Run;
use serde::Serialize;
use std::collections::HashMap;

/// Result of [`verify_chain`]. Empty `violations` means the run was
/// linearizable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainCheck {
    pub changed: usize,
    pub unchanged: usize,
    pub violations: Vec<String>,
}

impl ChainCheck {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

pub fn verify_chain(run: &Run) -> ChainCheck {
    let mut check = ChainCheck::default();
    let mut links: Vec<(i64, i64)> = Vec::new();

    for rec in &run.records {
        let original = *rec.outcome.original_data();
        let value = *rec.outcome.value();
        if rec.outcome.has_changed() {
            links.push((original, value));
            continue;
        }
        check.unchanged += 1;
        if value != original {
            check.violations.push(format!(
                "worker {} attempt {}: {} left value {} but started at {}",
                rec.worker,
                rec.seq,
                rec.outcome.kind(),
                value,
                original
            ));
        }
        if let Some(r) = rec.outcome.as_rejected() {
            if r.rollback() != r.original_data() {
                check.violations.push(format!(
                    "worker {} attempt {}: rollback {} differs from original {}",
                    rec.worker,
                    rec.seq,
                    r.rollback(),
                    r.original_data()
                ));
            }
        }
    }

    check.changed = links.len();
    if check.changed as u64 != run.commits {
        check.violations.push(format!(
            "{} changed outcomes but the store counted {} commits",
            check.changed, run.commits
        ));
    }

    links.sort_unstable();
    let mut expected = run.config.initial;
    for (original, value) in &links {
        if *original != expected {
            check.violations.push(format!(
                "commit from {original} does not follow committed value {expected}"
            ));
        }
        expected = *value;
    }
    if expected != run.final_value {
        check.violations.push(format!(
            "chain ends at {expected} but the store holds {}",
            run.final_value
        ));
    }

    // A worker's later attempts never observe an older value.
    let mut last_seen: HashMap<usize, (usize, i64)> = HashMap::new();
    let mut ordered: Vec<_> = run.records.iter().collect();
    ordered.sort_by_key(|r| (r.worker, r.seq));
    for rec in ordered {
        let original = *rec.outcome.original_data();
        if let Some((seq, seen)) = last_seen.get(&rec.worker) {
            if original < *seen {
                check.violations.push(format!(
                    "worker {} attempt {} saw {} after attempt {} saw {}",
                    rec.worker, rec.seq, original, seq, seen
                ));
            }
        }
        last_seen.insert(rec.worker, (rec.seq, original));
    }

    if !check.is_ok() {
        tracing::warn!(violations = check.violations.len(), "ordering check failed");
    }
    check
}
