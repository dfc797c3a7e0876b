//! Concurrent drivers for a bounded ticket counter.
//!
//! Each worker issues `attempts_per_worker` change attempts against one
//! shared store. The workload is tuned so every outcome variant shows up:
//!
//! - allow refuses once the counter reaches `limit` (`NotAllowed`)
//! - every `fault_every`-th attempt of a worker errors out (`Failed`)
//! - every `burst_every`-th attempt proposes `+3`, clamped to `max_step` (`Adjusted`)
//! - values divisible by `reserved_every` are refused at commit (`Rejected`)
//! - everything else commits `+1` (`Accepted`)

use keel_core::error::{KeelError, KeelResult};
use keel_core::{Fault, Outcome, PolicyError};
use keel_store::{AsyncStore, ChangePolicy, Store};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BURST: i64 = 3;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Why the ticket counter refused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Reason {
    Exhausted { limit: i64 },
    Reserved { value: i64 },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Exhausted { limit } => write!(f, "limit {limit} reached"),
            Reason::Reserved { value } => write!(f, "value {value} is reserved"),
        }
    }
}

/// Bounded, step-limited counter with reserved values.
#[derive(Debug, Clone, Copy)]
pub struct TicketPolicy {
    limit: i64,
    max_step: i64,
    reserved_every: i64,
}

impl TicketPolicy {
    pub fn new(limit: i64, max_step: i64, reserved_every: i64) -> Self {
        Self {
            limit,
            max_step,
            reserved_every,
        }
    }
}

impl ChangePolicy<i64> for TicketPolicy {
    type Reason = Reason;

    fn allow(&self, current: &i64) -> Result<(), PolicyError<Reason>> {
        if *current >= self.limit {
            return Err(PolicyError::Reject(Reason::Exhausted { limit: self.limit }));
        }
        Ok(())
    }

    fn adjust(&self, original: &i64, proposed: &i64) -> Result<i64, Fault> {
        let step = proposed
            .checked_sub(*original)
            .ok_or_else(|| Fault::new("step overflow"))?;
        if step > self.max_step {
            return Ok(original + self.max_step);
        }
        Ok(*proposed)
    }

    fn commit(&self, _original: &i64, adjusted: &i64) -> Result<(), PolicyError<Reason>> {
        if self.reserved_every > 0 && adjusted % self.reserved_every == 0 {
            return Err(PolicyError::Reject(Reason::Reserved { value: *adjusted }));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Harness knobs. Zero for `fault_every`, `burst_every` or
/// `reserved_every` disables that behavior; zero `max_in_flight` means one
/// slot per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionConfig {
    pub workers: usize,
    pub attempts_per_worker: usize,
    pub initial: i64,
    pub limit: i64,
    pub max_step: i64,
    pub fault_every: usize,
    pub burst_every: usize,
    pub reserved_every: i64,
    /// Async driver only: workers allowed to run at once.
    pub max_in_flight: usize,
}

impl Default for ContentionConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            attempts_per_worker: 500,
            initial: 0,
            limit: 2_500,
            max_step: 2,
            fault_every: 11,
            burst_every: 7,
            reserved_every: 13,
            max_in_flight: 0,
        }
    }
}

impl ContentionConfig {
    pub fn validate(&self) -> KeelResult<()> {
        if self.workers == 0 {
            return Err(KeelError::InvalidInput("workers must be at least 1".into()));
        }
        if self.attempts_per_worker == 0 {
            return Err(KeelError::InvalidInput(
                "attempts per worker must be at least 1".into(),
            ));
        }
        if self.max_step < 1 {
            return Err(KeelError::InvalidInput("max step must be at least 1".into()));
        }
        if self.limit <= self.initial {
            return Err(KeelError::InvalidInput(format!(
                "limit {} must exceed initial value {}",
                self.limit, self.initial
            )));
        }
        if self.reserved_every < 0 {
            return Err(KeelError::InvalidInput(
                "reserved_every must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> TicketPolicy {
        TicketPolicy::new(self.limit, self.max_step, self.reserved_every)
    }

    pub fn total_attempts(&self) -> usize {
        self.workers * self.attempts_per_worker
    }

    fn in_flight(&self) -> usize {
        if self.max_in_flight == 0 {
            self.workers
        } else {
            self.max_in_flight
        }
    }

    /// Step a worker proposes on its `seq`-th attempt, or a fault.
    fn plan(&self, seq: usize) -> Result<i64, SimulatedFault> {
        let nth = seq + 1;
        if self.fault_every > 0 && nth % self.fault_every == 0 {
            return Err(SimulatedFault { seq });
        }
        if self.burst_every > 0 && nth % self.burst_every == 0 {
            return Ok(BURST);
        }
        Ok(1)
    }
}

/// Fault injected by the workload.
#[derive(Debug, thiserror::Error)]
#[error("simulated fault at attempt {seq}")]
pub struct SimulatedFault {
    seq: usize,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Which driver produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Blocking,
    Async,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Mode::Blocking => "blocking",
            Mode::Async => "async",
        })
    }
}

/// One attempt as issued by a worker.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub worker: usize,
    pub seq: usize,
    pub outcome: Outcome<i64, Reason>,
}

/// Everything a driver observed.
#[derive(Debug, Clone)]
pub struct Run {
    pub mode: Mode,
    pub config: ContentionConfig,
    pub store_label: String,
    pub records: Vec<AttemptRecord>,
    pub final_value: i64,
    pub commits: u64,
    pub elapsed: Duration,
}

/// Drives a blocking [`Store`] from rayon's pool, one task per worker.
pub fn run_blocking(config: ContentionConfig) -> KeelResult<Run> {
    use rayon::prelude::*;

    config.validate()?;
    let store = Store::with_policy("tickets", config.initial, config.policy());

    tracing::info!(
        store = %store.handle(),
        workers = config.workers,
        attempts = config.total_attempts(),
        "blocking contention run"
    );

    let t0 = Instant::now();
    let records: Vec<AttemptRecord> = (0..config.workers)
        .into_par_iter()
        .flat_map_iter(|worker| {
            let store = &store;
            (0..config.attempts_per_worker).map(move |seq| AttemptRecord {
                worker,
                seq,
                outcome: store.change(|x| config.plan(seq).map(|step| x + step)),
            })
        })
        .collect();
    let elapsed = t0.elapsed();

    let run = Run {
        mode: Mode::Blocking,
        config,
        store_label: store.handle().to_string(),
        records,
        final_value: store.current(),
        commits: store.commits(),
        elapsed,
    };
    tracing::info!(
        final_value = run.final_value,
        commits = run.commits,
        elapsed_ms = elapsed.as_millis(),
        "blocking run complete"
    );
    Ok(run)
}

/// Drives an [`AsyncStore`] from a `JoinSet`, throttled by a semaphore.
pub async fn run_async(config: ContentionConfig) -> KeelResult<Run> {
    config.validate()?;
    let store = Arc::new(AsyncStore::with_policy(
        "tickets",
        config.initial,
        config.policy(),
    ));
    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.in_flight()));

    tracing::info!(
        store = %store.handle(),
        workers = config.workers,
        attempts = config.total_attempts(),
        in_flight = config.in_flight(),
        "async contention run"
    );

    let t0 = Instant::now();
    let mut tasks = tokio::task::JoinSet::new();
    for worker in 0..config.workers {
        let store = Arc::clone(&store);
        let sem = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| KeelError::Internal(format!("semaphore closed: {e}")))?;
            let mut records = Vec::with_capacity(config.attempts_per_worker);
            for seq in 0..config.attempts_per_worker {
                let outcome = store
                    .change(|x| config.plan(seq).map(|step| x + step))
                    .await;
                records.push(AttemptRecord {
                    worker,
                    seq,
                    outcome,
                });
                tokio::task::yield_now().await;
            }
            Ok::<_, KeelError>(records)
        });
    }

    let mut records = Vec::with_capacity(config.total_attempts());
    while let Some(joined) = tasks.join_next().await {
        let batch =
            joined.map_err(|e| KeelError::Internal(format!("worker task panicked: {e}")))??;
        records.extend(batch);
    }
    let elapsed = t0.elapsed();

    let run = Run {
        mode: Mode::Async,
        config,
        store_label: store.handle().to_string(),
        records,
        final_value: store.current().await,
        commits: store.commits().await,
        elapsed,
    };
    tracing::info!(
        final_value = run.final_value,
        commits = run.commits,
        elapsed_ms = elapsed.as_millis(),
        "async run complete"
    );
    Ok(run)
}
