//! Async store: the same change protocol behind a `tokio` mutex.
//!
//! Waiting for the lock is the only await point of an attempt. Once the
//! lock is held, the transform and hooks run synchronously to a terminal
//! outcome, so an attempt cannot be cancelled halfway.

use crate::coordinator::run_attempt;
use crate::policy::{ChangePolicy, NoPolicy};
use crate::store::{log_attempt, Slot};
use keel_core::{Outcome, StoreRef};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use tokio::sync::Mutex;

/// A change-governed value for async callers.
///
/// ```ignore
/// let store = Arc::new(AsyncStore::new("counter", 0i64));
/// let outcome = store.update(|x| x + 1).await;
/// ```
pub struct AsyncStore<D, P = NoPolicy> {
    handle: StoreRef,
    slot: Mutex<Slot<D>>,
    policy: P,
}

impl<D: Clone + PartialEq> AsyncStore<D, NoPolicy> {
    pub fn new(label: &str, initial: D) -> Self {
        Self::with_policy(label, initial, NoPolicy)
    }
}

impl<D, P> AsyncStore<D, P>
where
    D: Clone + PartialEq,
    P: ChangePolicy<D>,
{
    pub fn with_policy(label: &str, initial: D, policy: P) -> Self {
        let handle = StoreRef::allocate(label);
        tracing::debug!(store = %handle, "async store created");
        Self {
            handle,
            slot: Mutex::new(Slot::new(initial)),
            policy,
        }
    }

    pub fn handle(&self) -> &StoreRef {
        &self.handle
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub async fn current(&self) -> D {
        self.slot.lock().await.value.clone()
    }

    pub async fn commits(&self) -> u64 {
        self.slot.lock().await.commits
    }

    /// Runs one policy-governed change attempt.
    pub async fn change<F, E>(&self, transform: F) -> Outcome<D, P::Reason>
    where
        F: FnOnce(&D) -> Result<D, E>,
        E: fmt::Display,
    {
        let mut slot = self.slot.lock().await;
        self.attempt_locked(&mut slot, transform)
    }

    pub async fn update(&self, f: impl FnOnce(&D) -> D) -> Outcome<D, P::Reason> {
        self.change(|current| Ok::<D, Infallible>(f(current))).await
    }

    /// Like [`change`](Self::change), but gives up if `cancel` completes
    /// before the lock is acquired. Returns `None` when no attempt started.
    pub async fn change_unless<C, F, E>(&self, cancel: C, transform: F) -> Option<Outcome<D, P::Reason>>
    where
        C: Future<Output = ()>,
        F: FnOnce(&D) -> Result<D, E>,
        E: fmt::Display,
    {
        let mut slot = tokio::select! {
            biased;
            () = cancel => {
                tracing::debug!(store = %self.handle, "change cancelled before lock");
                return None;
            }
            slot = self.slot.lock() => slot,
        };
        Some(self.attempt_locked(&mut slot, transform))
    }

    fn attempt_locked<F, E>(&self, slot: &mut Slot<D>, transform: F) -> Outcome<D, P::Reason>
    where
        F: FnOnce(&D) -> Result<D, E>,
        E: fmt::Display,
    {
        let attempt = run_attempt(&self.handle, &mut slot.value, &self.policy, transform);
        if attempt.committed {
            slot.commits += 1;
        }
        log_attempt(&self.handle, &attempt);
        attempt.outcome
    }
}

impl<D, P> fmt::Debug for AsyncStore<D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStore")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
