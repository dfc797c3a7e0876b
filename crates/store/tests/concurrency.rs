//! Many threads hammering one store: attempts must serialize.

use keel_store::{AsyncStore, FnPolicy, Store};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const PER_THREAD: usize = 250;

#[test]
fn every_attempt_sees_its_predecessor() {
    let store = Arc::new(Store::new("contended", 0u64));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| store.update(|x| x + 1))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(store.current(), total);
    assert_eq!(store.commits(), total);

    // Each original value was observed exactly once: the committed values
    // form one chain 0 -> 1 -> ... -> total.
    let originals: BTreeSet<u64> = outcomes.iter().map(|o| *o.original_data()).collect();
    assert_eq!(originals.len(), outcomes.len());
    assert_eq!(originals, (0..total).collect());
    assert!(outcomes.iter().all(|o| *o.value() == o.original_data() + 1));
}

#[test]
fn per_thread_originals_increase() {
    let store = Arc::new(Store::new("ordered", 0u64));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| *store.update(|x| x + 1).original_data())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for h in handles {
        let seen = h.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn rejections_do_not_leak_writes_under_contention() {
    #[derive(Debug, Clone, PartialEq)]
    struct Odd;

    let store = Arc::new(Store::with_policy(
        "evens",
        0u64,
        FnPolicy::new().reject_if(|v: &u64| (v % 2 == 1).then_some(Odd)),
    ));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for j in 0..PER_THREAD {
                    let step = if (i + j) % 2 == 0 { 2 } else { 1 };
                    let outcome = store.update(|x| x + step);
                    if let Some(r) = outcome.as_rejected() {
                        assert_eq!(r.rollback(), r.original_data());
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.current() % 2, 0);
    assert_eq!(store.current(), store.commits() * 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_tasks_serialize() {
    let store = Arc::new(AsyncStore::new("tasks", 0u64));
    let mut set = tokio::task::JoinSet::new();

    for _ in 0..THREADS {
        let store = Arc::clone(&store);
        set.spawn(async move {
            let mut originals = Vec::with_capacity(PER_THREAD);
            for _ in 0..PER_THREAD {
                originals.push(*store.update(|x| x + 1).await.original_data());
            }
            originals
        });
    }

    let mut all = BTreeSet::new();
    while let Some(res) = set.join_next().await {
        for o in res.unwrap() {
            assert!(all.insert(o), "original {o} observed twice");
        }
    }

    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(all, (0..total).collect());
    assert_eq!(store.current().await, total);
}
