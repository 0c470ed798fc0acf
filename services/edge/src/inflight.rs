//! Per-target in-flight request accounting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use strato_model::Target;

/// Concurrent indirected requests per target.
///
/// Counts feed activity samples, so they only need to be current at the
/// instant a sample is taken; a plain mutex around the map is enough.
#[derive(Default)]
pub struct InflightTable {
    counters: Mutex<HashMap<Target, Arc<AtomicI64>>>,
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the target's counter. Returns the guard that undoes the bump
    /// and the count including this request.
    pub fn begin(&self, target: &Target) -> (InflightGuard, i64) {
        let counter = {
            let mut counters = lock(&self.counters);
            Arc::clone(counters.entry(target.clone()).or_default())
        };
        let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (InflightGuard { counter }, value)
    }

    /// Current count for a target, zero if never seen.
    pub fn current(&self, target: &Target) -> i64 {
        lock(&self.counters)
            .get(target)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

/// Decrements its counter on drop, wherever the response ends up.
pub struct InflightGuard {
    counter: Arc<AtomicI64>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock(
    counters: &Mutex<HashMap<Target, Arc<AtomicI64>>>,
) -> MutexGuard<'_, HashMap<Target, Arc<AtomicI64>>> {
    counters
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
