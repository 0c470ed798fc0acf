//! Activity state shared with the external scaler.
//!
//! Activation requests mark a workload active for a short hysteresis
//! window, which keeps the scaler from flapping a workload back to zero
//! while its first replica is still coming up. Scaler push streams
//! register here; a stream stays registered until its handle drops or the
//! workload is torn down, whichever comes first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use strato_model::Target;

/// How long a workload stays active after an activation request.
pub const ACTIVATION_HYSTERESIS: Duration = Duration::from_secs(10);
/// Buffered activation events per push stream.
const STREAM_CAPACITY: usize = 5;

#[derive(Default)]
struct TargetState {
    last_notified_at: Option<Instant>,
    stream: Option<StreamSlot>,
}

struct StreamSlot {
    id: u64,
    tx: mpsc::Sender<bool>,
}

/// Shared activity registry.
pub struct ScalerBridge {
    states: Arc<Mutex<HashMap<Target, TargetState>>>,
    next_stream_id: AtomicU64,
}

impl ScalerBridge {
    pub fn new() -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            next_stream_id: AtomicU64::new(1),
        }
    }

    /// Record an activation request. Returns true when it anchored a fresh
    /// activity window; requests inside a live window are absorbed.
    pub fn notify(&self, target: &Target) -> bool {
        let mut states = lock(&self.states);
        let state = states.entry(target.clone()).or_default();

        let now = Instant::now();
        let absorbed = state
            .last_notified_at
            .is_some_and(|last| now.duration_since(last) < ACTIVATION_HYSTERESIS);
        if absorbed {
            return false;
        }

        state.last_notified_at = Some(now);
        if let Some(slot) = &state.stream {
            if slot.tx.try_send(true).is_err() {
                tracing::warn!(target = %target, "Activation stream not keeping up");
            }
        }
        true
    }

    /// Whether the scaler should consider the workload active. Workloads
    /// with a floor above zero always are.
    pub fn is_active(&self, target: &Target, min_replicas: i32) -> bool {
        if min_replicas != 0 {
            return true;
        }
        let states = lock(&self.states);
        states
            .get(target)
            .and_then(|state| state.last_notified_at)
            .map(|last| last.elapsed() < ACTIVATION_HYSTERESIS)
            .unwrap_or(false)
    }

    /// Register a push stream for a workload, displacing any previous one.
    pub fn subscribe(&self, target: &Target) -> ActivationStream {
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);

        let mut states = lock(&self.states);
        let state = states.entry(target.clone()).or_default();
        state.stream = Some(StreamSlot { id, tx });

        ActivationStream {
            id,
            target: target.clone(),
            states: Arc::clone(&self.states),
            rx,
        }
    }

    /// Tear down a workload's bridge state. A registered stream receives a
    /// final `false` so its consumer can stop scaling the workload.
    pub fn remove_target(&self, target: &Target) {
        let removed = lock(&self.states).remove(target);
        if let Some(state) = removed {
            if let Some(slot) = state.stream {
                let _ = slot.tx.try_send(false);
            }
        }
    }
}

impl Default for ScalerBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a push stream. Dropping it unregisters the stream
/// unless a newer subscription already displaced it.
pub struct ActivationStream {
    id: u64,
    target: Target,
    states: Arc<Mutex<HashMap<Target, TargetState>>>,
    rx: mpsc::Receiver<bool>,
}

impl ActivationStream {
    /// Next activation event. `Some(false)` means the workload was torn
    /// down; `None` means the bridge itself went away.
    pub async fn recv(&mut self) -> Option<bool> {
        self.rx.recv().await
    }
}

impl Drop for ActivationStream {
    fn drop(&mut self) {
        let mut states = lock(&self.states);
        if let Some(state) = states.get_mut(&self.target) {
            if state.stream.as_ref().is_some_and(|slot| slot.id == self.id) {
                state.stream = None;
            }
        }
    }
}

fn lock<'a>(
    states: &'a Mutex<HashMap<Target, TargetState>>,
) -> MutexGuard<'a, HashMap<Target, TargetState>> {
    states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
