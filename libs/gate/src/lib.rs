//! Single-flight call coalescing.
//!
//! When many callers need the same expensive side effect at once (waking a
//! scaled-to-zero workload, warming a cache entry), only one execution
//! should happen. [`SingleFlight::wait`] runs the supplied future at most
//! once per key at any instant and hands every concurrent caller a clone of
//! the one result.
//!
//! # Invariants
//!
//! - Registration and the am-I-first check happen under one lock scope, so
//!   two racing callers can never both execute.
//! - Completion removes the key before broadcasting; callers arriving after
//!   removal start a fresh flight.
//! - The winning future runs on a detached task. A waiter dropping out
//!   (request cancelled, deadline hit) never cancels the shared work.
//!
//! The gate adds no retries and no interpretation of the result. Callers
//! that need shared errors use a cloneable result type such as
//! `Result<(), Arc<E>>`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{oneshot, Mutex};

/// Coalescing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    /// The executing task died before reporting a result.
    #[error("coalesced call was abandoned before completing")]
    Abandoned,
}

struct Flight<T> {
    waiters: Vec<oneshot::Sender<T>>,
}

/// Keyed at-most-once execution with result broadcast.
pub struct SingleFlight<T> {
    flights: Arc<Mutex<HashMap<String, Flight<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether a flight for `key` is currently executing.
    pub async fn in_flight(&self, key: &str) -> bool {
        self.flights.lock().await.contains_key(key)
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    /// Join the flight for `key`, starting it with `activate` if absent.
    ///
    /// Returns a clone of the result produced by whichever caller's future
    /// actually ran. `activate` is dropped unexecuted for callers that join
    /// an existing flight.
    pub async fn wait<F>(&self, key: impl Into<String>, activate: F) -> Result<T, GateError>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let key = key.into();
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut flights = self.flights.lock().await;
            match flights.get_mut(&key) {
                Some(flight) => {
                    flight.waiters.push(tx);
                    false
                }
                None => {
                    flights.insert(key.clone(), Flight { waiters: vec![tx] });
                    true
                }
            }
        };

        if leader {
            let flights = Arc::clone(&self.flights);
            let key = key.clone();
            tokio::spawn(async move {
                // Run the activation on its own task: if it panics, the
                // waiters below are dropped and observe Abandoned instead
                // of hanging on a key that never resolves.
                let result = tokio::spawn(activate).await;

                let waiters = flights
                    .lock()
                    .await
                    .remove(&key)
                    .map(|flight| flight.waiters)
                    .unwrap_or_default();

                match result {
                    Ok(value) => {
                        for waiter in waiters {
                            let _ = waiter.send(value.clone());
                        }
                    }
                    Err(error) => {
                        tracing::error!(key = %key, error = %error, "coalesced call aborted");
                    }
                }
            });
        }

        rx.await.map_err(|_| GateError::Abandoned)
    }
}
