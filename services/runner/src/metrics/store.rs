//! Sample storage behind the aggregation pipeline.
//!
//! Samples are keyed `metrics/{project}/{service}/{version}/{node}/{id}` so
//! an ordered prefix scan yields them grouped by workload and node. The
//! in-memory store ships here; durable stores implement the same trait out
//! of tree.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use ulid::Ulid;

use strato_model::{ActivitySample, Target};

/// Prefix every sample key lives under.
pub const KEY_PREFIX: &str = "metrics";

/// Storage failures. A failed scan aborts the whole aggregation pass.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sample store unavailable: {0}")]
    Unavailable(String),
}

/// One parsed store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub target: Target,
    pub node_id: String,
    pub value: i64,
    pub timestamp_secs: i64,
}

/// Backing store for activity samples.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Append a batch, assigning each sample a fresh unique id.
    async fn append_batch(&self, samples: &[ActivitySample]) -> Result<(), StoreError>;

    /// Ordered scan of all unexpired samples.
    async fn replay(&self) -> Result<Vec<SampleRecord>, StoreError>;
}

/// Build the store key for one sample.
pub fn sample_key(sample: &ActivitySample, unique_id: Ulid) -> String {
    format!(
        "{KEY_PREFIX}/{}/{}/{}/{}/{unique_id}",
        sample.project, sample.service, sample.version, sample.node_id
    )
}

/// Recover `(target, node_id)` from a store key.
pub fn parse_sample_key(key: &str) -> Option<(Target, String)> {
    let mut parts = key.split('/');
    if parts.next() != Some(KEY_PREFIX) {
        return None;
    }
    let project = parts.next()?;
    let service = parts.next()?;
    let version = parts.next()?;
    let node_id = parts.next()?;
    let _unique_id = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((Target::new(project, service, version), node_id.to_string()))
}

struct StoredValue {
    value: i64,
    timestamp_secs: i64,
}

/// BTreeMap-backed store with TTL pruning on every append.
pub struct MemorySampleStore {
    ttl_secs: i64,
    entries: RwLock<BTreeMap<String, StoredValue>>,
    fail_replays: AtomicBool,
}

impl MemorySampleStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_secs: ttl.as_secs() as i64,
            entries: RwLock::new(BTreeMap::new()),
            fail_replays: AtomicBool::new(false),
        }
    }

    /// Force subsequent `replay` calls to fail.
    pub fn set_replay_failure(&self, fail: bool) {
        self.fail_replays.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn expired(&self, timestamp_secs: i64, now_secs: i64) -> bool {
        timestamp_secs + self.ttl_secs < now_secs
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn append_batch(&self, samples: &[ActivitySample]) -> Result<(), StoreError> {
        let now_secs = Utc::now().timestamp();
        let mut entries = self.entries.write().await;

        for sample in samples {
            entries.insert(
                sample_key(sample, Ulid::new()),
                StoredValue {
                    value: sample.active_requests,
                    timestamp_secs: sample.observed_at.timestamp(),
                },
            );
        }

        entries.retain(|_, stored| !self.expired(stored.timestamp_secs, now_secs));
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<SampleRecord>, StoreError> {
        if self.fail_replays.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("replay disabled".into()));
        }

        let now_secs = Utc::now().timestamp();
        let entries = self.entries.read().await;

        let mut records = Vec::with_capacity(entries.len());
        for (key, stored) in entries.iter() {
            if self.expired(stored.timestamp_secs, now_secs) {
                continue;
            }
            let Some((target, node_id)) = parse_sample_key(key) else {
                tracing::warn!(key = %key, "Skipping malformed sample key");
                continue;
            };
            records.push(SampleRecord {
                target,
                node_id,
                value: stored.value,
                timestamp_secs: stored.timestamp_secs,
            });
        }
        Ok(records)
    }
}
