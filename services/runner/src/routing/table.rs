//! Reconciled route sets, revisioned for cheap change detection.
//!
//! A set's revision is a hash over its canonical JSON, so two passes that
//! materialize the same routes produce the same revision and the second
//! one never reaches the driver.

use std::collections::HashMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use strato_model::ReconciledRoute;

/// A materialized route set plus its revision.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSet {
    pub routes: Vec<ReconciledRoute>,
    pub revision: String,
}

/// Current reconciled set per service.
#[derive(Default)]
pub struct RouteTable {
    sets: RwLock<HashMap<String, ReconciledSet>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self, project: &str, service: &str) -> Option<ReconciledSet> {
        let sets = self.sets.read().await;
        sets.get(&key(project, service)).cloned()
    }

    /// Record a set the driver has acknowledged.
    pub async fn insert(&self, project: &str, service: &str, set: ReconciledSet) {
        let mut sets = self.sets.write().await;
        sets.insert(key(project, service), set);
    }

    pub async fn remove(&self, project: &str, service: &str) -> bool {
        let mut sets = self.sets.write().await;
        sets.remove(&key(project, service)).is_some()
    }
}

fn key(project: &str, service: &str) -> String {
    format!("{project}/{service}")
}

/// Hash a route set into a `sha256:` revision over canonical JSON.
pub fn revision_for(routes: &[ReconciledRoute]) -> String {
    let value = serde_json::to_value(routes).unwrap_or(Value::Null);
    let mut hasher = Sha256::new();
    hasher.update(canonical(&value).as_bytes());
    let digest = hasher.finalize();
    format!("sha256:{}", hex::encode(&digest[..16]))
}

/// Canonical JSON: sorted keys, no whitespace.
fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape(k), canonical(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", inner.join(","))
        }
        Value::String(s) => format!("\"{}\"", escape(s)),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
