//! Activity reporting wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Target;

/// One observation of in-flight work for a version, taken on one node.
///
/// Samples are advisory: producers drop them rather than block, and the
/// aggregator expires them after a short TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySample {
    pub project: String,
    pub service: String,
    pub version: String,
    pub node_id: String,
    pub active_requests: i64,
    pub observed_at: DateTime<Utc>,
}

impl ActivitySample {
    pub fn now(target: &Target, node_id: impl Into<String>, active_requests: i64) -> Self {
        Self {
            project: target.project.clone(),
            service: target.service.clone(),
            version: target.version.clone(),
            node_id: node_id.into(),
            active_requests,
            observed_at: Utc::now(),
        }
    }

    pub fn target(&self) -> Target {
        Target::new(&self.project, &self.service, &self.version)
    }
}
