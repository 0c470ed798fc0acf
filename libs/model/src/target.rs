//! Workload identity.

use serde::{Deserialize, Serialize};

/// Identity of one deployed version of a service.
///
/// Used as the map key everywhere state is tracked per version: metric
/// windows, activation streams, scale adjustments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub project: String,
    pub service: String,
    pub version: String,
}

impl Target {
    pub fn new(
        project: impl Into<String>,
        service: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            service: service.into(),
            version: version.into(),
        }
    }

    /// Key shared by all versions of the same service.
    pub fn service_key(&self) -> String {
        format!("{}/{}", self.project, self.service)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.service, self.version)
    }
}
