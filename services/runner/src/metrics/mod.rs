//! Sample intake, storage and window aggregation.

pub mod ingest;
pub mod store;
pub mod window;

pub use ingest::{spawn_workers, IngestQueue};
pub use store::{MemorySampleStore, SampleRecord, SampleStore, StoreError};
pub use window::{to_adjust_value, ScaleDecision, WindowSet};
