//! Progress Store
//!
//! Durable, observable state for advisory pipelines. The runner writes a
//! [`PipelineRecord`] and one [`StageLogEntry`] per stage; clients read them
//! back or subscribe to a per-pipeline stream of [`ProgressEvent`]s.
//!
//! Backends are swappable without touching pipeline code:
//! - `InMemoryProgressStore`: tests and single-process demos
//! - `SledProgressStore`: embedded on-disk store
//!
//! ## Ordering
//!
//! Each backend publishes an event only after the write it describes has
//! landed, and each pipeline id has exactly one writer (the run that claimed
//! it through `create_record`), so subscribers see updates for a pipeline in
//! write order. Nothing is promised across ids.

mod hub;
mod memory;
mod sled_store;
mod view;

pub use hub::{ProgressHub, Subscription, DEFAULT_CHANNEL_CAPACITY};
pub use memory::InMemoryProgressStore;
pub use sled_store::SledProgressStore;
pub use view::{ProgressView, RenderState};

use crate::types::{PipelineId, PipelineRecord, StageLogEntry};
use serde::{Deserialize, Serialize};

/// Trait for pluggable progress store backends
///
/// Implementations must be thread-safe (Send + Sync): concurrent runs write
/// to distinct records through one shared store.
pub trait ProgressStore: Send + Sync {
    /// Claim `record.pipeline_id` for a new run and write `record`.
    ///
    /// Atomic per id: succeeds only when no record exists or the existing one
    /// is still `Pending`. Otherwise nothing is written and the existing
    /// record is returned.
    fn create_record(&self, record: &PipelineRecord) -> Result<Option<PipelineRecord>, StoreError>;

    /// Create or overwrite the record for `record.pipeline_id`.
    fn put_record(&self, record: &PipelineRecord) -> Result<(), StoreError>;

    fn get_record(&self, id: &PipelineId) -> Result<Option<PipelineRecord>, StoreError>;

    /// Recent records, most recently started first.
    fn list_records(&self, limit: usize) -> Result<Vec<PipelineRecord>, StoreError>;

    /// Write the log entry for `entry.agent`, replacing any earlier entry for
    /// the same stage of this pipeline.
    fn put_stage_log(&self, id: &PipelineId, entry: &StageLogEntry) -> Result<(), StoreError>;

    /// Stage log for a pipeline, in stage-list order.
    fn stage_logs(&self, id: &PipelineId) -> Result<Vec<StageLogEntry>, StoreError>;

    /// Subscribe to updates for one pipeline. Dropping the handle unsubscribes.
    fn subscribe(&self, id: &PipelineId) -> Subscription;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Progress store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Update delivered to subscribers of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// The pipeline record was written.
    Record { record: PipelineRecord },
    /// A stage log entry was written.
    StageLogged {
        #[serde(rename = "pipelineId")]
        pipeline_id: PipelineId,
        entry: StageLogEntry,
    },
}

impl ProgressEvent {
    /// `true` for a record write that put the pipeline in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Record { record } if record.status.is_terminal())
    }

    /// SSE event name.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Record { .. } => "record",
            Self::StageLogged { .. } => "stageLogged",
        }
    }
}
