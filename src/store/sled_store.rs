//! Sled-backed progress store
//!
//! Two trees in one database:
//! - `pipelines`: pipeline id -> record JSON
//! - `stage_logs`: `<pipeline id> 0x00 <stage index>` -> entry JSON
//!
//! The stage-log key makes re-running a stage overwrite its entry and lets a
//! prefix scan return a pipeline's log in stage-list order.

use super::{ProgressEvent, ProgressHub, ProgressStore, StoreError, Subscription};
use crate::types::{PipelineId, PipelineRecord, PipelineStatus, Stage, StageLogEntry};
use std::path::Path;
use std::sync::Arc;

const PIPELINES_TREE: &str = "pipelines";
const STAGE_LOGS_TREE: &str = "stage_logs";

#[derive(Clone)]
pub struct SledProgressStore {
    db: sled::Db,
    pipelines: sled::Tree,
    stage_logs: sled::Tree,
    hub: Arc<ProgressHub>,
}

impl SledProgressStore {
    /// Open or create the progress database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let store = Self::from_db(db)?;

        tracing::info!("Progress store opened at {:?}", path_ref);

        Ok(store)
    }

    /// Throwaway database, removed when the last handle drops.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            pipelines: db.open_tree(PIPELINES_TREE)?,
            stage_logs: db.open_tree(STAGE_LOGS_TREE)?,
            db,
            hub: ProgressHub::new(super::DEFAULT_CHANNEL_CAPACITY),
        })
    }

    /// Flush pending writes to disk.
    ///
    /// Writes are not flushed individually; sled flushes in the background.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn log_prefix(id: &PipelineId) -> Vec<u8> {
        let mut prefix = id.as_str().as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn log_key(id: &PipelineId, stage: Stage) -> Vec<u8> {
        let mut key = Self::log_prefix(id);
        // Stage index fits a byte; keeps prefix scans in stage order
        key.push(stage.index() as u8);
        key
    }
}

impl ProgressStore for SledProgressStore {
    fn create_record(&self, record: &PipelineRecord) -> Result<Option<PipelineRecord>, StoreError> {
        let key = record.pipeline_id.as_str().as_bytes();
        let value = serde_json::to_vec(record)?;
        let mut current = self.pipelines.get(key)?;

        loop {
            if let Some(bytes) = &current {
                let existing: PipelineRecord = serde_json::from_slice(bytes)?;
                if existing.status != PipelineStatus::Pending {
                    return Ok(Some(existing));
                }
            }
            match self
                .pipelines
                .compare_and_swap(key, current.as_ref(), Some(value.clone()))?
            {
                Ok(()) => break,
                // Lost the race; re-check against whatever won
                Err(conflict) => current = conflict.current,
            }
        }

        tracing::debug!(pipeline_id = %record.pipeline_id, "Claimed pipeline record");

        self.hub.publish(
            &record.pipeline_id,
            ProgressEvent::Record {
                record: record.clone(),
            },
        );
        Ok(None)
    }

    fn put_record(&self, record: &PipelineRecord) -> Result<(), StoreError> {
        let value = serde_json::to_vec(record)?;
        self.pipelines
            .insert(record.pipeline_id.as_str().as_bytes(), value)?;

        tracing::debug!(
            pipeline_id = %record.pipeline_id,
            status = %record.status,
            "Stored pipeline record"
        );

        self.hub.publish(
            &record.pipeline_id,
            ProgressEvent::Record {
                record: record.clone(),
            },
        );
        Ok(())
    }

    fn get_record(&self, id: &PipelineId) -> Result<Option<PipelineRecord>, StoreError> {
        match self.pipelines.get(id.as_str().as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn list_records(&self, limit: usize) -> Result<Vec<PipelineRecord>, StoreError> {
        let mut records = Vec::new();

        for item in self.pipelines.iter() {
            let (_key, value) = item?;
            match serde_json::from_slice::<PipelineRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Failed to deserialize stored pipeline record: {}", e);
                }
            }
        }

        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records.truncate(limit);
        Ok(records)
    }

    fn put_stage_log(&self, id: &PipelineId, entry: &StageLogEntry) -> Result<(), StoreError> {
        let value = serde_json::to_vec(entry)?;
        self.stage_logs.insert(Self::log_key(id, entry.agent), value)?;

        self.hub.publish(
            id,
            ProgressEvent::StageLogged {
                pipeline_id: id.clone(),
                entry: entry.clone(),
            },
        );
        Ok(())
    }

    fn stage_logs(&self, id: &PipelineId) -> Result<Vec<StageLogEntry>, StoreError> {
        self.stage_logs
            .scan_prefix(Self::log_prefix(id))
            .map(|item| -> Result<StageLogEntry, StoreError> {
                let (_key, value) = item?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn subscribe(&self, id: &PipelineId) -> Subscription {
        self.hub.subscribe(id)
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
