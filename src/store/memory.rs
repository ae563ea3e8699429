//! In-memory progress store for tests and single-process demos
//!
//! Thread-safe via `RwLock`. Not durable; data is lost on restart.

use super::{ProgressEvent, ProgressHub, ProgressStore, StoreError, Subscription};
use crate::types::{PipelineId, PipelineRecord, PipelineStatus, Stage, StageLogEntry};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

pub struct InMemoryProgressStore {
    records: RwLock<HashMap<PipelineId, PipelineRecord>>,
    logs: RwLock<HashMap<PipelineId, BTreeMap<Stage, StageLogEntry>>>,
    hub: Arc<ProgressHub>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::with_hub(ProgressHub::new(super::DEFAULT_CHANNEL_CAPACITY))
    }

    pub fn with_hub(hub: Arc<ProgressHub>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            logs: RwLock::new(HashMap::new()),
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.hub
    }
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn create_record(&self, record: &PipelineRecord) -> Result<Option<PipelineRecord>, StoreError> {
        {
            let mut records = self
                .records
                .write()
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            match records.entry(record.pipeline_id.clone()) {
                Entry::Occupied(existing) if existing.get().status != PipelineStatus::Pending => {
                    return Ok(Some(existing.get().clone()));
                }
                Entry::Occupied(mut existing) => {
                    existing.insert(record.clone());
                }
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                }
            }
        }

        self.hub.publish(
            &record.pipeline_id,
            ProgressEvent::Record {
                record: record.clone(),
            },
        );
        Ok(None)
    }

    fn put_record(&self, record: &PipelineRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?
            .insert(record.pipeline_id.clone(), record.clone());

        self.hub.publish(
            &record.pipeline_id,
            ProgressEvent::Record {
                record: record.clone(),
            },
        );
        Ok(())
    }

    fn get_record(&self, id: &PipelineId) -> Result<Option<PipelineRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(records.get(id).cloned())
    }

    fn list_records(&self, limit: usize) -> Result<Vec<PipelineRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let mut all: Vec<PipelineRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        all.truncate(limit);
        Ok(all)
    }

    fn put_stage_log(&self, id: &PipelineId, entry: &StageLogEntry) -> Result<(), StoreError> {
        self.logs
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?
            .entry(id.clone())
            .or_default()
            .insert(entry.agent, entry.clone());

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
        let logs = self
            .logs
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        // BTreeMap keyed by Stage iterates in stage-list order
        Ok(logs
            .get(id)
            .map(|by_stage| by_stage.values().cloned().collect())
            .unwrap_or_default())
    }

    fn subscribe(&self, id: &PipelineId) -> Subscription {
        self.hub.subscribe(id)
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    #[test]
    fn test_store_and_retrieve_record() {
        let store = InMemoryProgressStore::new();
        let record = fixtures::running("p-1", 0);
        store.put_record(&record).unwrap();

        let got = store.get_record(&record.pipeline_id).unwrap();
        assert_eq!(got, Some(record));
        assert!(store
            .get_record(&PipelineId::new("missing").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_most_recent_first() {
        let store = InMemoryProgressStore::new();
        store.put_record(&fixtures::running("old", 300)).unwrap();
        store.put_record(&fixtures::running("new", 1)).unwrap();
        store.put_record(&fixtures::running("mid", 60)).unwrap();

        let ids: Vec<String> = store
            .list_records(2)
            .unwrap()
            .into_iter()
            .map(|r| r.pipeline_id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn test_stage_log_overwrites_and_orders() {
        let store = InMemoryProgressStore::new();
        let id = PipelineId::new("p-1").unwrap();

        store.put_stage_log(&id, &fixtures::log(Stage::WeatherIntelligence, 1)).unwrap();
        store.put_stage_log(&id, &fixtures::log(Stage::FarmerInteraction, 2)).unwrap();
        store.put_stage_log(&id, &fixtures::log(Stage::WeatherIntelligence, 3)).unwrap();

        let logs = store.stage_logs(&id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].agent, Stage::FarmerInteraction);
        assert_eq!(logs[1].agent, Stage::WeatherIntelligence);
        assert_eq!(logs[1].output.number("marker"), Some(3.0));
    }

    #[tokio::test]
    async fn test_writes_are_published_to_subscribers() {
        let store = InMemoryProgressStore::new();
        let record = fixtures::running("p-9", 0);
        let mut sub = store.subscribe(&record.pipeline_id);

        store.put_record(&record).unwrap();
        store
            .put_stage_log(&record.pipeline_id, &fixtures::log(Stage::FarmerInteraction, 0))
            .unwrap();

        assert!(matches!(sub.recv().await, Some(ProgressEvent::Record { .. })));
        assert!(matches!(
            sub.recv().await,
            Some(ProgressEvent::StageLogged { .. })
        ));
    }

    #[test]
    fn test_trait_object() {
        let store: Box<dyn ProgressStore> = Box::new(InMemoryProgressStore::new());
        assert_eq!(store.backend_name(), "InMemory");
        store.put_record(&fixtures::completed("c")).unwrap();
        assert_eq!(store.list_records(10).unwrap().len(), 1);
    }

    #[test]
    fn test_create_record_claims_id_once() {
        let store = InMemoryProgressStore::new();
        let first = fixtures::running("claimed", 5);
        assert_eq!(store.create_record(&first).unwrap(), None);

        let second = fixtures::running("claimed", 0);
        assert_eq!(store.create_record(&second).unwrap(), Some(first.clone()));
        assert_eq!(store.get_record(&first.pipeline_id).unwrap(), Some(first));
    }

    #[test]
    fn test_create_record_replaces_pending() {
        let store = InMemoryProgressStore::new();
        let pending = PipelineRecord::new(PipelineId::new("queued").unwrap(), fixtures::input());
        store.put_record(&pending).unwrap();

        let running = fixtures::running("queued", 0);
        assert_eq!(store.create_record(&running).unwrap(), None);
        assert_eq!(store.get_record(&running.pipeline_id).unwrap(), Some(running));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryProgressStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .create_record(&fixtures::running("contested", i))
                        .unwrap()
                        .is_none()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
