//! Per-pipeline broadcast channels backing store subscriptions.

use super::ProgressEvent;
use crate::types::PipelineId;
use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Buffered events per pipeline before a slow subscriber starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Fan-out of progress events to subscribers, keyed by pipeline id.
///
/// A channel exists only while at least one [`Subscription`] holds it; events
/// for pipelines nobody is watching are dropped at `publish`.
#[derive(Debug)]
pub struct ProgressHub {
    channels: Mutex<HashMap<PipelineId, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        })
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<PipelineId, broadcast::Sender<ProgressEvent>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `event` to current subscribers of `id`.
    pub fn publish(&self, id: &PipelineId, event: ProgressEvent) {
        if let Some(tx) = self.channels().get(id) {
            // Err only means every receiver is already gone
            let _ = tx.send(event);
        }
    }

    pub fn subscribe(self: &Arc<Self>, id: &PipelineId) -> Subscription {
        let rx = self
            .channels()
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        debug!(pipeline_id = %id, "Progress subscription opened");

        Subscription {
            hub: Arc::clone(self),
            pipeline_id: id.clone(),
            rx: Some(rx),
        }
    }

    /// Number of pipelines with at least one live subscription.
    pub fn active_channels(&self) -> usize {
        self.channels().len()
    }

    fn release(&self, id: &PipelineId) {
        let mut channels = self.channels();
        if channels.get(id).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(id);
            debug!(pipeline_id = %id, "Progress channel torn down");
        }
    }
}

/// Scoped subscription to one pipeline's progress events.
///
/// Dropping the handle unsubscribes; the hub discards the channel once the
/// last subscriber for that pipeline is gone.
#[derive(Debug)]
pub struct Subscription {
    hub: Arc<ProgressHub>,
    pipeline_id: PipelineId,
    rx: Option<broadcast::Receiver<ProgressEvent>>,
}

impl Subscription {
    pub const fn pipeline_id(&self) -> &PipelineId {
        &self.pipeline_id
    }

    /// Next event, in write order. Returns `None` once the channel is closed.
    ///
    /// A subscriber that falls more than the channel capacity behind skips the
    /// overwritten events; it should re-read the record to resynchronise.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(pipeline_id = %self.pipeline_id, skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stream events until the pipeline reaches a terminal state (inclusive).
    pub fn until_finished(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut sub = state?;
            let event = sub.recv().await?;
            let next = if event.is_terminal() { None } else { Some(sub) };
            Some((event, next))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Receiver must go first so receiver_count() reflects this handle
        drop(self.rx.take());
        self.hub.release(&self.pipeline_id);
    }
}
