use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::channel::{JobQueue, QueueError};
use super::routing::{route_for, QueueName};
use crate::db::enums::ChannelType;
use crate::notifications::NotificationJob;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No queue is provisioned for {channel_type} notifications")]
    NoQueue { channel_type: ChannelType },
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(#[from] QueueError),
}

impl DispatchError {
    /// Queue failures may clear up; a missing queue will not.
    pub fn is_retriable(&self) -> bool {
        matches!(self, DispatchError::QueueUnavailable(_))
    }
}

/// Routes jobs to the queues provisioned for this deployment.
#[derive(Default, Clone)]
pub struct Dispatcher {
    queues: BTreeMap<QueueName, Arc<dyn JobQueue>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.register(queue);
        self
    }

    pub fn register(&mut self, queue: Arc<dyn JobQueue>) {
        self.queues.insert(queue.name(), queue);
    }

    pub fn is_provisioned(&self, name: QueueName) -> bool {
        self.queues.contains_key(&name)
    }

    /// Picks the queue for a channel type: primary if provisioned, else its fallback.
    pub fn resolve(&self, channel_type: ChannelType) -> Result<&Arc<dyn JobQueue>, DispatchError> {
        let route = route_for(channel_type);
        if let Some(queue) = self.queues.get(&route.primary) {
            return Ok(queue);
        }
        route
            .fallback
            .and_then(|fallback| self.queues.get(&fallback))
            .ok_or(DispatchError::NoQueue { channel_type })
    }

    pub async fn dispatch(&self, job: NotificationJob) -> Result<QueueName, DispatchError> {
        let channel_type = job.channel_type();
        let queue = self.resolve(channel_type)?;
        let name = queue.name();
        if name != route_for(channel_type).primary {
            debug!(%channel_type, queue = %name, "Primary queue not provisioned; using fallback.");
        }

        let alert_history_id = job.alert_history_id();
        if let Err(e) = queue.enqueue(job).await {
            warn!(alert_history_id, queue = %name, error = %e, "Failed to enqueue notification job.");
            return Err(e.into());
        }
        Ok(name)
    }

    pub fn depths(&self) -> BTreeMap<QueueName, usize> {
        self.queues
            .iter()
            .map(|(name, queue)| (*name, queue.depth()))
            .collect()
    }
}
