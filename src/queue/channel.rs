use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::routing::QueueName;
use crate::notifications::NotificationJob;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue '{queue}' is full")]
    Full { queue: QueueName },
    #[error("Queue '{queue}' is closed")]
    Closed { queue: QueueName },
}

/// A named queue jobs can be published to.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> QueueName;

    async fn enqueue(&self, job: NotificationJob) -> Result<(), QueueError>;

    /// Jobs waiting to be consumed.
    fn depth(&self) -> usize;
}

/// Bounded in-process queue. Publishers wait up to `enqueue_timeout` for room.
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    name: QueueName,
    sender: mpsc::Sender<NotificationJob>,
    enqueue_timeout: Duration,
}

impl ChannelQueue {
    pub fn new(
        name: QueueName,
        capacity: usize,
        enqueue_timeout: Duration,
    ) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            name,
            sender,
            enqueue_timeout,
        };
        (queue, receiver)
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    fn name(&self) -> QueueName {
        self.name
    }

    async fn enqueue(&self, job: NotificationJob) -> Result<(), QueueError> {
        self.sender
            .send_timeout(job, self.enqueue_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => QueueError::Full { queue: self.name },
                SendTimeoutError::Closed(_) => QueueError::Closed { queue: self.name },
            })
    }

    fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}
