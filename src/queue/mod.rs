//! Routing of notification jobs onto per-channel delivery queues.

pub mod channel;
pub mod dispatcher;
pub mod routing;

pub use channel::{ChannelQueue, JobQueue, QueueError};
pub use dispatcher::{DispatchError, Dispatcher};
pub use routing::{route_for, QueueName, Route};

#[cfg(test)]
pub(crate) fn test_job(
    channel_type: crate::db::enums::ChannelType,
    alert_history_id: crate::db::models::AlertHistoryId,
) -> crate::notifications::NotificationJob {
    use crate::notifications::jobs::{ChatJob, JobMeta};

    crate::notifications::NotificationJob::Chat(ChatJob {
        meta: JobMeta {
            job_id: uuid::Uuid::new_v4(),
            alert_history_id,
            channel_id: 1,
            channel_type,
            organization_id: 10,
            monitor_id: 1,
        },
        webhook_url: "https://hooks.example.com".to_string(),
        payload: serde_json::json!({}),
    })
}
