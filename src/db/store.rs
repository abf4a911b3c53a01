use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::enums::{AlertStatus, MonitorStatus};
use super::models::{
    AlertChannel, AlertHistoryEntry, AlertHistoryId, ChannelId, CheckResult, Monitor, MonitorId,
    MonitorStateUpdate, NewAlertHistory, OrganizationId, OrganizationSecrets,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: i64,
        reason: String,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn corrupt(entity: &'static str, id: impl Into<i64>, reason: impl ToString) -> Self {
        StoreError::Corrupt {
            entity,
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Persistence seen by the worker. Every call except the due-monitor scan is
/// scoped to one organisation; a record owned by another organisation is
/// reported as not found.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Non-paused monitors whose next check time has passed, oldest first.
    async fn due_monitors(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<Monitor>, StoreError>;

    async fn record_check_result(&self, result: &CheckResult) -> Result<(), StoreError>;

    /// Returns the status actually stored, which stays `paused` when a pause
    /// landed while the check was running.
    async fn update_monitor_state(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        update: MonitorStateUpdate,
    ) -> Result<MonitorStatus, StoreError>;

    /// Pausing sets `paused`; resuming puts the monitor back to `pending` and due now.
    async fn set_monitor_paused(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        paused: bool,
    ) -> Result<MonitorStatus, StoreError>;

    /// Channels bound to the monitor through active policies that notify on `status`.
    async fn alert_channels_for(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        status: AlertStatus,
    ) -> Result<Vec<AlertChannel>, StoreError>;

    async fn last_alert_for_channel(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        channel_id: ChannelId,
    ) -> Result<Option<AlertHistoryEntry>, StoreError>;

    async fn create_alert_history(
        &self,
        organization_id: OrganizationId,
        entry: NewAlertHistory,
    ) -> Result<AlertHistoryEntry, StoreError>;

    /// Only acknowledgement metadata is ever written to an existing entry.
    async fn acknowledge_alert(
        &self,
        organization_id: OrganizationId,
        alert_id: AlertHistoryId,
        acknowledged_by: &str,
    ) -> Result<AlertHistoryEntry, StoreError>;

    async fn organization_secrets(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<OrganizationSecrets>, StoreError>;
}
