//! PostgreSQL-backed `MonitorStore` over the SeaORM entities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectOptions, Database, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{info, warn};

use super::entities::{
    alert_channel, alert_history, alert_policy, alert_policy_channel, alert_policy_monitor,
    check_result, monitor, organization_secret, prelude::*,
};
use super::enums::{AlertStatus, ChannelType, CheckOutcome, MonitorStatus, MonitorType};
use super::models::{
    self, AlertHistoryEntry, AlertHistoryId, ChannelId, CheckConfig, MonitorId,
    MonitorStateUpdate, NewAlertHistory, OrganizationId, OrganizationSecrets, OutcomeStreak,
    StoredSmtpSettings,
};
use super::store::{MonitorStore, StoreError};

pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new(database_url.to_owned());
        options
            .max_connections(max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        let db = Database::connect(options).await?;
        info!(max_connections, "Connected to PostgreSQL.");
        Ok(Self { db })
    }

    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn monitor_from_model(model: monitor::Model) -> Result<models::Monitor, StoreError> {
    let id = model.id;
    let corrupt = |reason: String| StoreError::corrupt("monitor", id, reason);

    let config: CheckConfig = match model.config {
        Some(json) => serde_json::from_value(json).map_err(|e| corrupt(e.to_string()))?,
        None => CheckConfig::default(),
    };
    let streak = OutcomeStreak {
        outcome: model
            .streak_outcome
            .as_deref()
            .map(str::parse::<CheckOutcome>)
            .transpose()
            .map_err(|e| corrupt(format!("{e}")))?,
        count: u32::try_from(model.streak_count).unwrap_or(0),
    };

    Ok(models::Monitor {
        id,
        organization_id: model.organization_id,
        name: model.name,
        monitor_type: model.monitor_type.parse::<MonitorType>().map_err(|e| corrupt(format!("{e}")))?,
        target: model.target,
        frequency_seconds: u32::try_from(model.frequency_seconds)
            .map_err(|e| corrupt(e.to_string()))?,
        timeout_seconds: u32::try_from(model.timeout_seconds)
            .map_err(|e| corrupt(e.to_string()))?,
        config,
        status: model.status.parse::<MonitorStatus>().map_err(|e| corrupt(format!("{e}")))?,
        streak,
        next_check_at: model.next_check_at,
        last_checked_at: model.last_checked_at,
    })
}

fn channel_from_model(model: alert_channel::Model) -> Result<models::AlertChannel, StoreError> {
    Ok(models::AlertChannel {
        id: model.id,
        organization_id: model.organization_id,
        name: model.name,
        channel_type: model
            .channel_type
            .parse::<ChannelType>()
            .map_err(|e| StoreError::corrupt("alert channel", model.id, e))?,
        config: model.config,
        message_template: model.message_template,
    })
}

fn policy_from_model(
    model: alert_policy::Model,
    monitor_ids: Vec<MonitorId>,
    channel_ids: Vec<ChannelId>,
) -> Result<models::AlertPolicy, StoreError> {
    let notify_on: Vec<AlertStatus> = serde_json::from_value(model.notify_on)
        .map_err(|e| StoreError::corrupt("alert policy", model.id, e))?;
    Ok(models::AlertPolicy {
        id: model.id,
        organization_id: model.organization_id,
        name: model.name,
        monitor_ids,
        applies_to_all_monitors: model.applies_to_all_monitors,
        channel_ids,
        notify_on,
        is_active: model.is_active,
    })
}

fn history_from_model(model: alert_history::Model) -> Result<AlertHistoryEntry, StoreError> {
    Ok(AlertHistoryEntry {
        id: model.id,
        organization_id: model.organization_id,
        monitor_id: model.monitor_id,
        channel_id: model.channel_id,
        incident_id: model.incident_id.unwrap_or(model.id),
        status: model
            .status
            .parse::<AlertStatus>()
            .map_err(|e| StoreError::corrupt("alert", model.id, e))?,
        message: model.message,
        dispatched_at: model.dispatched_at,
        acknowledged_at: model.acknowledged_at,
        acknowledged_by: model.acknowledged_by,
    })
}

fn secrets_from_model(model: organization_secret::Model) -> OrganizationSecrets {
    let smtp = match (
        model.smtp_host,
        model.smtp_port.and_then(|p| u16::try_from(p).ok()),
        model.smtp_username,
        model.smtp_password,
        model.smtp_from,
    ) {
        (Some(host), Some(port), Some(username), Some(password), Some(from_address)) => {
            Some(StoredSmtpSettings {
                host,
                port,
                username,
                password,
                from_address,
                secure: model.smtp_secure.unwrap_or(true),
            })
        }
        _ => None,
    };

    OrganizationSecrets {
        organization_id: model.organization_id,
        smtp,
        resend_api_key: model.resend_api_key,
        email_from: model.email_from,
    }
}

/// Floor on how far an unreadable monitor is pushed back, in seconds.
const UNREADABLE_MONITOR_BACKOFF_SECS: i32 = 300;

/// Splits a due scan into readable monitors and unreadable rows with the time
/// each should next be looked at, so broken rows leave the head of the scan.
fn partition_due_rows(
    rows: Vec<monitor::Model>,
    now: DateTime<Utc>,
) -> (Vec<models::Monitor>, Vec<(MonitorId, DateTime<Utc>)>) {
    let mut due = Vec::with_capacity(rows.len());
    let mut deferred = Vec::new();
    for row in rows {
        let id = row.id;
        let backoff = row.frequency_seconds.max(UNREADABLE_MONITOR_BACKOFF_SECS);
        match monitor_from_model(row) {
            Ok(m) => due.push(m),
            Err(e) => {
                warn!(monitor_id = id, error = %e, "Skipping unreadable monitor.");
                deferred.push((id, now + chrono::Duration::seconds(i64::from(backoff))));
            }
        }
    }
    (due, deferred)
}

#[async_trait]
impl MonitorStore for PgStore {
    async fn due_monitors(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<models::Monitor>, StoreError> {
        let rows = Monitor::find()
            .filter(monitor::Column::Status.ne(MonitorStatus::Paused.as_str()))
            .filter(
                Condition::any()
                    .add(monitor::Column::NextCheckAt.is_null())
                    .add(monitor::Column::NextCheckAt.lte(now)),
            )
            .order_by_asc(monitor::Column::NextCheckAt)
            .order_by_asc(monitor::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        let (due, deferred) = partition_due_rows(rows, now);
        for (monitor_id, next_check_at) in deferred {
            let pushed = Monitor::update_many()
                .col_expr(monitor::Column::NextCheckAt, Expr::value(next_check_at))
                .filter(monitor::Column::Id.eq(monitor_id))
                .exec(&self.db)
                .await;
            if let Err(e) = pushed {
                warn!(monitor_id, error = %e, "Failed to defer unreadable monitor.");
            }
        }
        Ok(due)
    }

    async fn record_check_result(&self, result: &models::CheckResult) -> Result<(), StoreError> {
        check_result::ActiveModel {
            monitor_id: Set(result.monitor_id),
            organization_id: Set(result.organization_id),
            checked_at: Set(result.checked_at),
            outcome: Set(result.outcome.as_str().to_string()),
            latency_ms: Set(result.latency_ms.and_then(|v| i64::try_from(v).ok())),
            status_code: Set(result.status_code.map(i32::from)),
            error: Set(result.error.clone()),
            certificate_expires_in_days: Set(result.certificate_expires_in_days),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn update_monitor_state(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        update: MonitorStateUpdate,
    ) -> Result<MonitorStatus, StoreError> {
        let scoped = Condition::all()
            .add(monitor::Column::Id.eq(monitor_id))
            .add(monitor::Column::OrganizationId.eq(organization_id));

        let res = Monitor::update_many()
            .col_expr(
                monitor::Column::StreakOutcome,
                Expr::value(update.streak.outcome.map(|o| o.as_str().to_string())),
            )
            .col_expr(
                monitor::Column::StreakCount,
                Expr::value(i32::try_from(update.streak.count).unwrap_or(i32::MAX)),
            )
            .col_expr(monitor::Column::LastCheckedAt, Expr::value(update.checked_at))
            .col_expr(monitor::Column::NextCheckAt, Expr::value(update.next_check_at))
            .col_expr(monitor::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(scoped.clone())
            .exec(&self.db)
            .await?;
        if res.rows_affected == 0 {
            return Err(StoreError::not_found("monitor", monitor_id));
        }

        // A pause issued while the check was in flight wins.
        let res = Monitor::update_many()
            .col_expr(monitor::Column::Status, Expr::value(update.status.as_str()))
            .filter(scoped)
            .filter(monitor::Column::Status.ne(MonitorStatus::Paused.as_str()))
            .exec(&self.db)
            .await?;
        Ok(if res.rows_affected == 0 {
            MonitorStatus::Paused
        } else {
            update.status
        })
    }

    async fn set_monitor_paused(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        paused: bool,
    ) -> Result<MonitorStatus, StoreError> {
        let model = Monitor::find_by_id(monitor_id)
            .filter(monitor::Column::OrganizationId.eq(organization_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::not_found("monitor", monitor_id))?;

        let current = model
            .status
            .parse::<MonitorStatus>()
            .map_err(|e| StoreError::corrupt("monitor", monitor_id, e))?;
        let next = match (paused, current) {
            (true, _) => MonitorStatus::Paused,
            (false, MonitorStatus::Paused) => MonitorStatus::Pending,
            (false, other) => return Ok(other),
        };

        let mut active = model.into_active_model();
        active.status = Set(next.as_str().to_string());
        if next == MonitorStatus::Pending {
            active.next_check_at = Set(None);
            active.streak_outcome = Set(None);
            active.streak_count = Set(0);
        }
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(next)
    }

    async fn alert_channels_for(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        status: AlertStatus,
    ) -> Result<Vec<models::AlertChannel>, StoreError> {
        let bound_policy_ids: HashSet<i32> = AlertPolicyMonitor::find()
            .filter(alert_policy_monitor::Column::MonitorId.eq(monitor_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|link| link.policy_id)
            .collect();

        let policies = AlertPolicy::find()
            .filter(alert_policy::Column::OrganizationId.eq(organization_id))
            .filter(alert_policy::Column::IsActive.eq(true))
            .all(&self.db)
            .await?;

        let mut matching_policy_ids = Vec::new();
        for model in policies {
            let explicit = if bound_policy_ids.contains(&model.id) {
                vec![monitor_id]
            } else {
                Vec::new()
            };
            match policy_from_model(model, explicit, Vec::new()) {
                Ok(policy) if policy.covers(monitor_id, status) => matching_policy_ids.push(policy.id),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping unreadable alert policy."),
            }
        }
        if matching_policy_ids.is_empty() {
            return Ok(Vec::new());
        }

        let channel_ids: BTreeSet<i32> = AlertPolicyChannel::find()
            .filter(alert_policy_channel::Column::PolicyId.is_in(matching_policy_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|link| link.channel_id)
            .collect();
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }

        let channels = AlertChannel::find()
            .filter(alert_channel::Column::Id.is_in(channel_ids))
            .filter(alert_channel::Column::OrganizationId.eq(organization_id))
            .order_by_asc(alert_channel::Column::Id)
            .all(&self.db)
            .await?;

        Ok(channels
            .into_iter()
            .filter_map(|model| match channel_from_model(model) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable alert channel.");
                    None
                }
            })
            .collect())
    }

    async fn last_alert_for_channel(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        channel_id: ChannelId,
    ) -> Result<Option<AlertHistoryEntry>, StoreError> {
        AlertHistory::find()
            .filter(alert_history::Column::OrganizationId.eq(organization_id))
            .filter(alert_history::Column::MonitorId.eq(monitor_id))
            .filter(alert_history::Column::ChannelId.eq(channel_id))
            .order_by_desc(alert_history::Column::Id)
            .one(&self.db)
            .await?
            .map(history_from_model)
            .transpose()
    }

    async fn create_alert_history(
        &self,
        organization_id: OrganizationId,
        entry: NewAlertHistory,
    ) -> Result<AlertHistoryEntry, StoreError> {
        let saved = alert_history::ActiveModel {
            organization_id: Set(organization_id),
            monitor_id: Set(entry.monitor_id),
            channel_id: Set(entry.channel_id),
            incident_id: Set(entry.incident_id),
            status: Set(entry.status.as_str().to_string()),
            message: Set(entry.message),
            dispatched_at: Set(Utc::now()),
            acknowledged_at: Set(None),
            acknowledged_by: Set(None),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        history_from_model(saved)
    }

    async fn acknowledge_alert(
        &self,
        organization_id: OrganizationId,
        alert_id: AlertHistoryId,
        acknowledged_by: &str,
    ) -> Result<AlertHistoryEntry, StoreError> {
        let model = AlertHistory::find_by_id(alert_id)
            .filter(alert_history::Column::OrganizationId.eq(organization_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::not_found("alert", alert_id))?;

        if model.acknowledged_at.is_some() {
            return history_from_model(model);
        }

        let mut active = model.into_active_model();
        active.acknowledged_at = Set(Some(Utc::now()));
        active.acknowledged_by = Set(Some(acknowledged_by.to_string()));
        history_from_model(active.update(&self.db).await?)
    }

    async fn organization_secrets(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<OrganizationSecrets>, StoreError> {
        Ok(OrganizationSecret::find_by_id(organization_id)
            .one(&self.db)
            .await?
            .map(secrets_from_model))
    }
}
