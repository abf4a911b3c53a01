//! In-process store used by tests and `run --dry-run`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use super::enums::{AlertStatus, MonitorStatus};
use super::models::{
    AlertChannel, AlertHistoryEntry, AlertHistoryId, AlertPolicy, ChannelId, CheckResult, Monitor,
    MonitorId, MonitorStateUpdate, NewAlertHistory, OrganizationId, OrganizationSecrets, PolicyId,
};
use super::store::{MonitorStore, StoreError};

/// Seed data for a `MemoryStore`, usually read from a JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
    pub monitors: Vec<Monitor>,
    pub channels: Vec<AlertChannel>,
    pub policies: Vec<AlertPolicy>,
    pub secrets: Vec<OrganizationSecrets>,
}

#[derive(thiserror::Error, Debug)]
pub enum FixtureError {
    #[error("Failed to read fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    monitors: DashMap<MonitorId, Monitor>,
    check_results: DashMap<MonitorId, Vec<CheckResult>>,
    channels: DashMap<ChannelId, AlertChannel>,
    policies: DashMap<PolicyId, AlertPolicy>,
    history: DashMap<AlertHistoryId, AlertHistoryEntry>,
    secrets: DashMap<OrganizationId, OrganizationSecrets>,
    next_history_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_history_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let store = Self::new();
        fixture.monitors.into_iter().for_each(|m| store.insert_monitor(m));
        fixture.channels.into_iter().for_each(|c| store.insert_channel(c));
        fixture.policies.into_iter().for_each(|p| store.insert_policy(p));
        fixture.secrets.into_iter().for_each(|s| store.insert_secrets(s));
        store
    }

    pub fn insert_monitor(&self, monitor: Monitor) {
        self.monitors.insert(monitor.id, monitor);
    }

    pub fn insert_channel(&self, channel: AlertChannel) {
        self.channels.insert(channel.id, channel);
    }

    pub fn insert_policy(&self, policy: AlertPolicy) {
        self.policies.insert(policy.id, policy);
    }

    pub fn insert_secrets(&self, secrets: OrganizationSecrets) {
        self.secrets.insert(secrets.organization_id, secrets);
    }

    pub fn monitor(&self, monitor_id: MonitorId) -> Option<Monitor> {
        self.monitors.get(&monitor_id).map(|m| m.clone())
    }

    pub fn check_results(&self, monitor_id: MonitorId) -> Vec<CheckResult> {
        self.check_results
            .get(&monitor_id)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// All history entries, ordered by id.
    pub fn alert_history(&self) -> Vec<AlertHistoryEntry> {
        let mut entries: Vec<_> = self.history.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    fn owned_monitor(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, MonitorId, Monitor>, StoreError> {
        self.monitors
            .get_mut(&monitor_id)
            .filter(|m| m.organization_id == organization_id)
            .ok_or_else(|| StoreError::not_found("monitor", monitor_id))
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn due_monitors(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<Monitor>, StoreError> {
        let mut due: Vec<Monitor> = self
            .monitors
            .iter()
            .filter(|m| m.is_due(now))
            .map(|m| m.value().clone())
            .collect();
        due.sort_by_key(|m| (m.next_check_at, m.id));
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn record_check_result(&self, result: &CheckResult) -> Result<(), StoreError> {
        self.check_results
            .entry(result.monitor_id)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn update_monitor_state(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        update: MonitorStateUpdate,
    ) -> Result<MonitorStatus, StoreError> {
        let mut monitor = self.owned_monitor(organization_id, monitor_id)?;
        // A pause issued while the check was in flight wins.
        if monitor.status != MonitorStatus::Paused {
            monitor.status = update.status;
        }
        monitor.streak = update.streak;
        monitor.last_checked_at = Some(update.checked_at);
        monitor.next_check_at = Some(update.next_check_at);
        Ok(monitor.status)
    }

    async fn set_monitor_paused(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        paused: bool,
    ) -> Result<MonitorStatus, StoreError> {
        let mut monitor = self.owned_monitor(organization_id, monitor_id)?;
        if paused {
            monitor.status = MonitorStatus::Paused;
        } else if monitor.status == MonitorStatus::Paused {
            monitor.status = MonitorStatus::Pending;
            monitor.next_check_at = None;
            monitor.streak = Default::default();
        }
        Ok(monitor.status)
    }

    async fn alert_channels_for(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        status: AlertStatus,
    ) -> Result<Vec<AlertChannel>, StoreError> {
        let channel_ids: BTreeSet<ChannelId> = self
            .policies
            .iter()
            .filter(|p| p.organization_id == organization_id && p.covers(monitor_id, status))
            .flat_map(|p| p.channel_ids.clone())
            .collect();

        Ok(channel_ids
            .into_iter()
            .filter_map(|id| self.channels.get(&id).map(|c| c.clone()))
            .filter(|c| c.organization_id == organization_id)
            .collect())
    }

    async fn last_alert_for_channel(
        &self,
        organization_id: OrganizationId,
        monitor_id: MonitorId,
        channel_id: ChannelId,
    ) -> Result<Option<AlertHistoryEntry>, StoreError> {
        Ok(self
            .history
            .iter()
            .filter(|e| {
                e.organization_id == organization_id
                    && e.monitor_id == monitor_id
                    && e.channel_id == channel_id
            })
            .max_by_key(|e| e.id)
            .map(|e| e.value().clone()))
    }

    async fn create_alert_history(
        &self,
        organization_id: OrganizationId,
        entry: NewAlertHistory,
    ) -> Result<AlertHistoryEntry, StoreError> {
        let id = self.next_history_id.fetch_add(1, Ordering::SeqCst);
        let stored = AlertHistoryEntry {
            id,
            organization_id,
            monitor_id: entry.monitor_id,
            channel_id: entry.channel_id,
            incident_id: entry.incident_id.unwrap_or(id),
            status: entry.status,
            message: entry.message,
            dispatched_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
        };
        self.history.insert(id, stored.clone());
        Ok(stored)
    }

    async fn acknowledge_alert(
        &self,
        organization_id: OrganizationId,
        alert_id: AlertHistoryId,
        acknowledged_by: &str,
    ) -> Result<AlertHistoryEntry, StoreError> {
        let mut entry = self
            .history
            .get_mut(&alert_id)
            .filter(|e| e.organization_id == organization_id)
            .ok_or_else(|| StoreError::not_found("alert", alert_id))?;
        if entry.acknowledged_at.is_none() {
            entry.acknowledged_at = Some(Utc::now());
            entry.acknowledged_by = Some(acknowledged_by.to_string());
        }
        Ok(entry.clone())
    }

    async fn organization_secrets(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<OrganizationSecrets>, StoreError> {
        Ok(self.secrets.get(&organization_id).map(|s| s.clone()))
    }
}
