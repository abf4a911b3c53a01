//! Domain records shared by the scheduler, evaluator, job builder and stores.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::enums::{AlertStatus, ChannelType, CheckOutcome, MonitorStatus, MonitorType};
use crate::checks::target::{InvalidTarget, ProbeTarget};

pub type OrganizationId = i32;
pub type MonitorId = i32;
pub type ChannelId = i32;
pub type PolicyId = i32;
pub type AlertHistoryId = i64;

const DEFAULT_CERTIFICATE_EXPIRY_DAYS: u32 = 14;

/// A single expected/degraded status code rule: `204`, `"200-299"` or `"2xx"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStatusCodeRule", into = "RawStatusCodeRule")]
pub enum StatusCodeRule {
    Exact(u16),
    Range { from: u16, to: u16 },
}

impl StatusCodeRule {
    pub fn matches(&self, code: u16) -> bool {
        match *self {
            StatusCodeRule::Exact(expected) => expected == code,
            StatusCodeRule::Range { from, to } => (from..=to).contains(&code),
        }
    }
}

impl FromStr for StatusCodeRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |v: &str| {
            v.trim()
                .parse::<u16>()
                .map_err(|e| format!("Invalid status code '{v}': {e}"))
        };

        if let Some((from, to)) = s.split_once('-') {
            let (from, to) = (parse(from)?, parse(to)?);
            if from > to {
                return Err(format!("Invalid status code range '{s}'"));
            }
            return Ok(StatusCodeRule::Range { from, to });
        }

        let lower = s.to_ascii_lowercase();
        if lower.len() == 3 && lower.ends_with("xx") {
            let class = parse(&lower[..1])?;
            return Ok(StatusCodeRule::Range {
                from: class * 100,
                to: class * 100 + 99,
            });
        }

        parse(s).map(StatusCodeRule::Exact)
    }
}

impl fmt::Display for StatusCodeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCodeRule::Exact(code) => write!(f, "{code}"),
            StatusCodeRule::Range { from, to } => write!(f, "{from}-{to}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawStatusCodeRule {
    Code(u16),
    Text(String),
}

impl TryFrom<RawStatusCodeRule> for StatusCodeRule {
    type Error = String;

    fn try_from(raw: RawStatusCodeRule) -> Result<Self, Self::Error> {
        match raw {
            RawStatusCodeRule::Code(code) => Ok(StatusCodeRule::Exact(code)),
            RawStatusCodeRule::Text(text) => text.parse(),
        }
    }
}

impl From<StatusCodeRule> for RawStatusCodeRule {
    fn from(rule: StatusCodeRule) -> Self {
        match rule {
            StatusCodeRule::Exact(code) => RawStatusCodeRule::Code(code),
            range => RawStatusCodeRule::Text(range.to_string()),
        }
    }
}

/// Per-monitor check configuration, stored as a JSON column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckConfig {
    pub expected_status_codes: Vec<StatusCodeRule>,
    pub degraded_status_codes: Vec<StatusCodeRule>,
    pub degraded_latency_ms: Option<u64>,
    pub ssl_monitoring: Option<bool>,
    pub certificate_expiry_days: Option<u32>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub confirmation_threshold: Option<u32>,
}

impl CheckConfig {
    /// Certificate inspection is on unless explicitly switched off.
    pub fn ssl_monitoring_enabled(&self) -> bool {
        self.ssl_monitoring != Some(false)
    }

    pub fn is_expected_status(&self, code: u16) -> bool {
        if self.expected_status_codes.is_empty() {
            return (200..=299).contains(&code);
        }
        self.expected_status_codes.iter().any(|rule| rule.matches(code))
    }

    pub fn is_degraded_status(&self, code: u16) -> bool {
        self.degraded_status_codes.iter().any(|rule| rule.matches(code))
    }

    pub fn certificate_expiry_days(&self) -> u32 {
        self.certificate_expiry_days
            .unwrap_or(DEFAULT_CERTIFICATE_EXPIRY_DAYS)
    }

    pub fn confirmation_threshold(&self) -> u32 {
        self.confirmation_threshold.unwrap_or(1).max(1)
    }
}

/// Consecutive results pointing at a status the monitor has not moved to yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeStreak {
    pub outcome: Option<CheckOutcome>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: MonitorId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub monitor_type: MonitorType,
    pub target: String,
    pub frequency_seconds: u32,
    pub timeout_seconds: u32,
    #[serde(default)]
    pub config: CheckConfig,
    pub status: MonitorStatus,
    #[serde(default)]
    pub streak: OutcomeStreak,
    #[serde(default)]
    pub next_check_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Monitor {
    pub fn is_paused(&self) -> bool {
        self.status == MonitorStatus::Paused
    }

    /// A paused monitor is never due, whatever its next check time says.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_paused() && self.next_check_at.map_or(true, |at| at <= now)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    pub fn next_check_after(&self, checked_at: DateTime<Utc>) -> DateTime<Utc> {
        checked_at + ChronoDuration::seconds(i64::from(self.frequency_seconds.max(1)))
    }

    /// Checks the target and timing constraints, returning the parsed probe target.
    pub fn validate(&self) -> Result<ProbeTarget, InvalidTarget> {
        if self.timeout_seconds == 0 {
            return Err(InvalidTarget::new(&self.target, "timeout must be positive"));
        }
        if self.frequency_seconds == 0 {
            return Err(InvalidTarget::new(&self.target, "frequency must be positive"));
        }
        ProbeTarget::parse(self.monitor_type, &self.target)
    }
}

/// Immutable record of one probe execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub monitor_id: MonitorId,
    pub organization_id: OrganizationId,
    pub checked_at: DateTime<Utc>,
    pub outcome: CheckOutcome,
    pub latency_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub certificate_expires_in_days: Option<i64>,
}

impl CheckResult {
    pub fn new(monitor: &Monitor, outcome: CheckOutcome) -> Self {
        Self {
            monitor_id: monitor.id,
            organization_id: monitor.organization_id,
            checked_at: Utc::now(),
            outcome,
            latency_ms: None,
            status_code: None,
            error: None,
            certificate_expires_in_days: None,
        }
    }

    pub fn failure(monitor: &Monitor, error: impl Into<String>) -> Self {
        Self::new(monitor, CheckOutcome::Failure).with_error(error)
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A notification destination. The config is kept untyped here and only
/// checked against `channel_type` when a job is built for it, so one broken
/// channel cannot prevent its siblings from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertChannel {
    pub id: ChannelId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub channel_type: ChannelType,
    pub config: serde_json::Value,
    #[serde(default)]
    pub message_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPolicy {
    pub id: PolicyId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub monitor_ids: Vec<MonitorId>,
    #[serde(default)]
    pub applies_to_all_monitors: bool,
    pub channel_ids: Vec<ChannelId>,
    #[serde(default = "default_notify_on")]
    pub notify_on: Vec<AlertStatus>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_notify_on() -> Vec<AlertStatus> {
    vec![AlertStatus::Down, AlertStatus::Degraded, AlertStatus::Recovered]
}

fn default_true() -> bool {
    true
}

impl AlertPolicy {
    pub fn covers(&self, monitor_id: MonitorId, status: AlertStatus) -> bool {
        self.is_active
            && self.notify_on.contains(&status)
            && (self.applies_to_all_monitors || self.monitor_ids.contains(&monitor_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryEntry {
    pub id: AlertHistoryId,
    pub organization_id: OrganizationId,
    pub monitor_id: MonitorId,
    pub channel_id: ChannelId,
    /// Id of the entry that opened this incident on the channel.
    pub incident_id: AlertHistoryId,
    pub status: AlertStatus,
    pub message: String,
    pub dispatched_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

impl AlertHistoryEntry {
    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Recovered
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlertHistory {
    pub monitor_id: MonitorId,
    pub channel_id: ChannelId,
    /// `None` opens a new incident; the stored entry then points at itself.
    pub incident_id: Option<AlertHistoryId>,
    pub status: AlertStatus,
    pub message: String,
}

/// State written back to a monitor after each check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStateUpdate {
    pub status: MonitorStatus,
    pub streak: OutcomeStreak,
    pub checked_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

/// Organisation secrets as stored; values may carry the encryption prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSecrets {
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub smtp: Option<StoredSmtpSettings>,
    #[serde(default)]
    pub resend_api_key: Option<String>,
    #[serde(default)]
    pub email_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    #[serde(default = "default_true")]
    pub secure: bool,
}
