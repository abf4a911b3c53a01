//! Queue-ready notification jobs, one variant per delivery mechanism.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::credentials::EmailTransport;
use super::templates::TemplateData;
use crate::db::enums::{AlertStatus, ChannelType, Severity};
use crate::db::models::{AlertHistoryId, ChannelId, MonitorId, OrganizationId};

/// Identifies the alert and channel a job belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    /// Unique per job so consumers can drop redelivered messages.
    pub job_id: Uuid,
    pub alert_history_id: AlertHistoryId,
    pub channel_id: ChannelId,
    pub channel_type: ChannelType,
    pub organization_id: OrganizationId,
    pub monitor_id: MonitorId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NotificationJob {
    Email(EmailJob),
    Chat(ChatJob),
    PagerDuty(PagerDutyJob),
    Webhook(WebhookJob),
}

impl NotificationJob {
    pub fn meta(&self) -> &JobMeta {
        match self {
            NotificationJob::Email(job) => &job.meta,
            NotificationJob::Chat(job) => &job.meta,
            NotificationJob::PagerDuty(job) => &job.meta,
            NotificationJob::Webhook(job) => &job.meta,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        self.meta().channel_type
    }

    pub fn alert_history_id(&self) -> AlertHistoryId {
        self.meta().alert_history_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.meta().channel_id
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub to: String,
    pub subject: String,
    pub message: String,
    pub template_data: TemplateData,
    pub transport: EmailTransport,
}

/// Slack, Discord and Teams: a native payload posted to the channel's webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub webhook_url: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Trigger,
    Resolve,
}

/// A PagerDuty Events API v2 event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagerDutyJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub routing_key: String,
    pub event_action: EventAction,
    /// Stable for the lifetime of an incident so trigger and resolve pair up.
    pub dedup_key: String,
    pub payload: PagerDutyPayload,
    pub links: Vec<PagerDutyLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PagerDutyPayload {
    pub summary: String,
    pub source: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub custom_details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PagerDutyLink {
    pub href: String,
    pub text: String,
}

pub fn pagerduty_dedup_key(incident_id: AlertHistoryId) -> String {
    format!("monitor-{incident_id}")
}

/// Where a generic job goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Destination {
    #[serde(rename_all = "camelCase")]
    Http {
        url: String,
        method: String,
        headers: HashMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    Sms { phone_number: String },
    #[serde(rename_all = "camelCase")]
    Irc {
        server: String,
        port: u16,
        channel: String,
        nickname: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Twitter { handle: String },
}

/// Channel-agnostic alert body for webhook, ntfy, SMS, IRC and Twitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericPayload {
    pub alert_id: AlertHistoryId,
    pub monitor_id: MonitorId,
    pub monitor_name: String,
    pub monitor_url: String,
    pub status: AlertStatus,
    pub message: String,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub dashboard_url: String,
    pub timestamp: DateTime<Utc>,
}

/// A body either carries an HMAC signature or it does not; receivers can tell
/// from the presence of `signature` and `signedAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WebhookBody {
    #[serde(rename_all = "camelCase")]
    Signed {
        #[serde(flatten)]
        payload: GenericPayload,
        signature: String,
        signed_at: i64,
    },
    Unsigned(GenericPayload),
}

impl WebhookBody {
    pub fn payload(&self) -> &GenericPayload {
        match self {
            WebhookBody::Signed { payload, .. } | WebhookBody::Unsigned(payload) => payload,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, WebhookBody::Signed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub destination: Destination,
    pub body: WebhookBody,
}
