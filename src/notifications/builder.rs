use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::chat::{discord_payload, slack_payload, teams_payload};
use super::credentials::{reveal_secret, EmailTransport, OrganizationCredentials};
use super::encryption::EncryptionService;
use super::jobs::{
    pagerduty_dedup_key, ChatJob, Destination, EmailJob, EventAction, GenericPayload, JobMeta,
    NotificationJob, PagerDutyJob, PagerDutyLink, PagerDutyPayload, WebhookBody, WebhookJob,
};
use super::models::{ChannelConfig, ChannelConfigError};
use super::signing;
use super::templates::{MessageRenderer, TemplateData};
use crate::alerting::StateTransition;
use crate::db::enums::{ChannelType, Severity};
use crate::db::models::{
    AlertChannel, AlertHistoryId, ChannelId, CheckResult, Monitor, MonitorId, OrganizationId,
};

#[derive(Error, Debug)]
pub enum JobBuildError {
    #[error("Invalid channel config: {0}")]
    Config(#[from] ChannelConfigError),
    #[error("Failed to render message: {0}")]
    Template(#[from] tera::Error),
    #[error("Channel {channel_id} belongs to another organisation")]
    OrganizationMismatch { channel_id: ChannelId },
}

/// Everything a job needs to know about the alert it delivers.
#[derive(Debug, Clone, Copy)]
pub struct AlertContext<'a> {
    pub monitor: &'a Monitor,
    pub result: &'a CheckResult,
    pub transition: &'a StateTransition,
    pub alert_history_id: AlertHistoryId,
    /// History id of the entry that opened the incident on this channel.
    pub incident_id: AlertHistoryId,
}

/// A channel's job with config parsed and text rendered, waiting only for
/// the alert history ids.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    channel_id: ChannelId,
    channel_type: ChannelType,
    organization_id: OrganizationId,
    monitor_id: MonitorId,
    config: ChannelConfig,
    data: TemplateData,
    message: String,
    subject: Option<String>,
    recovery: bool,
    severity: Severity,
}

impl PreparedJob {
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn template_data(&self) -> &TemplateData {
        &self.data
    }
}

pub struct JobBuilder {
    renderer: MessageRenderer,
    encryption: Option<Arc<EncryptionService>>,
    dashboard_url: String,
}

impl JobBuilder {
    pub fn new(
        dashboard_url: impl Into<String>,
        encryption: Option<Arc<EncryptionService>>,
    ) -> Result<Self, tera::Error> {
        Ok(Self {
            renderer: MessageRenderer::new()?,
            encryption,
            dashboard_url: dashboard_url.into(),
        })
    }

    pub fn template_data(
        &self,
        monitor: &Monitor,
        result: &CheckResult,
        transition: &StateTransition,
    ) -> TemplateData {
        TemplateData::new(monitor, result, transition, &self.dashboard_url)
    }

    /// Text stored on the alert history entry.
    pub fn history_message(&self, data: &TemplateData) -> String {
        self.renderer.summary(data).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to render alert summary.");
            format!("{} is {}", data.monitor_name, data.status)
        })
    }

    /// Does every fallible step for one channel. An error only concerns this
    /// channel, and nothing has been recorded for it yet.
    pub fn prepare(
        &self,
        monitor: &Monitor,
        result: &CheckResult,
        transition: &StateTransition,
        channel: &AlertChannel,
    ) -> Result<PreparedJob, JobBuildError> {
        if channel.organization_id != monitor.organization_id {
            return Err(JobBuildError::OrganizationMismatch {
                channel_id: channel.id,
            });
        }

        let config = ChannelConfig::parse(channel.channel_type, &channel.config)?;
        let data = self.template_data(monitor, result, transition);
        let message = self
            .renderer
            .message(channel.message_template.as_deref(), &data)?;
        let subject = match config {
            ChannelConfig::Email { .. } => Some(self.renderer.subject(&data)?),
            _ => None,
        };

        Ok(PreparedJob {
            channel_id: channel.id,
            channel_type: channel.channel_type,
            organization_id: channel.organization_id,
            monitor_id: monitor.id,
            config,
            data,
            message,
            subject,
            recovery: transition.is_recovery(),
            severity: transition.severity,
        })
    }

    /// Attaches the history ids and email transport to a prepared job.
    pub fn finish(
        &self,
        prepared: PreparedJob,
        alert_history_id: AlertHistoryId,
        incident_id: AlertHistoryId,
        credentials: Option<&OrganizationCredentials>,
    ) -> NotificationJob {
        let PreparedJob {
            channel_id,
            channel_type,
            organization_id,
            monitor_id,
            config,
            data,
            message,
            subject,
            recovery,
            severity,
        } = prepared;
        let meta = JobMeta {
            job_id: Uuid::new_v4(),
            alert_history_id,
            channel_id,
            channel_type,
            organization_id,
            monitor_id,
        };

        match config {
            ChannelConfig::Email { email } => NotificationJob::Email(EmailJob {
                meta,
                to: email,
                subject: subject.unwrap_or_default(),
                message,
                template_data: data,
                transport: credentials
                    .map(|c| c.email.clone())
                    .unwrap_or(EmailTransport::PlatformDefault),
            }),
            ChannelConfig::Slack { webhook_url } => NotificationJob::Chat(ChatJob {
                meta,
                webhook_url,
                payload: slack_payload(&data, &message),
            }),
            ChannelConfig::Discord { webhook_url } => NotificationJob::Chat(ChatJob {
                meta,
                webhook_url,
                payload: discord_payload(&data, &message),
            }),
            ChannelConfig::Teams { webhook_url } => NotificationJob::Chat(ChatJob {
                meta,
                webhook_url,
                payload: teams_payload(&data, &message),
            }),
            ChannelConfig::PagerDuty { routing_key } => {
                let event_action = if recovery {
                    EventAction::Resolve
                } else {
                    EventAction::Trigger
                };
                NotificationJob::PagerDuty(pagerduty_job(
                    meta,
                    routing_key,
                    event_action,
                    incident_id,
                    severity,
                    &data,
                    message,
                ))
            }
            ChannelConfig::Webhook {
                url,
                method,
                headers,
                signing_key,
            } => {
                let destination = Destination::Http {
                    url,
                    method: method
                        .map(|m| m.to_uppercase())
                        .unwrap_or_else(|| "POST".to_string()),
                    headers,
                };
                let payload = generic_payload(alert_history_id, &data, message);
                self.webhook_job(meta, destination, payload, signing_key.as_deref())
            }
            ChannelConfig::Ntfy {
                server_url,
                topic,
                priority,
                signing_key,
            } => {
                let destination = Destination::Http {
                    url: format!(
                        "{}/{}",
                        server_url.trim_end_matches('/'),
                        urlencoding::encode(&topic)
                    ),
                    method: "POST".to_string(),
                    headers: ntfy_headers(&data, priority),
                };
                let payload = generic_payload(alert_history_id, &data, message);
                self.webhook_job(meta, destination, payload, signing_key.as_deref())
            }
            ChannelConfig::Sms { phone_number } => {
                let payload = generic_payload(alert_history_id, &data, message);
                self.webhook_job(meta, Destination::Sms { phone_number }, payload, None)
            }
            ChannelConfig::Irc {
                server,
                port,
                channel,
                nickname,
            } => {
                let destination = Destination::Irc {
                    server,
                    port,
                    channel,
                    nickname,
                };
                let payload = generic_payload(alert_history_id, &data, message);
                self.webhook_job(meta, destination, payload, None)
            }
            ChannelConfig::Twitter { handle } => {
                let payload = generic_payload(alert_history_id, &data, message);
                self.webhook_job(meta, Destination::Twitter { handle }, payload, None)
            }
        }
    }

    /// Builds the job for one channel in a single step.
    pub fn build(
        &self,
        ctx: &AlertContext<'_>,
        channel: &AlertChannel,
        credentials: Option<&OrganizationCredentials>,
    ) -> Result<NotificationJob, JobBuildError> {
        let prepared = self.prepare(ctx.monitor, ctx.result, ctx.transition, channel)?;
        Ok(self.finish(prepared, ctx.alert_history_id, ctx.incident_id, credentials))
    }

    fn webhook_job(
        &self,
        meta: JobMeta,
        destination: Destination,
        payload: GenericPayload,
        signing_key: Option<&str>,
    ) -> NotificationJob {
        let body = self.sign_body(meta.channel_id, payload, signing_key);
        NotificationJob::Webhook(WebhookJob {
            meta,
            destination,
            body,
        })
    }

    /// Signing is best effort: any failure is logged and the body goes out unsigned.
    fn sign_body(
        &self,
        channel_id: ChannelId,
        payload: GenericPayload,
        signing_key: Option<&str>,
    ) -> WebhookBody {
        let Some(stored_key) = signing_key.filter(|k| !k.is_empty()) else {
            return WebhookBody::Unsigned(payload);
        };

        let key = match reveal_secret(stored_key, self.encryption.as_deref()) {
            Ok(key) => key,
            Err(e) => {
                warn!(channel_id, error = %e, "Failed to decrypt signing key; sending unsigned.");
                return WebhookBody::Unsigned(payload);
            }
        };
        let serialized = match serde_json::to_string(&payload) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(channel_id, error = %e, "Failed to serialize payload; sending unsigned.");
                return WebhookBody::Unsigned(payload);
            }
        };

        let signed_at = Utc::now().timestamp_millis();
        match signing::sign(&serialized, key.expose(), signed_at) {
            Ok(signature) => WebhookBody::Signed {
                payload,
                signature,
                signed_at,
            },
            Err(e) => {
                warn!(channel_id, error = %e, "Failed to sign payload; sending unsigned.");
                WebhookBody::Unsigned(payload)
            }
        }
    }
}

fn generic_payload(
    alert_history_id: AlertHistoryId,
    data: &TemplateData,
    message: String,
) -> GenericPayload {
    GenericPayload {
        alert_id: alert_history_id,
        monitor_id: data.monitor_id,
        monitor_name: data.monitor_name.clone(),
        monitor_url: data.monitor_url.clone(),
        status: data.status,
        message,
        response_time_ms: data.response_time_ms,
        status_code: data.status_code,
        dashboard_url: data.dashboard_url.clone(),
        timestamp: data.timestamp,
    }
}

fn pagerduty_job(
    meta: JobMeta,
    routing_key: String,
    event_action: EventAction,
    incident_id: AlertHistoryId,
    severity: Severity,
    data: &TemplateData,
    message: String,
) -> PagerDutyJob {
    PagerDutyJob {
        meta,
        routing_key,
        event_action,
        dedup_key: pagerduty_dedup_key(incident_id),
        payload: PagerDutyPayload {
            summary: message,
            source: data.monitor_url.clone(),
            severity,
            timestamp: data.timestamp,
            custom_details: json!({
                "monitorId": data.monitor_id,
                "monitorName": data.monitor_name,
                "status": data.status,
                "previousStatus": data.previous_status,
                "responseTimeMs": data.response_time_ms,
                "statusCode": data.status_code,
                "error": data.error,
            }),
        },
        links: vec![PagerDutyLink {
            href: data.dashboard_url.clone(),
            text: "View in dashboard".to_string(),
        }],
    }
}

fn ntfy_headers(data: &TemplateData, priority: Option<u8>) -> HashMap<String, String> {
    let priority = priority.unwrap_or(match data.status.severity() {
        Severity::Critical => 5,
        Severity::Warning => 4,
        Severity::Info => 3,
    });
    HashMap::from([
        (
            "Title".to_string(),
            format!("{} is {}", data.monitor_name, data.status),
        ),
        ("Priority".to_string(), priority.to_string()),
        ("Click".to_string(), data.dashboard_url.clone()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::evaluate;
    use crate::db::enums::{ChannelType, CheckOutcome, MonitorStatus, MonitorType};
    use crate::notifications::credentials::{Secret, SmtpCredentials};
    use crate::notifications::signing::verify;
    use crate::test_support::{channel, monitor};
    use serde_json::json;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    struct Fixture {
        monitor: Monitor,
        result: CheckResult,
        transition: StateTransition,
    }

    impl Fixture {
        fn new(prior: MonitorStatus, outcome: CheckOutcome) -> Self {
            let mut monitor = monitor(MonitorType::Https, "https://api.example.com/health");
            monitor.status = prior;
            let mut result = CheckResult::new(&monitor, outcome).with_latency(842);
            if outcome == CheckOutcome::Failure {
                result = result.with_status_code(503).with_error("Unexpected status code: 503");
            } else {
                result = result.with_status_code(200);
            }
            let transition = evaluate(prior, Default::default(), 1, &result)
                .transition
                .unwrap();
            Self {
                monitor,
                result,
                transition,
            }
        }

        fn ctx(&self, alert_history_id: AlertHistoryId, incident_id: AlertHistoryId) -> AlertContext<'_> {
            AlertContext {
                monitor: &self.monitor,
                result: &self.result,
                transition: &self.transition,
                alert_history_id,
                incident_id,
            }
        }
    }

    fn builder() -> JobBuilder {
        JobBuilder::new("https://status.example.com", None).unwrap()
    }

    #[test]
    fn slack_job_reports_down_with_monitor_name() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let slack = channel(5, ChannelType::Slack, json!({"webhookUrl": "https://hooks.slack.com/services/T/B/X"}));

        let job = builder().build(&fx.ctx(1, 1), &slack, None).unwrap();
        let NotificationJob::Chat(chat) = job else {
            panic!("expected a chat job");
        };
        let text = chat.payload.to_string();
        assert!(text.contains("down") || text.contains("DOWN"));
        assert!(text.contains("API"));
        assert!(text.contains("#E01E5A"));
        assert!(text.contains("https://status.example.com/monitors/1"));
        assert_eq!(chat.meta.alert_history_id, 1);
    }

    #[test]
    fn discord_embed_uses_integer_colour() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Degraded);
        let discord = channel(6, ChannelType::Discord, json!({"webhookUrl": "https://discord.com/api/webhooks/1/x"}));

        let NotificationJob::Chat(chat) = builder().build(&fx.ctx(2, 2), &discord, None).unwrap() else {
            panic!("expected a chat job");
        };
        assert_eq!(chat.payload["embeds"][0]["color"], json!(0xECB22E));
    }

    #[test]
    fn pagerduty_trigger_and_resolve_share_dedup_key() {
        let pd = channel(7, ChannelType::PagerDuty, json!({"routingKey": "R0UT1NG"}));

        let down = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let NotificationJob::PagerDuty(trigger) = builder().build(&down.ctx(10, 10), &pd, None).unwrap() else {
            panic!("expected a PagerDuty job");
        };

        let up = Fixture::new(MonitorStatus::Down, CheckOutcome::Success);
        let NotificationJob::PagerDuty(resolve) = builder().build(&up.ctx(11, 10), &pd, None).unwrap() else {
            panic!("expected a PagerDuty job");
        };

        assert_eq!(trigger.event_action, EventAction::Trigger);
        assert_eq!(resolve.event_action, EventAction::Resolve);
        assert_eq!(trigger.dedup_key, "monitor-10");
        assert_eq!(trigger.dedup_key, resolve.dedup_key);

        let wire = serde_json::to_value(NotificationJob::PagerDuty(resolve)).unwrap();
        assert_eq!(wire["eventAction"], "resolve");
        assert_eq!(wire["dedupKey"], "monitor-10");
    }

    #[test]
    fn email_job_carries_subject_and_org_transport() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let email = channel(8, ChannelType::Email, json!({"email": "ops@example.com"}));
        let credentials = OrganizationCredentials {
            organization_id: 10,
            email: EmailTransport::Smtp(SmtpCredentials {
                host: "smtp.example.com".to_string(),
                port: 465,
                username: "mailer".to_string(),
                password: Secret::new("hunter2"),
                from_address: "alerts@example.com".to_string(),
                secure: true,
            }),
        };

        let NotificationJob::Email(job) = builder().build(&fx.ctx(3, 3), &email, Some(&credentials)).unwrap() else {
            panic!("expected an email job");
        };
        assert_eq!(job.subject, "[Alert] API is down");
        assert_eq!(job.to, "ops@example.com");
        assert!(matches!(job.transport, EmailTransport::Smtp(_)));

        let body = serde_json::to_string(&NotificationJob::Email(job)).unwrap();
        assert!(!body.contains("hunter2"));
        assert!(body.contains("smtp.example.com"));

        let NotificationJob::Email(job) = builder().build(&fx.ctx(3, 3), &email, None).unwrap() else {
            panic!("expected an email job");
        };
        assert_eq!(job.transport, EmailTransport::PlatformDefault);
    }

    #[test]
    fn signed_webhook_body_verifies_and_detects_tampering() {
        let encryption = Arc::new(EncryptionService::from_hex(KEY_HEX).unwrap());
        let stored_key = encryption.encrypt_str("whsec_live").unwrap();
        let builder = JobBuilder::new("https://status.example.com", Some(encryption)).unwrap();

        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let hook = channel(9, ChannelType::Webhook, json!({"url": "https://hooks.example.com/uptime", "signingKey": stored_key}));

        let NotificationJob::Webhook(job) = builder.build(&fx.ctx(4, 4), &hook, None).unwrap() else {
            panic!("expected a webhook job");
        };
        let WebhookBody::Signed { payload, signature, signed_at } = job.body.clone() else {
            panic!("expected a signed body");
        };

        let wire = serde_json::to_value(&job.body).unwrap();
        assert!(wire.get("signature").is_some());
        assert!(wire.get("signedAt").is_some());
        assert_eq!(wire["monitorName"], "API");

        let serialized = serde_json::to_string(&payload).unwrap();
        assert!(verify(&serialized, &signature, "whsec_live", signed_at));

        let mut tampered = payload.clone();
        tampered.message = "all good".to_string();
        let tampered = serde_json::to_string(&tampered).unwrap();
        assert!(!verify(&tampered, &signature, "whsec_live", signed_at));
    }

    #[test]
    fn undecryptable_signing_key_sends_unsigned() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let hook = channel(9, ChannelType::Webhook, json!({"url": "https://hooks.example.com/uptime", "signingKey": "enc:v1:deadbeef"}));

        let NotificationJob::Webhook(job) = builder().build(&fx.ctx(4, 4), &hook, None).unwrap() else {
            panic!("expected a webhook job");
        };
        assert!(!job.body.is_signed());
        assert_eq!(job.body.payload().alert_id, 4);
    }

    #[test]
    fn ntfy_posts_to_topic_url() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let ntfy = channel(11, ChannelType::Ntfy, json!({"topic": "ops alerts"}));

        let NotificationJob::Webhook(job) = builder().build(&fx.ctx(5, 5), &ntfy, None).unwrap() else {
            panic!("expected a webhook job");
        };
        match job.destination {
            Destination::Http { url, method, headers } => {
                assert_eq!(url, "https://ntfy.sh/ops%20alerts");
                assert_eq!(method, "POST");
                assert_eq!(headers.get("Priority").map(String::as_str), Some("5"));
            }
            other => panic!("unexpected destination {other:?}"),
        }
    }

    #[test]
    fn sms_job_targets_phone_number() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let sms = channel(12, ChannelType::Sms, json!({"phoneNumber": "+15550100"}));

        let NotificationJob::Webhook(job) = builder().build(&fx.ctx(6, 6), &sms, None).unwrap() else {
            panic!("expected a webhook job");
        };
        assert_eq!(
            job.destination,
            Destination::Sms {
                phone_number: "+15550100".to_string()
            }
        );
    }

    #[test]
    fn malformed_config_fails_only_that_job() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let broken = channel(13, ChannelType::Webhook, json!({"url": ""}));
        let fine = channel(14, ChannelType::Teams, json!({"webhookUrl": "https://outlook.office.com/webhook/x"}));

        let builder = builder();
        assert!(matches!(
            builder.build(&fx.ctx(7, 7), &broken, None),
            Err(JobBuildError::Config(_))
        ));
        assert!(builder.build(&fx.ctx(8, 8), &fine, None).is_ok());
    }

    #[test]
    fn prepare_rejects_broken_channel_before_ids_exist() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let builder = builder();

        let broken = channel(17, ChannelType::Slack, json!({"webhookUrl": ""}));
        assert!(matches!(
            builder.prepare(&fx.monitor, &fx.result, &fx.transition, &broken),
            Err(JobBuildError::Config(_))
        ));

        let mut bad_template = channel(18, ChannelType::Slack, json!({"webhookUrl": "https://hooks.slack.com/x"}));
        bad_template.message_template = Some("{{ monitor_name".to_string());
        assert!(matches!(
            builder.prepare(&fx.monitor, &fx.result, &fx.transition, &bad_template),
            Err(JobBuildError::Template(_))
        ));

        let pd = channel(19, ChannelType::PagerDuty, json!({"routingKey": "R0UT1NG"}));
        let prepared = builder
            .prepare(&fx.monitor, &fx.result, &fx.transition, &pd)
            .unwrap();
        assert_eq!(prepared.channel_type(), ChannelType::PagerDuty);
        let NotificationJob::PagerDuty(job) = builder.finish(prepared, 21, 20, None) else {
            panic!("expected a PagerDuty job");
        };
        assert_eq!(job.meta.alert_history_id, 21);
        assert_eq!(job.dedup_key, "monitor-20");
    }

    #[test]
    fn custom_message_template_is_used() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let mut hook = channel(15, ChannelType::Webhook, json!({"url": "https://hooks.example.com/x"}));
        hook.message_template = Some("{{ monitor_name }} went {{ status }} ({{ status_code }})".to_string());

        let NotificationJob::Webhook(job) = builder().build(&fx.ctx(9, 9), &hook, None).unwrap() else {
            panic!("expected a webhook job");
        };
        assert_eq!(job.body.payload().message, "API went down (503)");
    }

    #[test]
    fn foreign_channel_is_rejected() {
        let fx = Fixture::new(MonitorStatus::Active, CheckOutcome::Failure);
        let mut slack = channel(16, ChannelType::Slack, json!({"webhookUrl": "https://hooks.slack.com/x"}));
        slack.organization_id = 99;

        assert!(matches!(
            builder().build(&fx.ctx(1, 1), &slack, None),
            Err(JobBuildError::OrganizationMismatch { channel_id: 16 })
        ));
    }
}
