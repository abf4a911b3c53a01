use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Tera};

use crate::alerting::StateTransition;
use crate::db::enums::{AlertStatus, MonitorStatus};
use crate::db::models::{CheckResult, Monitor, MonitorId};

const SUBJECT_TEMPLATE: &str = "subject";
const SUMMARY_TEMPLATE: &str = "summary";

const DEFAULT_SUBJECT: &str = "[Alert] {{ monitor_name }} is {{ status }}";
const DEFAULT_SUMMARY: &str = r#"{{ emoji }} {% if status == "recovered" -%}
{{ monitor_name }} has recovered and is responding normally
{%- elif status == "degraded" -%}
{{ monitor_name }} is degraded
{%- else -%}
{{ monitor_name }} is down
{%- endif %}{% if error %}: {{ error }}{% endif %}"#;

/// Variables available to message templates, including per-channel overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateData {
    pub monitor_id: MonitorId,
    pub monitor_name: String,
    pub monitor_url: String,
    pub monitor_type: String,
    pub status: AlertStatus,
    pub previous_status: MonitorStatus,
    pub severity: String,
    pub emoji: &'static str,
    pub error: Option<String>,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub certificate_expires_in_days: Option<i64>,
    pub dashboard_url: String,
    pub timestamp: DateTime<Utc>,
}

impl TemplateData {
    pub fn new(
        monitor: &Monitor,
        result: &CheckResult,
        transition: &StateTransition,
        dashboard_base_url: &str,
    ) -> Self {
        Self {
            monitor_id: monitor.id,
            monitor_name: monitor.name.clone(),
            monitor_url: monitor.target.clone(),
            monitor_type: monitor.monitor_type.to_string(),
            status: transition.alert_status,
            previous_status: transition.from,
            severity: transition.severity.to_string(),
            emoji: transition.alert_status.emoji(),
            error: result.error.clone(),
            response_time_ms: result.latency_ms,
            status_code: result.status_code,
            certificate_expires_in_days: result.certificate_expires_in_days,
            dashboard_url: monitor_dashboard_url(dashboard_base_url, monitor.id),
            timestamp: result.checked_at,
        }
    }
}

pub fn monitor_dashboard_url(base: &str, monitor_id: MonitorId) -> String {
    format!("{}/monitors/{monitor_id}", base.trim_end_matches('/'))
}

pub struct MessageRenderer {
    tera: Tera,
}

impl MessageRenderer {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (SUBJECT_TEMPLATE, DEFAULT_SUBJECT),
            (SUMMARY_TEMPLATE, DEFAULT_SUMMARY),
        ])?;
        tera.autoescape_on(vec![]);
        Ok(Self { tera })
    }

    pub fn subject(&self, data: &TemplateData) -> Result<String, tera::Error> {
        self.tera.render(SUBJECT_TEMPLATE, &Context::from_serialize(data)?)
    }

    pub fn summary(&self, data: &TemplateData) -> Result<String, tera::Error> {
        self.tera.render(SUMMARY_TEMPLATE, &Context::from_serialize(data)?)
    }

    /// Renders a channel's own `messageTemplate`, falling back to the summary.
    pub fn message(
        &self,
        custom_template: Option<&str>,
        data: &TemplateData,
    ) -> Result<String, tera::Error> {
        match custom_template.filter(|t| !t.trim().is_empty()) {
            Some(template) => Tera::one_off(template, &Context::from_serialize(data)?, false),
            None => self.summary(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::evaluate;
    use crate::db::enums::{CheckOutcome, MonitorType};
    use crate::test_support::monitor;

    fn data(prior: MonitorStatus, outcome: CheckOutcome, error: Option<&str>) -> TemplateData {
        let monitor = monitor(MonitorType::Https, "https://api.example.com");
        let mut result = CheckResult::new(&monitor, outcome);
        result.error = error.map(str::to_string);
        let transition = evaluate(prior, Default::default(), 1, &result)
            .transition
            .unwrap();
        TemplateData::new(&monitor, &result, &transition, "https://status.example.com/")
    }

    #[test]
    fn subject_names_monitor_and_status() {
        let renderer = MessageRenderer::new().unwrap();
        let subject = renderer
            .subject(&data(MonitorStatus::Active, CheckOutcome::Failure, None))
            .unwrap();
        assert_eq!(subject, "[Alert] API is down");
    }

    #[test]
    fn summary_includes_error_detail() {
        let renderer = MessageRenderer::new().unwrap();
        let summary = renderer
            .summary(&data(
                MonitorStatus::Active,
                CheckOutcome::Failure,
                Some("Connection refused"),
            ))
            .unwrap();
        assert_eq!(summary, "🔴 API is down: Connection refused");

        let recovered = renderer
            .summary(&data(MonitorStatus::Down, CheckOutcome::Success, None))
            .unwrap();
        assert_eq!(recovered, "🟢 API has recovered and is responding normally");
    }

    #[test]
    fn custom_template_overrides_summary() {
        let renderer = MessageRenderer::new().unwrap();
        let d = data(MonitorStatus::Active, CheckOutcome::Degraded, None);
        let message = renderer
            .message(Some("{{ monitor_name }} -> {{ status }} ({{ severity }})"), &d)
            .unwrap();
        assert_eq!(message, "API -> degraded (warning)");
    }

    #[test]
    fn broken_custom_template_is_an_error() {
        let renderer = MessageRenderer::new().unwrap();
        let d = data(MonitorStatus::Active, CheckOutcome::Failure, None);
        assert!(renderer.message(Some("{{ monitor_name "), &d).is_err());
    }

    #[test]
    fn dashboard_link_points_at_monitor() {
        let d = data(MonitorStatus::Active, CheckOutcome::Failure, None);
        assert_eq!(d.dashboard_url, "https://status.example.com/monitors/1");
    }
}
