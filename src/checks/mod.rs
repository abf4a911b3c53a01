//! Check execution: one bounded probe per call, always yielding a `CheckResult`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

pub mod certificate;
mod http;
mod ping;
pub mod target;
mod tcp;

pub use certificate::{CertificateInspector, CertificateStatus};
pub use http::classify_http_status;
pub use target::{InvalidTarget, ProbeTarget};

use crate::db::enums::{CheckOutcome, MonitorType};
use crate::db::models::{CheckResult, Monitor};
use crate::version::VERSION;

/// Anything able to run a monitor's probe. The scheduler only sees this.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn run(&self, monitor: &Monitor) -> CheckResult;
}

pub struct CheckExecutor {
    client: Client,
    certificates: Option<CertificateInspector>,
}

impl CheckExecutor {
    /// `certificates` may be `None` when no trust roots could be loaded; certificate
    /// gated checks then fail instead of silently passing.
    pub fn new(certificates: Option<CertificateInspector>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(format!("uptime-worker/{VERSION}"))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            certificates,
        })
    }

    pub async fn execute(&self, monitor: &Monitor) -> CheckResult {
        let target = match monitor.validate() {
            Ok(target) => target,
            Err(e) => {
                warn!(monitor_id = monitor.id, error = %e, "Monitor failed validation.");
                return CheckResult::failure(monitor, e.to_string());
            }
        };

        match tokio::time::timeout(monitor.timeout(), self.probe(monitor, &target)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(monitor_id = monitor.id, "Check exceeded its timeout.");
                CheckResult::failure(
                    monitor,
                    format!("Check timed out after {}s", monitor.timeout_seconds),
                )
            }
        }
    }

    async fn probe(&self, monitor: &Monitor, target: &ProbeTarget) -> CheckResult {
        let certificate_gated = monitor.monitor_type.supports_certificate_check()
            && monitor.config.ssl_monitoring_enabled();

        let result = match target {
            ProbeTarget::Url(url) => http::probe(&self.client, monitor, url).await,
            ProbeTarget::Endpoint { host, port }
                if monitor.monitor_type == MonitorType::Ssl && certificate_gated =>
            {
                return self.certificate_probe(monitor, host, *port).await;
            }
            ProbeTarget::Endpoint { host, port } => tcp::probe(monitor, host, *port).await,
            ProbeTarget::Host(host) => ping::probe(monitor, host).await,
        };

        if !certificate_gated || result.outcome == CheckOutcome::Failure {
            return result;
        }
        match target.tls_endpoint() {
            Some((host, port)) => self.grade_certificate(result, monitor, host, port).await,
            None => result,
        }
    }

    async fn certificate_probe(&self, monitor: &Monitor, host: &str, port: u16) -> CheckResult {
        let Some(inspector) = &self.certificates else {
            return CheckResult::failure(monitor, "Certificate inspection is unavailable");
        };
        let (status, latency_ms) = inspector
            .inspect(host, port, monitor.config.certificate_expiry_days())
            .await;
        status.apply_to(CheckResult::new(monitor, CheckOutcome::Success).with_latency(latency_ms))
    }

    async fn grade_certificate(
        &self,
        result: CheckResult,
        monitor: &Monitor,
        host: &str,
        port: u16,
    ) -> CheckResult {
        let Some(inspector) = &self.certificates else {
            return CertificateStatus::Invalid {
                reason: "Certificate inspection is unavailable".to_string(),
            }
            .apply_to(result);
        };
        let (status, _) = inspector
            .inspect(host, port, monitor.config.certificate_expiry_days())
            .await;
        status.apply_to(result)
    }
}

#[async_trait]
impl CheckRunner for CheckExecutor {
    async fn run(&self, monitor: &Monitor) -> CheckResult {
        self.execute(monitor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::monitor;
    use tokio::net::TcpListener;

    fn executor() -> CheckExecutor {
        CheckExecutor::new(None).unwrap()
    }

    #[tokio::test]
    async fn invalid_target_is_a_failure_result() {
        let monitor = monitor(MonitorType::Tcp, "no-port-here");
        let result = executor().execute(&monitor).await;

        assert_eq!(result.outcome, CheckOutcome::Failure);
        assert!(result.error.unwrap().contains("Invalid target"));
    }

    #[tokio::test]
    async fn zero_timeout_is_a_failure_result() {
        let mut monitor = monitor(MonitorType::Tcp, "127.0.0.1:80");
        monitor.timeout_seconds = 0;
        let result = executor().execute(&monitor).await;
        assert_eq!(result.outcome, CheckOutcome::Failure);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepts the connection but never answers the HTTP request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut monitor = monitor(MonitorType::Http, &format!("http://{addr}/"));
        monitor.timeout_seconds = 1;
        let result = executor().execute(&monitor).await;

        assert_eq!(result.outcome, CheckOutcome::Failure);
        let error = result.error.unwrap();
        assert!(
            error == "Check timed out after 1s" || error == "Request timed out",
            "unexpected error: {error}"
        );
    }

    #[tokio::test]
    async fn ssl_monitor_without_certificate_checks_is_a_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut monitor = monitor(MonitorType::Ssl, &format!("127.0.0.1:{port}"));
        monitor.config.ssl_monitoring = Some(false);
        let result = executor().execute(&monitor).await;

        assert_eq!(result.outcome, CheckOutcome::Success);
        assert_eq!(result.certificate_expires_in_days, None);
    }

    #[tokio::test]
    async fn certificate_gated_check_fails_without_an_inspector() {
        let monitor = monitor(MonitorType::Ssl, "127.0.0.1:443");
        let result = executor().execute(&monitor).await;

        assert_eq!(result.outcome, CheckOutcome::Failure);
        assert_eq!(result.error.as_deref(), Some("Certificate inspection is unavailable"));
    }
}
