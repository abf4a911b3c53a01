use reqwest::{header, Client, Method, Url};
use std::time::Instant;
use tracing::debug;

use crate::db::enums::CheckOutcome;
use crate::db::models::{CheckConfig, CheckResult, Monitor};

/// Classifies a response. Explicit soft-fail codes win over the expected set so
/// that e.g. a 203 can be flagged inside the default 2xx range.
pub fn classify_http_status(config: &CheckConfig, status: u16, latency_ms: u64) -> CheckOutcome {
    if config.is_degraded_status(status) {
        return CheckOutcome::Degraded;
    }
    if !config.is_expected_status(status) {
        return CheckOutcome::Failure;
    }
    match config.degraded_latency_ms {
        Some(threshold) if latency_ms > threshold => CheckOutcome::Degraded,
        _ => CheckOutcome::Success,
    }
}

fn request_method(config: &CheckConfig) -> Result<Method, String> {
    let raw = config.method.as_deref().unwrap_or("GET").to_uppercase();
    Method::from_bytes(raw.as_bytes()).map_err(|e| format!("Unsupported HTTP method '{raw}': {e}"))
}

fn request_headers(config: &CheckConfig) -> Result<header::HeaderMap, String> {
    let mut header_map = header::HeaderMap::new();
    for (key, value) in &config.headers {
        let name = header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| format!("Invalid header name '{key}': {e}"))?;
        let value = header::HeaderValue::from_str(value)
            .map_err(|e| format!("Invalid header value for '{key}': {e}"))?;
        header_map.insert(name, value);
    }
    Ok(header_map)
}

pub(crate) async fn probe(client: &Client, monitor: &Monitor, url: &Url) -> CheckResult {
    let (method, headers) = match request_method(&monitor.config)
        .and_then(|m| request_headers(&monitor.config).map(|h| (m, h)))
    {
        Ok(parts) => parts,
        Err(e) => return CheckResult::failure(monitor, e),
    };

    let start_time = Instant::now();
    let response = client
        .request(method, url.clone())
        .headers(headers)
        .timeout(monitor.timeout())
        .send()
        .await;
    let latency_ms = start_time.elapsed().as_millis() as u64;

    match response {
        Ok(response) => {
            let status = response.status();
            let outcome = classify_http_status(&monitor.config, status.as_u16(), latency_ms);
            debug!(
                monitor_id = monitor.id,
                status = status.as_u16(),
                latency_ms,
                outcome = %outcome,
                "HTTP probe finished."
            );

            let result = CheckResult::new(monitor, outcome)
                .with_latency(latency_ms)
                .with_status_code(status.as_u16());
            match outcome {
                CheckOutcome::Failure => {
                    result.with_error(format!("Unexpected status code: {status}"))
                }
                CheckOutcome::Degraded if !monitor.config.is_degraded_status(status.as_u16()) => {
                    result.with_error(format!("Slow response: {latency_ms} ms"))
                }
                _ => result,
            }
        }
        Err(e) => {
            let detail = if e.is_timeout() {
                "Request timed out".to_string()
            } else if e.is_connect() {
                format!("Connection failed: {e}")
            } else {
                format!("Request failed: {e}")
            };
            CheckResult::failure(monitor, detail)
        }
    }
}
