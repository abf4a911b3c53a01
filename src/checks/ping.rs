use rand::random;
use std::net::IpAddr;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

use crate::db::enums::CheckOutcome;
use crate::db::models::{CheckResult, Monitor};

async fn resolve(host: &str) -> Result<IpAddr, String> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| format!("DNS resolution failed: {e}"))?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| "DNS resolution returned no addresses".to_string())
}

/// Sends a single ICMP echo. Needs raw-socket or ping-group privileges; a
/// socket error is reported as a failed check like any other.
pub(crate) async fn probe(monitor: &Monitor, host: &str) -> CheckResult {
    let addr = match resolve(host).await {
        Ok(addr) => addr,
        Err(e) => return CheckResult::failure(monitor, e),
    };

    let config = match addr {
        IpAddr::V4(_) => Config::default(),
        IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
    };
    let client = match Client::new(&config) {
        Ok(client) => client,
        Err(e) => return CheckResult::failure(monitor, format!("Failed to open ICMP socket: {e}")),
    };

    let mut pinger = client.pinger(addr, PingIdentifier(random())).await;
    pinger.timeout(monitor.timeout());
    match pinger.ping(PingSequence(0), &[]).await {
        Ok((_reply, rtt)) => {
            CheckResult::new(monitor, CheckOutcome::Success).with_latency(rtt.as_millis() as u64)
        }
        Err(e) => CheckResult::failure(monitor, format!("Ping failed: {e}")),
    }
}
