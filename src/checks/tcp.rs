use std::time::Instant;
use tokio::net::TcpStream;

use crate::db::enums::CheckOutcome;
use crate::db::models::{CheckResult, Monitor};

/// Opens and drops a TCP connection. The caller bounds the wall-clock time.
pub(crate) async fn probe(monitor: &Monitor, host: &str, port: u16) -> CheckResult {
    let start_time = Instant::now();
    match TcpStream::connect((host, port)).await {
        Ok(_stream) => CheckResult::new(monitor, CheckOutcome::Success)
            .with_latency(start_time.elapsed().as_millis() as u64),
        Err(e) => CheckResult::failure(monitor, format!("Connection failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::MonitorType;
    use crate::test_support::monitor;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_is_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let monitor = monitor(MonitorType::Tcp, &format!("127.0.0.1:{port}"));

        let result = probe(&monitor, "127.0.0.1", port).await;
        assert_eq!(result.outcome, CheckOutcome::Success);
        assert!(result.latency_ms.is_some());
    }

    #[tokio::test]
    async fn closed_port_is_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let monitor = monitor(MonitorType::Tcp, &format!("127.0.0.1:{port}"));

        let result = probe(&monitor, "127.0.0.1", port).await;
        assert_eq!(result.outcome, CheckOutcome::Failure);
        assert!(result.error.unwrap().starts_with("Connection failed"));
    }
}
