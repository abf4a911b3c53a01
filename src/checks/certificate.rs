//! TLS certificate inspection for `https` and `ssl` monitors.
//!
//! The handshake itself accepts whatever chain the server presents so that an
//! expired or mismatched certificate can be reported with a useful reason
//! instead of a bare handshake error. The chain is then verified against the
//! trust roots at `now` and at later instants to find how long it stays valid.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{VerifierBuilderError, WebPkiServerVerifier};
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::db::enums::CheckOutcome;
use crate::db::models::CheckResult;

const SECONDS_PER_DAY: u64 = 86_400;
/// Upper bound for the expiry search; anything valid longer is reported as this.
const MAX_LOOKAHEAD_DAYS: i64 = 3650;

#[derive(Error, Debug)]
pub enum CertificateSetupError {
    #[error("Failed to build certificate verifier: {0}")]
    Verifier(#[from] VerifierBuilderError),
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    Valid { expires_in_days: i64 },
    ExpiringSoon { expires_in_days: i64 },
    Invalid { reason: String },
}

impl CertificateStatus {
    /// Folds the certificate verdict into a probe result; anything but a valid
    /// certificate turns the result into a failure.
    pub fn apply_to(self, mut result: CheckResult) -> CheckResult {
        match self {
            CertificateStatus::Valid { expires_in_days } => {
                result.certificate_expires_in_days = Some(expires_in_days);
                result
            }
            CertificateStatus::ExpiringSoon { expires_in_days } => {
                result.certificate_expires_in_days = Some(expires_in_days);
                result.outcome = CheckOutcome::Failure;
                result.with_error(format!("Certificate expires in {expires_in_days} days"))
            }
            CertificateStatus::Invalid { reason } => {
                result.outcome = CheckOutcome::Failure;
                result.with_error(reason)
            }
        }
    }
}

/// Lets every handshake complete; chain validation happens after the fact.
#[derive(Debug)]
struct DeferredVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for DeferredVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

pub struct CertificateInspector {
    connector: TlsConnector,
    verifier: Arc<WebPkiServerVerifier>,
}

impl CertificateInspector {
    pub fn with_native_roots() -> Result<Self, CertificateSetupError> {
        let loaded = rustls_native_certs::load_native_certs();
        for error in &loaded.errors {
            warn!(error = %error, "Failed to load a native root certificate.");
        }

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
        debug!(added, ignored, "Loaded native root certificates.");
        Self::with_roots(roots)
    }

    pub fn with_roots(roots: RootCertStore) -> Result<Self, CertificateSetupError> {
        let provider = Arc::new(ring::default_provider());
        let verifier =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone()).build()?;

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DeferredVerifier {
                inner: verifier.clone(),
            }))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            verifier,
        })
    }

    /// Connects to `host:port`, completes a handshake and grades the chain.
    /// Returns the verdict and the time the handshake took.
    pub async fn inspect(&self, host: &str, port: u16, warn_days: u32) -> (CertificateStatus, u64) {
        let start_time = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        let server_name = match ServerName::try_from(host.to_string()) {
            Ok(name) => name,
            Err(e) => {
                let reason = format!("Invalid server name '{host}': {e}");
                return (CertificateStatus::Invalid { reason }, elapsed(start_time));
            }
        };

        let tcp = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                let reason = format!("Connection failed: {e}");
                return (CertificateStatus::Invalid { reason }, elapsed(start_time));
            }
        };

        let tls = match self.connector.connect(server_name.clone(), tcp).await {
            Ok(stream) => stream,
            Err(e) => {
                let reason = format!("TLS handshake failed: {e}");
                return (CertificateStatus::Invalid { reason }, elapsed(start_time));
            }
        };
        let latency = elapsed(start_time);

        let chain = match tls.get_ref().1.peer_certificates() {
            Some(chain) if !chain.is_empty() => chain.to_vec(),
            _ => {
                let reason = "Server presented no certificate".to_string();
                return (CertificateStatus::Invalid { reason }, latency);
            }
        };

        let status = self.grade_chain(&chain, &server_name, SystemTime::now(), warn_days);
        debug!(host, port, status = ?status, "Certificate inspected.");
        (status, latency)
    }

    fn verify_at(
        &self,
        chain: &[CertificateDer<'static>],
        server_name: &ServerName<'_>,
        at: Duration,
    ) -> Result<(), rustls::Error> {
        let (end_entity, intermediates) = chain
            .split_first()
            .ok_or(rustls::Error::NoCertificatesPresented)?;
        self.verifier
            .verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                &[],
                UnixTime::since_unix_epoch(at),
            )
            .map(|_| ())
    }

    fn grade_chain(
        &self,
        chain: &[CertificateDer<'static>],
        server_name: &ServerName<'_>,
        now: SystemTime,
        warn_days: u32,
    ) -> CertificateStatus {
        let now = now.duration_since(UNIX_EPOCH).unwrap_or_default();

        if let Err(e) = self.verify_at(chain, server_name, now) {
            return CertificateStatus::Invalid {
                reason: format!("Certificate invalid: {e}"),
            };
        }

        let expires_in_days =
            last_valid_day(|days| self.verify_at(chain, server_name, now + days_to_duration(days)).is_ok());
        grade_expiry(expires_in_days, warn_days)
    }
}

fn days_to_duration(days: i64) -> Duration {
    Duration::from_secs(days.max(0) as u64 * SECONDS_PER_DAY)
}

/// Largest day offset for which `valid_after` still holds, given it holds at 0.
fn last_valid_day(valid_after: impl Fn(i64) -> bool) -> i64 {
    if valid_after(MAX_LOOKAHEAD_DAYS) {
        return MAX_LOOKAHEAD_DAYS;
    }
    let (mut lo, mut hi) = (0, MAX_LOOKAHEAD_DAYS);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if valid_after(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

fn grade_expiry(expires_in_days: i64, warn_days: u32) -> CertificateStatus {
    if expires_in_days < i64::from(warn_days) {
        CertificateStatus::ExpiringSoon { expires_in_days }
    } else {
        CertificateStatus::Valid { expires_in_days }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::MonitorType;
    use crate::test_support::monitor;
    use rustls::pki_types::pem::PemObject;
    use rustls::pki_types::PrivateKeyDer;
    use rustls::ServerConfig;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    const ROOT: &[u8] = include_bytes!("testdata/ca.pem");
    const SERVER_KEY: &[u8] = include_bytes!("testdata/server.key");
    /// Signed by ROOT, valid until 2074.
    const VALID_LEAF: &[u8] = include_bytes!("testdata/valid.pem");
    /// Signed by ROOT, expired on 2025-01-01.
    const EXPIRED_LEAF: &[u8] = include_bytes!("testdata/expired.pem");
    const SELF_SIGNED_LEAF: &[u8] = include_bytes!("testdata/self_signed.pem");
    const SELF_SIGNED_KEY: &[u8] = include_bytes!("testdata/self_signed.key");

    fn cert(pem: &[u8]) -> CertificateDer<'static> {
        CertificateDer::from_pem_slice(pem).unwrap()
    }

    fn inspector() -> CertificateInspector {
        let mut roots = RootCertStore::empty();
        roots.add(cert(ROOT)).unwrap();
        CertificateInspector::with_roots(roots).unwrap()
    }

    /// Accepts one TLS connection presenting `leaf` and returns the port.
    async fn serve_tls(leaf: &[u8], key: &[u8]) -> u16 {
        let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert(leaf)], PrivateKeyDer::from_pem_slice(key).unwrap())
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let _ = acceptor.accept(socket).await;
        });
        port
    }

    #[test]
    fn expiry_search_finds_the_boundary() {
        assert_eq!(last_valid_day(|d| d <= 42), 42);
        assert_eq!(last_valid_day(|d| d <= 0), 0);
        assert_eq!(last_valid_day(|_| true), MAX_LOOKAHEAD_DAYS);
    }

    #[test]
    fn expiry_inside_warning_window_is_flagged() {
        assert_eq!(grade_expiry(3, 14), CertificateStatus::ExpiringSoon { expires_in_days: 3 });
        assert_eq!(grade_expiry(90, 14), CertificateStatus::Valid { expires_in_days: 90 });
    }

    #[test]
    fn invalid_certificate_turns_success_into_failure() {
        let monitor = monitor(MonitorType::Https, "https://expired.example.com");
        let result = CheckResult::new(&monitor, CheckOutcome::Success).with_status_code(200);

        let graded = CertificateStatus::Invalid {
            reason: "Certificate invalid: certificate expired".to_string(),
        }
        .apply_to(result);

        assert_eq!(graded.outcome, CheckOutcome::Failure);
        assert!(graded.error.unwrap().contains("expired"));
        assert_eq!(graded.status_code, Some(200));
    }

    #[test]
    fn valid_certificate_records_days_left() {
        let monitor = monitor(MonitorType::Ssl, "example.com");
        let result = CheckResult::new(&monitor, CheckOutcome::Success);

        let graded = CertificateStatus::Valid { expires_in_days: 60 }.apply_to(result);
        assert_eq!(graded.outcome, CheckOutcome::Success);
        assert_eq!(graded.certificate_expires_in_days, Some(60));
    }

    #[tokio::test]
    async fn non_tls_server_fails_the_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });

        let (status, _) = inspector().inspect("127.0.0.1", port, 14).await;
        assert!(matches!(status, CertificateStatus::Invalid { .. }));
    }

    #[tokio::test]
    async fn trusted_certificate_is_valid() {
        let port = serve_tls(VALID_LEAF, SERVER_KEY).await;
        let (status, _) = inspector().inspect("127.0.0.1", port, 14).await;
        assert_eq!(
            status,
            CertificateStatus::Valid {
                expires_in_days: MAX_LOOKAHEAD_DAYS
            }
        );
    }

    #[tokio::test]
    async fn expired_certificate_is_reported_after_handshake() {
        let port = serve_tls(EXPIRED_LEAF, SERVER_KEY).await;
        let (status, _) = inspector().inspect("127.0.0.1", port, 14).await;
        match status {
            CertificateStatus::Invalid { reason } => {
                assert!(reason.to_lowercase().contains("expired"), "{reason}");
            }
            other => panic!("expected an invalid certificate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_issuer_is_invalid() {
        let port = serve_tls(SELF_SIGNED_LEAF, SELF_SIGNED_KEY).await;
        let (status, _) = inspector().inspect("127.0.0.1", port, 14).await;
        assert!(matches!(status, CertificateStatus::Invalid { .. }), "{status:?}");
    }

    #[test]
    fn chain_close_to_expiry_is_flagged() {
        let chain = vec![cert(EXPIRED_LEAF)];
        let name = ServerName::try_from("localhost").unwrap();
        // 2024-12-26T12:00:00Z, five and a half days before the leaf expires.
        let now = UNIX_EPOCH + Duration::from_secs(1_735_214_400);

        let inspector = inspector();
        assert_eq!(
            inspector.grade_chain(&chain, &name, now, 14),
            CertificateStatus::ExpiringSoon { expires_in_days: 5 }
        );
        assert_eq!(
            inspector.grade_chain(&chain, &name, now, 3),
            CertificateStatus::Valid { expires_in_days: 5 }
        );

        let wrong_name = ServerName::try_from("shop.example.com").unwrap();
        assert!(matches!(
            inspector.grade_chain(&chain, &wrong_name, now, 14),
            CertificateStatus::Invalid { .. }
        ));
    }
}
