//! Direct TLS certificate inspection, independent of the HTTP fetch.

use crate::error::ScanError;
use chrono::{DateTime, Utc};
use native_tls::{HandshakeError, TlsConnector};
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::debug;
use x509_parser::prelude::*;

pub const DEFAULT_CERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a certificate inspection
#[derive(Debug, Clone, PartialEq)]
pub enum CertStatus {
    /// Certificate verified and not yet expired
    Valid { not_after: DateTime<Utc> },
    /// Certificate presented but its `notAfter` is in the past
    Expired { not_after: DateTime<Utc> },
    /// Handshake or chain verification failed
    VerificationFailed(String),
    /// DNS failure or connect timeout
    Unreachable(String),
    /// Anything else, with the raw error message
    Other(String),
}

/// Classify a certificate by its expiry date
pub fn classify_expiry(not_after: DateTime<Utc>, now: DateTime<Utc>) -> CertStatus {
    if not_after < now {
        CertStatus::Expired { not_after }
    } else {
        CertStatus::Valid { not_after }
    }
}

/// Read `notAfter` from a DER-encoded certificate
pub fn not_after_from_der(der: &[u8]) -> Option<DateTime<Utc>> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
}

/// Time left before `deadline`, or `None` once the budget is spent
fn remaining_budget(deadline: Instant, now: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(now)
        .filter(|left| !left.is_zero())
}

#[derive(Debug, Clone)]
pub struct CertificateInspector {
    port: u16,
    timeout: Duration,
}

impl CertificateInspector {
    pub fn new() -> Self {
        Self {
            port: 443,
            timeout: DEFAULT_CERT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Handshake with `hostname` and report the certificate status.
    /// Never fails: every problem is folded into a `CertStatus` variant.
    pub async fn inspect(&self, hostname: &str) -> CertStatus {
        let host = hostname.to_string();
        let port = self.port;
        let timeout = self.timeout;

        let task = tokio::task::spawn_blocking(move || inspect_blocking(&host, port, timeout));

        // The blocking side has its own socket timeouts; this bounds DNS as well.
        match tokio::time::timeout(timeout + Duration::from_secs(1), task).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => CertStatus::Other(ScanError::from(e).to_string()),
            Err(_) => CertStatus::Unreachable(format!("timed out after {:?}", timeout)),
        }
    }
}

impl Default for CertificateInspector {
    fn default() -> Self {
        Self::new()
    }
}

fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, CertStatus> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| CertStatus::Unreachable(e.to_string()))?
        .next()
        .ok_or_else(|| CertStatus::Unreachable(format!("no address found for {}", host)))?;

    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => CertStatus::Unreachable(e.to_string()),
        _ => CertStatus::Other(e.to_string()),
    })?;
    stream.set_read_timeout(Some(timeout)).ok();
    stream.set_write_timeout(Some(timeout)).ok();
    Ok(stream)
}

fn inspect_blocking(host: &str, port: u16, timeout: Duration) -> CertStatus {
    debug!("Inspecting certificate for {}:{}", host, port);
    let deadline = Instant::now() + timeout;

    let stream = match connect(host, port, timeout) {
        Ok(stream) => stream,
        Err(status) => return status,
    };

    let connector = match TlsConnector::new() {
        Ok(connector) => connector,
        Err(e) => return CertStatus::Other(e.to_string()),
    };

    match connector.connect(host, stream) {
        Ok(tls) => match tls.peer_certificate() {
            Ok(Some(cert)) => match cert.to_der().ok().and_then(|der| not_after_from_der(&der)) {
                Some(not_after) => classify_expiry(not_after, Utc::now()),
                None => CertStatus::Other("could not parse the peer certificate".to_string()),
            },
            Ok(None) => CertStatus::Other("server presented no certificate".to_string()),
            Err(e) => CertStatus::Other(e.to_string()),
        },
        Err(HandshakeError::Failure(e)) => {
            // An expired certificate fails verification; look at it unverified
            // so the report can name the expiry date.
            match read_unverified(host, port, deadline) {
                Some(not_after) if not_after < Utc::now() => CertStatus::Expired { not_after },
                _ => CertStatus::VerificationFailed(e.to_string()),
            }
        }
        Err(HandshakeError::WouldBlock(_)) => {
            CertStatus::Unreachable("handshake did not complete".to_string())
        }
    }
}

/// Second handshake, limited to what is left of the inspection budget
fn read_unverified(host: &str, port: u16, deadline: Instant) -> Option<DateTime<Utc>> {
    let budget = remaining_budget(deadline, Instant::now())?;
    let stream = connect(host, port, budget).ok()?;
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .ok()?;
    let tls = connector.connect(host, stream).ok()?;
    let der = tls.peer_certificate().ok()??.to_der().ok()?;
    not_after_from_der(&der)
}
