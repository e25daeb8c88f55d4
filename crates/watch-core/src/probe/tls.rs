use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::prelude::*;

use super::UNKNOWN_DAYS;

/// Whole days until the leaf certificate served on `<host>:443` expires.
/// Any connect, handshake, or parse failure degrades to [`UNKNOWN_DAYS`].
pub async fn certificate_days(host: &str, limit: Duration) -> i64 {
    match timeout(limit, leaf_expiry(host)).await {
        Ok(Ok(not_after)) => days_until(not_after, Utc::now().timestamp()),
        Ok(Err(e)) => {
            debug!(host, error = %e, "Certificate probe failed");
            UNKNOWN_DAYS
        }
        Err(_) => {
            debug!(host, "Certificate probe timed out");
            UNKNOWN_DAYS
        }
    }
}

async fn leaf_expiry(host: &str) -> Result<i64, String> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| format!("invalid server name: {host}"))?;

    let stream = TcpStream::connect((host, 443))
        .await
        .map_err(|e| format!("connect: {e}"))?;
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| format!("handshake: {e}"))?;

    let (_, conn) = tls.get_ref();
    let leaf = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| "no peer certificate".to_string())?;

    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| format!("certificate parse: {e:?}"))?;

    Ok(cert.validity().not_after.timestamp())
}

fn days_until(expiry_ts: i64, now_ts: i64) -> i64 {
    (expiry_ts - now_ts).div_euclid(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_until_whole_days() {
        let now = 1_700_000_000;
        assert_eq!(days_until(now + 10 * 86_400, now), 10);
        assert_eq!(days_until(now + 10 * 86_400 + 3_600, now), 10);
        assert_eq!(days_until(now, now), 0);
    }

    #[test]
    fn days_until_floors_past_expiry() {
        let now = 1_700_000_000;
        assert_eq!(days_until(now - 1, now), -1);
        assert_eq!(days_until(now - 2 * 86_400, now), -2);
    }

    #[tokio::test]
    async fn unknown_when_no_listener() {
        // Nothing answers TLS here, so the probe must degrade, not error.
        let days = certificate_days("127.0.0.1", Duration::from_millis(500)).await;
        assert_eq!(days, UNKNOWN_DAYS);
    }
}
