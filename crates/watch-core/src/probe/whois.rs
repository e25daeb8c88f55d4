use std::sync::LazyLock;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{DomainExpiry, UNKNOWN_DAYS};

const IANA_WHOIS: &str = "whois.iana.org";

static EXPIRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:paid-till|expiry date|expiration date)[\s:]+([0-9T:\-\.Z]+)")
        .expect("valid expiry regex")
});
static REFERRAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)refer:\s*(\S+)").expect("valid referral regex"));
static REGISTRAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)registrar:\s*(.+)").expect("valid registrar regex"));
static CONTACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:admin-contact|registrar url):\s*(https?://\S+)")
        .expect("valid contact regex")
});

/// Date formats found in registry responses, tried in priority order.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y-%m-%dT%H:%M:%SZ", "%d-%b-%Y", "%Y.%m.%d"];

/// Registration data applies to apex domains only; anything with more than
/// two labels is a sub-domain.
pub fn is_subdomain(host: &str) -> bool {
    host.split('.').count() > 2
}

/// Days until the domain registration expires, plus registrar name and
/// contact URL where the registry publishes them. Sub-domains short-circuit
/// to the exempt sentinel without any network traffic; every failure path
/// degrades to [`DomainExpiry::unknown`].
pub async fn domain_expiry(host: &str, limit: Duration) -> DomainExpiry {
    if is_subdomain(host) {
        return DomainExpiry::exempt();
    }

    match timeout(limit, lookup(host)).await {
        Ok(Ok(expiry)) => expiry,
        Ok(Err(e)) => {
            debug!(host, error = %e, "Registration lookup failed");
            DomainExpiry::unknown()
        }
        Err(_) => {
            debug!(host, "Registration lookup timed out");
            DomainExpiry::unknown()
        }
    }
}

/// Query IANA for the authoritative registry, follow one referral hop, and
/// parse whichever response we end up with.
async fn lookup(host: &str) -> std::io::Result<DomainExpiry> {
    let iana = query(IANA_WHOIS, host).await?;
    let body = match REFERRAL_RE.captures(&iana).map(|c| c[1].trim().to_string()) {
        Some(server) => query(&server, host).await.unwrap_or(iana),
        None => iana,
    };
    Ok(parse_record(&body))
}

async fn query(server: &str, domain: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect((server, 43)).await?;
    stream.write_all(format!("{domain}\r\n").as_bytes()).await?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_record(text: &str) -> DomainExpiry {
    let days = EXPIRY_RE
        .captures(text)
        .and_then(|c| parse_expiry(c[1].trim()))
        .map(|expiry| (expiry - Utc::now().naive_utc()).num_days())
        .unwrap_or(UNKNOWN_DAYS);

    let registrar = REGISTRAR_RE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty());
    let registrar_url = CONTACT_RE.captures(text).map(|c| c[1].trim().to_string());

    DomainExpiry {
        days,
        registrar,
        registrar_url,
    }
}

fn parse_expiry(raw: &str) -> Option<NaiveDateTime> {
    for fmt in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    #[test]
    fn subdomain_detection() {
        assert!(is_subdomain("api.example.com"));
        assert!(is_subdomain("a.b.example.com"));
        assert!(!is_subdomain("example.com"));
        assert!(!is_subdomain("localhost"));
    }

    #[tokio::test]
    async fn subdomain_short_circuits_without_network() {
        // A zero timeout would fail any lookup that actually hit the wire.
        let result = domain_expiry("sub.example.com", Duration::from_millis(0)).await;
        assert!(result.is_exempt());
        assert_eq!(result.registrar, None);
        assert_eq!(result.registrar_url, None);
    }

    #[test]
    fn parse_expiry_priority_formats() {
        assert!(parse_expiry("2030-06-15").is_some());
        assert!(parse_expiry("2030-06-15T12:30:00Z").is_some());
        assert!(parse_expiry("2030.06.15").is_some());
        assert!(parse_expiry("garbage").is_none());
    }

    #[test]
    fn parse_record_extracts_registry_fields() {
        let future = Utc::now()
            .checked_add_days(Days::new(120))
            .unwrap()
            .format("%Y-%m-%d")
            .to_string();
        let text = format!(
            "domain:   EXAMPLE.COM\n\
             registrar: Example Registrar Inc.\n\
             registrar url: https://registrar.example\n\
             expiry date: {future}\n"
        );

        let parsed = parse_record(&text);
        assert!((118..=120).contains(&parsed.days));
        assert_eq!(parsed.registrar.as_deref(), Some("Example Registrar Inc."));
        assert_eq!(
            parsed.registrar_url.as_deref(),
            Some("https://registrar.example")
        );
    }

    #[test]
    fn parse_record_ru_style_paid_till() {
        let future = Utc::now()
            .checked_add_days(Days::new(30))
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let text = format!("paid-till: {future}\nregistrar: EXAMPLE-RU\n");

        let parsed = parse_record(&text);
        assert!((29..=30).contains(&parsed.days));
        assert_eq!(parsed.registrar.as_deref(), Some("EXAMPLE-RU"));
        assert_eq!(parsed.registrar_url, None);
    }

    #[test]
    fn parse_record_without_expiry_is_unknown() {
        let parsed = parse_record("domain: example.com\nstatus: ok\n");
        assert_eq!(parsed.days, UNKNOWN_DAYS);
    }
}
