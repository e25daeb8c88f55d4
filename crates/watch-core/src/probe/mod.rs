mod http;
mod tls;
mod whois;

pub use http::{HttpProbe, REACHABLE_STATUS_CEILING};
pub use whois::is_subdomain;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::WatchConfig;

/// Sentinel for an expiry check whose result could not be determined.
pub const UNKNOWN_DAYS: i64 = -1;

/// Sentinel for a domain check that does not apply because the target is a
/// sub-domain rather than an apex domain.
pub const SUBDOMAIN_EXEMPT: i64 = -2;

/// Result of the domain-registration check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainExpiry {
    pub days: i64,
    pub registrar: Option<String>,
    pub registrar_url: Option<String>,
}

impl DomainExpiry {
    pub fn unknown() -> Self {
        Self {
            days: UNKNOWN_DAYS,
            ..Self::default()
        }
    }

    pub fn exempt() -> Self {
        Self {
            days: SUBDOMAIN_EXEMPT,
            ..Self::default()
        }
    }

    pub fn is_exempt(&self) -> bool {
        self.days == SUBDOMAIN_EXEMPT
    }
}

/// Fresh probe results for one target, one per check per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub reachable: bool,
    pub cert_days: i64,
    pub domain: DomainExpiry,
}

/// The three health checks. Each operation is bounded by its own timeout
/// and degrades any transport or parse failure to a sentinel value instead
/// of returning an error.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn reachability(&self, url: &str) -> bool;

    async fn certificate_days(&self, host: &str) -> i64;

    async fn domain_expiry(&self, host: &str) -> DomainExpiry;

    /// Run all three checks for one target concurrently.
    async fn probe_all(&self, url: &str) -> ProbeReport {
        let host = host_of(url);
        let (reachable, cert_days, domain) = tokio::join!(
            self.reachability(url),
            self.certificate_days(&host),
            self.domain_expiry(&host),
        );
        ProbeReport {
            reachable,
            cert_days,
            domain,
        }
    }
}

/// Network-backed prober used in production.
pub struct NetProber {
    http: HttpProbe,
    tls_timeout: Duration,
    whois_timeout: Duration,
}

impl NetProber {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            http: HttpProbe::from_config(config),
            tls_timeout: config.tls_timeout,
            whois_timeout: config.whois_timeout,
        }
    }

    /// Build on an existing HTTP client instead of constructing a new pool.
    pub fn with_client(client: reqwest::Client, config: &WatchConfig) -> Self {
        Self {
            http: HttpProbe::with_client(client, config.http_retries, config.retry_backoff),
            tls_timeout: config.tls_timeout,
            whois_timeout: config.whois_timeout,
        }
    }
}

#[async_trait]
impl Prober for NetProber {
    async fn reachability(&self, url: &str) -> bool {
        self.http.check(url).await
    }

    async fn certificate_days(&self, host: &str) -> i64 {
        tls::certificate_days(host, self.tls_timeout).await
    }

    async fn domain_expiry(&self, host: &str) -> DomainExpiry {
        whois::domain_expiry(host, self.whois_timeout).await
    }
}

/// Extract the bare hostname from a URL or host string: scheme and path are
/// dropped, the result is lowercased.
pub fn host_of(url: &str) -> String {
    let stripped = url
        .trim()
        .strip_prefix("https://")
        .or_else(|| url.trim().strip_prefix("http://"))
        .unwrap_or(url.trim());
    stripped
        .split('/')
        .next()
        .unwrap_or(stripped)
        .to_ascii_lowercase()
}

/// Collapse equivalent target inputs to one canonical form:
/// `https://<host>` with `www.` stripped and path/query dropped.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().to_ascii_lowercase();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed
    } else {
        format!("https://{trimmed}")
    };

    match url::Url::parse(&with_scheme) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => {
                let host = host.strip_prefix("www.").unwrap_or(host);
                format!("https://{host}")
            }
            None => with_scheme,
        },
        // Left as-is for the caller's validation to reject.
        Err(_) => with_scheme,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_strips_scheme_and_path() {
        assert_eq!(host_of("https://Example.com/path/page?q=1"), "example.com");
        assert_eq!(host_of("http://example.com"), "example.com");
        assert_eq!(host_of("example.com/path"), "example.com");
    }

    #[test]
    fn normalize_collapses_equivalent_inputs() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://www.example.com/about"), "https://example.com");
        assert_eq!(normalize_url("HTTPS://WWW.EXAMPLE.COM"), "https://example.com");
        assert_eq!(normalize_url("  example.com  "), "https://example.com");
    }

    #[test]
    fn normalize_keeps_subdomains() {
        assert_eq!(normalize_url("api.example.com"), "https://api.example.com");
    }

    #[test]
    fn sentinel_constructors() {
        assert_eq!(DomainExpiry::unknown().days, UNKNOWN_DAYS);
        assert!(DomainExpiry::exempt().is_exempt());
        assert_eq!(DomainExpiry::exempt().registrar, None);
    }
}
