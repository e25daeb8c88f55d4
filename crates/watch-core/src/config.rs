use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the site checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Interval between scheduled check cycles (default: 5 minutes).
    pub check_interval: Duration,
    /// Days-until-expiry at or below which certificate/domain alerts fire.
    pub expiry_warn_days: i64,
    /// Minimum time between repeat alerts for a still-open expiry issue.
    pub realert_interval: Duration,
    /// Total timeout for one reachability request.
    pub http_timeout: Duration,
    /// Number of reachability attempts before a target counts as down.
    pub http_retries: u32,
    /// Base backoff between reachability attempts (grows linearly per attempt).
    pub retry_backoff: Duration,
    /// Timeout for the TLS handshake when fetching the leaf certificate.
    pub tls_timeout: Duration,
    /// Timeout for the whole registration-data lookup pipeline.
    pub whois_timeout: Duration,
    /// Maximum number of targets checked concurrently within one cycle.
    pub max_concurrent_checks: usize,
    /// User-Agent sent with reachability requests.
    pub user_agent: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            expiry_warn_days: 14,
            realert_interval: Duration::from_secs(24 * 60 * 60),
            http_timeout: Duration::from_secs(12),
            http_retries: 3,
            retry_backoff: Duration::from_secs(5),
            tls_timeout: Duration::from_secs(5),
            whois_timeout: Duration::from_secs(10),
            max_concurrent_checks: 8,
            user_agent: default_user_agent(),
        }
    }
}

pub fn default_user_agent() -> String {
    concat!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) ",
        "AppleWebKit/537.36 (KHTML, like Gecko) ",
        "Chrome/113.0.0.0 Safari/537.36 ",
        "sitewatch/",
        env!("CARGO_PKG_VERSION"),
    )
    .to_string()
}

impl WatchConfig {
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        self.check_interval = Duration::from_secs(secs);
        self
    }

    pub fn with_expiry_warn_days(mut self, days: i64) -> Self {
        self.expiry_warn_days = days;
        self
    }

    pub fn with_realert_interval(mut self, hours: u64) -> Self {
        self.realert_interval = Duration::from_secs(hours * 60 * 60);
        self
    }

    pub fn with_http_timeout(mut self, secs: u64) -> Self {
        self.http_timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_http_retries(mut self, retries: u32) -> Self {
        self.http_retries = retries.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_tls_timeout(mut self, secs: u64) -> Self {
        self.tls_timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_whois_timeout(mut self, secs: u64) -> Self {
        self.whois_timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_max_concurrent_checks(mut self, max: usize) -> Self {
        self.max_concurrent_checks = max.max(1);
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }
}
