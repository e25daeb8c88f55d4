//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//!
//! [defaults]
//! check_interval_secs = 300
//! expiry_warn_days = 14
//!
//! [notifier]
//! url = "https://bridge.example.com/messages"
//! secret = "signing-key"
//! operator_id = 10443
//!
//! [[target]]
//! recipient_id = 42
//! url = "example.com"
//! name = "company site"
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use watch_core::{normalize_url, NotifierConfig, RecipientId, TargetItem, WatchConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub notifier: Option<NotifierDef>,

    #[serde(default, rename = "target")]
    pub targets: Vec<TargetDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_format: default_log_format(),
        }
    }
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub check_interval_secs: Option<u64>,

    #[serde(default)]
    pub expiry_warn_days: Option<i64>,

    #[serde(default)]
    pub realert_interval_hours: Option<u64>,

    #[serde(default)]
    pub http_timeout_secs: Option<u64>,

    #[serde(default)]
    pub http_retries: Option<u32>,

    #[serde(default)]
    pub retry_backoff_secs: Option<u64>,

    #[serde(default)]
    pub tls_timeout_secs: Option<u64>,

    #[serde(default)]
    pub whois_timeout_secs: Option<u64>,

    #[serde(default)]
    pub max_concurrent_checks: Option<usize>,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl DefaultsConfig {
    pub fn to_watch_config(&self) -> WatchConfig {
        let mut c = WatchConfig::default();
        if let Some(v) = self.check_interval_secs {
            c = c.with_check_interval(v);
        }
        if let Some(v) = self.expiry_warn_days {
            c = c.with_expiry_warn_days(v);
        }
        if let Some(v) = self.realert_interval_hours {
            c = c.with_realert_interval(v);
        }
        if let Some(v) = self.http_timeout_secs {
            c = c.with_http_timeout(v);
        }
        if let Some(v) = self.http_retries {
            c = c.with_http_retries(v);
        }
        if let Some(v) = self.retry_backoff_secs {
            c = c.with_retry_backoff(std::time::Duration::from_secs(v));
        }
        if let Some(v) = self.tls_timeout_secs {
            c = c.with_tls_timeout(v);
        }
        if let Some(v) = self.whois_timeout_secs {
            c = c.with_whois_timeout(v);
        }
        if let Some(v) = self.max_concurrent_checks {
            c = c.with_max_concurrent_checks(v);
        }
        if let Some(ref v) = self.user_agent {
            c = c.with_user_agent(v.clone());
        }
        c
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierDef {
    pub url: String,

    #[serde(default = "default_notifier_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_notifier_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub operator_id: RecipientId,
}

fn default_notifier_timeout_ms() -> u64 {
    5000
}

fn default_notifier_retries() -> u32 {
    2
}

impl NotifierDef {
    pub fn to_notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            url: self.url.clone(),
            timeout_ms: self.timeout_ms,
            max_retries: self.max_retries,
            secret: self.secret.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetDef {
    pub recipient_id: RecipientId,
    pub url: String,
    pub name: Option<String>,
}

impl TargetDef {
    pub fn to_target_item(&self) -> TargetItem {
        TargetItem {
            recipient: self.recipient_id,
            url: normalize_url(&self.url),
            display_name: self.name.clone(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(ref notifier) = self.notifier {
            url::Url::parse(&notifier.url)
                .map_err(|e| format!("Invalid notifier URL: {} ({})", notifier.url, e))?;
        }

        let mut seen = std::collections::HashSet::new();
        for (i, t) in self.targets.iter().enumerate() {
            let normalized = normalize_url(&t.url);
            let parsed = url::Url::parse(&normalized)
                .map_err(|e| format!("Invalid target URL at index {}: {} ({})", i, t.url, e))?;
            if parsed.host_str().is_none() {
                return Err(format!("Invalid target URL at index {}: {}", i, t.url));
            }
            if !seen.insert((t.recipient_id, normalized.clone())) {
                return Err(format!(
                    "Duplicate target for recipient {}: {}",
                    t.recipient_id, normalized
                ));
            }
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[[target]]
recipient_id = 42
url = "example.com"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].recipient_id, 42);
        assert_eq!(config.targets[0].to_target_item().url, "https://example.com");
        assert_eq!(config.server.log_format, "pretty");
        assert!(config.notifier.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[server]
listen = "127.0.0.1:9090"
log_format = "json"

[defaults]
check_interval_secs = 60
expiry_warn_days = 7
realert_interval_hours = 12
max_concurrent_checks = 4

[notifier]
url = "https://bridge.example.com/messages"
secret = "signing-key"
operator_id = 10443

[[target]]
recipient_id = 42
url = "www.example.com"
name = "company site"

[[target]]
recipient_id = 42
url = "other.example"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen.port(), 9090);
        assert_eq!(config.server.log_format, "json");

        let watch = config.defaults.to_watch_config();
        assert_eq!(watch.check_interval.as_secs(), 60);
        assert_eq!(watch.expiry_warn_days, 7);
        assert_eq!(watch.realert_interval.as_secs(), 12 * 3600);
        assert_eq!(watch.max_concurrent_checks, 4);

        let notifier = config.notifier.as_ref().unwrap();
        assert_eq!(notifier.operator_id, 10443);
        assert_eq!(notifier.to_notifier_config().secret.as_deref(), Some("signing-key"));

        assert_eq!(config.targets.len(), 2);
        let first = config.targets[0].to_target_item();
        assert_eq!(first.url, "https://example.com");
        assert_eq!(first.display_name.as_deref(), Some("company site"));
    }

    #[test]
    fn validate_rejects_duplicate_targets_after_normalization() {
        let toml = r#"
[[target]]
recipient_id = 42
url = "example.com"

[[target]]
recipient_id = 42
url = "https://www.example.com/"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Duplicate target"), "{}", err);
    }

    #[test]
    fn same_url_for_two_recipients_is_allowed() {
        let toml = r#"
[[target]]
recipient_id = 1
url = "example.com"

[[target]]
recipient_id = 2
url = "example.com"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_invalid_notifier_url() {
        let toml = r#"
[notifier]
url = "::not-valid::"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid notifier URL"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let toml = r#"
[server]
log_format = "xml"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid log_format"), "{}", err);
    }
}
