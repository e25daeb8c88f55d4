use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Method};
use tracing::debug;

use crate::config::WatchConfig;

/// Responses with a status below this ceiling count as reachable. 2xx and
/// 3xx are obviously up; 4xx below 404 (401, 403, ...) also count so that
/// auth-walled pages are not reported as outages.
pub const REACHABLE_STATUS_CEILING: u16 = 404;

/// Reachability probe: HEAD with a GET fallback, retried with a linearly
/// increasing backoff. Never returns an error; exhausted retries mean the
/// target is unreachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration, retries: u32, backoff: Duration, user_agent: &str) -> Self {
        let client = Self::build_client(timeout, user_agent);
        Self {
            client,
            retries: retries.max(1),
            backoff,
        }
    }

    pub fn with_client(client: Client, retries: u32, backoff: Duration) -> Self {
        Self {
            client,
            retries: retries.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(
            config.http_timeout,
            config.http_retries,
            config.retry_backoff,
            &config.user_agent,
        )
    }

    pub fn build_client(timeout: Duration, user_agent: &str) -> Client {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(user_agent)
            .default_headers(headers)
            // Reachability is judged independently of certificate validity;
            // the certificate probe owns expiry detection.
            .danger_accept_invalid_certs(true)
            .build()
            .expect("Failed to build HTTP client")
    }

    /// Probe one URL. Each attempt tries HEAD first and falls back to a full
    /// GET when HEAD is inconclusive.
    pub async fn check(&self, url: &str) -> bool {
        for attempt in 1..=self.retries {
            if attempt > 1 {
                let backoff = self.backoff * (attempt - 1);
                debug!(url, attempt, backoff_ms = backoff.as_millis(), "Retrying reachability check");
                tokio::time::sleep(backoff).await;
            }

            for method in [Method::HEAD, Method::GET] {
                let is_head = method == Method::HEAD;
                match self.client.request(method, url).send().await {
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        debug!(url, status, attempt, "Reachability response");
                        if (200..REACHABLE_STATUS_CEILING).contains(&status) {
                            return true;
                        }
                        if is_head {
                            // Servers that reject HEAD still get a full GET.
                            continue;
                        }
                        break;
                    }
                    Err(e) => {
                        debug!(url, attempt, error = %e, "Reachability request error");
                        break;
                    }
                }
            }
        }

        false
    }
}
