//! Notification delivery.
//!
//! The engine hands computed messages to a [`Dispatcher`], which pushes
//! them through a [`Messenger`] to the chat front end. A recipient that has
//! blocked delivery is classified distinctly: the operator gets one note,
//! an audit event is recorded, and nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::monitor::evaluate::OutboundMessage;
use crate::monitor::state::{RecipientId, TargetItem};
use crate::store::TargetStore;

/// Default recipient id for the operator/admin channel.
pub const DEFAULT_OPERATOR: RecipientId = 0;

/// Delivery failure classification. `Blocked` is terminal for the message
/// batch and is never retried.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("recipient has blocked delivery")]
    Blocked,
    #[error("delivery failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, recipient: RecipientId, text: &str) -> Result<(), SendError>;
}

/// Messenger that only logs. Used when no delivery channel is configured.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(&self, recipient: RecipientId, text: &str) -> Result<(), SendError> {
        info!(recipient, text, "Notification");
        Ok(())
    }
}

/// Configuration for the webhook bridge to the chat front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// The URL to POST message payloads to.
    pub url: String,

    #[serde(default = "default_notifier_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_notifier_retries")]
    pub max_retries: u32,

    /// Optional HMAC-SHA256 signing secret for `X-Watch-Signature-256`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_notifier_timeout_ms() -> u64 {
    5000
}

fn default_notifier_retries() -> u32 {
    2
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    recipient_id: RecipientId,
    text: &'a str,
}

/// Delivers messages over HTTP to the front-end bridge. 403 classifies as
/// blocked; other 4xx fail fast; 5xx, 429, and network errors are retried
/// with exponential backoff.
pub struct WebhookMessenger {
    client: Client,
    config: NotifierConfig,
}

impl WebhookMessenger {
    pub fn new(client: Client, config: NotifierConfig) -> Self {
        Self { client, config }
    }

    pub fn with_default_client(config: NotifierConfig) -> Self {
        Self::new(Client::new(), config)
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    async fn send(&self, recipient: RecipientId, text: &str) -> Result<(), SendError> {
        let body = serde_json::to_vec(&MessagePayload {
            recipient_id: recipient,
            text,
        })
        .map_err(|e| SendError::Failed(e.to_string()))?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let mut req = self
                .client
                .post(&self.config.url)
                .header(CONTENT_TYPE, "application/json")
                .timeout(timeout)
                .body(body.clone());

            if let Some(ref secret) = self.config.secret {
                let signature = sign_payload(&body, secret);
                req = req.header("X-Watch-Signature-256", format!("sha256={signature}"));
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if resp.status() == StatusCode::FORBIDDEN => {
                    return Err(SendError::Blocked);
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {} from {}", status, self.config.url);
                    if status.is_client_error() && status.as_u16() != 429 {
                        return Err(SendError::Failed(last_error));
                    }
                }
                Err(e) => {
                    last_error = format!("request to {} failed: {}", self.config.url, e);
                }
            }
        }

        Err(SendError::Failed(last_error))
    }
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Delivers one target's messages in evaluator order and applies the
/// blocked/failed policy.
pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    store: Arc<dyn TargetStore>,
    operator: RecipientId,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        store: Arc<dyn TargetStore>,
        operator: RecipientId,
    ) -> Self {
        Self {
            messenger,
            store,
            operator,
        }
    }

    /// Deliver messages in order. A blocked recipient aborts the remaining
    /// messages for this target; any other failure is audited and delivery
    /// continues with the next message.
    pub async fn deliver(&self, target: &TargetItem, messages: &[OutboundMessage]) {
        for msg in messages {
            if !self.send_with_policy(target, &msg.text).await {
                return;
            }
        }
    }

    /// Deliver a single free-form text (status reports, diagnostics).
    pub async fn send_one(&self, target: &TargetItem, text: &str) {
        self.send_with_policy(target, text).await;
    }

    async fn send_with_policy(&self, target: &TargetItem, text: &str) -> bool {
        match self.messenger.send(target.recipient, text).await {
            Ok(()) => {
                debug!(url = %target.url, recipient = target.recipient, "Notification delivered");
                true
            }
            Err(SendError::Blocked) => {
                self.handle_blocked(target).await;
                false
            }
            Err(SendError::Failed(reason)) => {
                warn!(
                    url = %target.url,
                    recipient = target.recipient,
                    %reason,
                    "Notification delivery failed"
                );
                self.audit(&target.url, &format!("Delivery failed: {reason}"))
                    .await;
                true
            }
        }
    }

    async fn handle_blocked(&self, target: &TargetItem) {
        warn!(
            url = %target.url,
            recipient = target.recipient,
            "Recipient has blocked delivery"
        );
        self.audit(
            &target.url,
            &format!("Recipient {} blocked delivery", target.recipient),
        )
        .await;

        let note = format!(
            "Recipient {} has blocked notifications. Site: {}",
            target.recipient, target.url
        );
        if let Err(e) = self.messenger.send(self.operator, &note).await {
            warn!(error = %e, "Failed to notify operator about blocked recipient");
        }
    }

    async fn audit(&self, url: &str, message: &str) {
        if let Err(e) = self.store.append_event(url, message).await {
            warn!(url, error = %e, "Failed to record audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::sync::Mutex;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier_config(url: String) -> NotifierConfig {
        NotifierConfig {
            url,
            timeout_ms: 2000,
            max_retries: 1,
            secret: None,
        }
    }

    #[tokio::test]
    async fn webhook_delivers_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let messenger = WebhookMessenger::new(
            Client::new(),
            notifier_config(format!("{}/notify", server.uri())),
        );
        assert!(messenger.send(42, "hello").await.is_ok());
    }

    #[tokio::test]
    async fn webhook_classifies_403_as_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let messenger =
            WebhookMessenger::new(Client::new(), notifier_config(server.uri()));
        let err = messenger.send(42, "hello").await.unwrap_err();
        assert!(matches!(err, SendError::Blocked));
    }

    #[tokio::test]
    async fn webhook_fails_fast_on_other_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let messenger =
            WebhookMessenger::new(Client::new(), notifier_config(server.uri()));
        let err = messenger.send(42, "hello").await.unwrap_err();
        assert!(matches!(err, SendError::Failed(_)));
    }

    #[tokio::test]
    async fn webhook_retries_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let messenger =
            WebhookMessenger::new(Client::new(), notifier_config(server.uri()));
        assert!(messenger.send(42, "hello").await.is_ok());
    }

    #[tokio::test]
    async fn webhook_signs_payload_when_secret_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("X-Watch-Signature-256"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = notifier_config(server.uri());
        config.secret = Some("my-key".into());
        let messenger = WebhookMessenger::new(Client::new(), config);
        assert!(messenger.send(42, "hello").await.is_ok());
    }

    #[test]
    fn hmac_signature_is_deterministic() {
        let body = b"test payload";
        let sig1 = sign_payload(body, "my-secret");
        let sig2 = sign_payload(body, "my-secret");
        assert_eq!(sig1, sig2);
        assert_ne!(sig1, sign_payload(body, "other-secret"));
    }

    /// Messenger that records sends and can reject one recipient.
    struct StubMessenger {
        sent: Mutex<Vec<(RecipientId, String)>>,
        blocked: Option<RecipientId>,
    }

    impl StubMessenger {
        fn new(blocked: Option<RecipientId>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                blocked,
            }
        }
    }

    #[async_trait]
    impl Messenger for StubMessenger {
        async fn send(&self, recipient: RecipientId, text: &str) -> Result<(), SendError> {
            if self.blocked == Some(recipient) {
                return Err(SendError::Blocked);
            }
            self.sent.lock().await.push((recipient, text.to_string()));
            Ok(())
        }
    }

    fn target(recipient: RecipientId) -> TargetItem {
        TargetItem {
            recipient,
            url: "https://example.com".to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_order() {
        let messenger = Arc::new(StubMessenger::new(None));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(messenger.clone(), store, DEFAULT_OPERATOR);

        dispatcher
            .deliver(
                &target(7),
                &[
                    OutboundMessage::recovery("first"),
                    OutboundMessage::issue("second"),
                ],
            )
            .await;

        let sent = messenger.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], (7, "first".to_string()));
        assert_eq!(sent[1], (7, "second".to_string()));
    }

    #[tokio::test]
    async fn blocked_recipient_stops_batch_and_notifies_operator() {
        let messenger = Arc::new(StubMessenger::new(Some(7)));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(messenger.clone(), store.clone(), 99);

        dispatcher
            .deliver(
                &target(7),
                &[
                    OutboundMessage::issue("first"),
                    OutboundMessage::issue("never delivered"),
                ],
            )
            .await;

        let sent = messenger.sent.lock().await;
        // Only the operator note got through.
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 99);
        assert!(sent[0].1.contains("blocked notifications"));
        assert!(sent[0].1.contains("https://example.com"));

        let events = store
            .recent_events(chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("blocked delivery"));
    }
}
