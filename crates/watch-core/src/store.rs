//! Store contract for registrations, notification state, and the audit
//! trail. The engine only talks to [`TargetStore`]; [`MemoryStore`] backs
//! tests and the standalone binary. Updates are keyed per target so
//! concurrent per-target writes never contend on a global lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::monitor::state::{
    AlertState, IssueKind, NotificationState, RecipientId, StoredEvent, TargetItem, TargetStatus,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All distinct (recipient, url) registrations.
    async fn list_targets(&self) -> Result<Vec<TargetItem>, StoreError>;

    /// Register a target. Returns false if the (recipient, url) pair
    /// already exists.
    async fn add_target(&self, target: TargetItem) -> Result<bool, StoreError>;

    /// Remove a registration. Returns false if it did not exist.
    async fn remove_target(&self, recipient: RecipientId, url: &str) -> Result<bool, StoreError>;

    /// Registrations joined with their last persisted status.
    async fn target_statuses(&self) -> Result<Vec<TargetStatus>, StoreError>;

    /// Notification memory for one URL. Absent record means all closed.
    async fn notification_state(&self, url: &str) -> Result<NotificationState, StoreError>;

    /// Update the alert state of one issue kind, leaving the others as-is.
    async fn set_alert_state(
        &self,
        url: &str,
        kind: IssueKind,
        state: AlertState,
    ) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        url: &str,
        status: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Append one line to the audit trail.
    async fn append_event(&self, url: &str, message: &str) -> Result<(), StoreError>;

    /// Audit lines newer than `since`, newest first.
    async fn recent_events(&self, since: DateTime<Utc>) -> Result<Vec<StoredEvent>, StoreError>;
}

#[derive(Debug, Clone, Default)]
struct UrlRecord {
    status: Option<String>,
    checked_at: Option<DateTime<Utc>>,
    state: NotificationState,
}

/// In-memory store. Registrations are keyed by (recipient, url); check
/// results and notification state are keyed by url, shared between
/// recipients watching the same site.
#[derive(Default)]
pub struct MemoryStore {
    targets: DashMap<(RecipientId, String), TargetItem>,
    records: DashMap<String, UrlRecord>,
    events: RwLock<Vec<StoredEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn list_targets(&self) -> Result<Vec<TargetItem>, StoreError> {
        let mut targets: Vec<TargetItem> =
            self.targets.iter().map(|e| e.value().clone()).collect();
        targets.sort_by(|a, b| (a.recipient, &a.url).cmp(&(b.recipient, &b.url)));
        Ok(targets)
    }

    async fn add_target(&self, target: TargetItem) -> Result<bool, StoreError> {
        let key = (target.recipient, target.url.clone());
        if self.targets.contains_key(&key) {
            return Ok(false);
        }
        self.records.entry(target.url.clone()).or_default();
        self.targets.insert(key, target);
        Ok(true)
    }

    async fn remove_target(&self, recipient: RecipientId, url: &str) -> Result<bool, StoreError> {
        let removed = self
            .targets
            .remove(&(recipient, url.to_string()))
            .is_some();
        if removed {
            let still_watched = self.targets.iter().any(|e| e.value().url == url);
            if !still_watched {
                self.records.remove(url);
            }
        }
        Ok(removed)
    }

    async fn target_statuses(&self) -> Result<Vec<TargetStatus>, StoreError> {
        let mut statuses: Vec<TargetStatus> = self
            .targets
            .iter()
            .map(|e| {
                let t = e.value();
                let record = self.records.get(&t.url).map(|r| r.value().clone());
                TargetStatus {
                    recipient: t.recipient,
                    url: t.url.clone(),
                    display_name: t.display_name.clone(),
                    last_status: record.as_ref().and_then(|r| r.status.clone()),
                    last_checked: record.as_ref().and_then(|r| r.checked_at),
                }
            })
            .collect();
        statuses.sort_by(|a, b| (a.recipient, &a.url).cmp(&(b.recipient, &b.url)));
        Ok(statuses)
    }

    async fn notification_state(&self, url: &str) -> Result<NotificationState, StoreError> {
        Ok(self
            .records
            .get(url)
            .map(|r| r.state)
            .unwrap_or_default())
    }

    async fn set_alert_state(
        &self,
        url: &str,
        kind: IssueKind,
        state: AlertState,
    ) -> Result<(), StoreError> {
        self.records
            .entry(url.to_string())
            .or_default()
            .state
            .set(kind, state);
        Ok(())
    }

    async fn update_status(
        &self,
        url: &str,
        status: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self.records.entry(url.to_string()).or_default();
        record.status = Some(status.to_string());
        record.checked_at = Some(checked_at);
        Ok(())
    }

    async fn append_event(&self, url: &str, message: &str) -> Result<(), StoreError> {
        self.events.write().await.push(StoredEvent {
            timestamp: Utc::now(),
            url: url.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn recent_events(&self, since: DateTime<Utc>) -> Result<Vec<StoredEvent>, StoreError> {
        let events = self.events.read().await;
        // Append-only, so reverse insertion order is newest first.
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.timestamp > since)
            .cloned()
            .collect())
    }
}
