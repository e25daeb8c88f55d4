use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric identifier of a message recipient in the chat front end.
pub type RecipientId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Active,
    Stopping,
    Stopped,
}

impl EngineState {
    pub fn can_transition_to(self, target: EngineState) -> bool {
        matches!(
            (self, target),
            (EngineState::Idle, EngineState::Active)
                | (EngineState::Active, EngineState::Stopping)
                | (EngineState::Stopping, EngineState::Stopped)
                | (EngineState::Stopped, EngineState::Active)
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// One of the three monitored health dimensions of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Reachability,
    CertificateExpiry,
    DomainExpiry,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reachability => write!(f, "reachability"),
            Self::CertificateExpiry => write!(f, "certificate-expiry"),
            Self::DomainExpiry => write!(f, "domain-expiry"),
        }
    }
}

/// Per-kind alert memory: whether an alert is currently open and, for the
/// expiry kinds, when it was last sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    pub open: bool,
    pub last_alert: Option<DateTime<Utc>>,
}

impl AlertState {
    pub fn opened_at(now: DateTime<Utc>) -> Self {
        Self {
            open: true,
            last_alert: Some(now),
        }
    }
}

/// The full notification memory for one target. An absent store record
/// deserializes to the default: everything closed, no timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub reachability: AlertState,
    pub certificate: AlertState,
    pub domain: AlertState,
}

impl NotificationState {
    pub fn get(&self, kind: IssueKind) -> AlertState {
        match kind {
            IssueKind::Reachability => self.reachability,
            IssueKind::CertificateExpiry => self.certificate,
            IssueKind::DomainExpiry => self.domain,
        }
    }

    pub fn set(&mut self, kind: IssueKind, state: AlertState) {
        match kind {
            IssueKind::Reachability => self.reachability = state,
            IssueKind::CertificateExpiry => self.certificate = state,
            IssueKind::DomainExpiry => self.domain = state,
        }
    }

    pub fn open_kinds(&self) -> Vec<IssueKind> {
        [
            IssueKind::Reachability,
            IssueKind::CertificateExpiry,
            IssueKind::DomainExpiry,
        ]
        .into_iter()
        .filter(|k| self.get(*k).open)
        .collect()
    }
}

/// One monitoring registration: a recipient watching a normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetItem {
    pub recipient: RecipientId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A registration joined with its last persisted check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    pub recipient: RecipientId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub last_status: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

/// One line of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_state_transitions() {
        assert!(EngineState::Idle.can_transition_to(EngineState::Active));
        assert!(EngineState::Active.can_transition_to(EngineState::Stopping));
        assert!(EngineState::Stopping.can_transition_to(EngineState::Stopped));
        assert!(EngineState::Stopped.can_transition_to(EngineState::Active));
    }

    #[test]
    fn invalid_state_transitions() {
        assert!(!EngineState::Idle.can_transition_to(EngineState::Stopping));
        assert!(!EngineState::Idle.can_transition_to(EngineState::Stopped));
        assert!(!EngineState::Active.can_transition_to(EngineState::Idle));
        assert!(!EngineState::Active.can_transition_to(EngineState::Active));
        assert!(!EngineState::Stopped.can_transition_to(EngineState::Stopping));
        assert!(!EngineState::Stopping.can_transition_to(EngineState::Active));
    }

    #[test]
    fn default_notification_state_is_closed() {
        let state = NotificationState::default();
        assert!(!state.reachability.open);
        assert!(!state.certificate.open);
        assert!(!state.domain.open);
        assert_eq!(state.certificate.last_alert, None);
        assert!(state.open_kinds().is_empty());
    }

    #[test]
    fn get_set_round_trip_per_kind() {
        let mut state = NotificationState::default();
        let now = Utc::now();
        state.set(IssueKind::CertificateExpiry, AlertState::opened_at(now));

        assert!(state.get(IssueKind::CertificateExpiry).open);
        assert_eq!(state.get(IssueKind::CertificateExpiry).last_alert, Some(now));
        assert!(!state.get(IssueKind::Reachability).open);
        assert!(!state.get(IssueKind::DomainExpiry).open);
        assert_eq!(state.open_kinds(), vec![IssueKind::CertificateExpiry]);
    }

    #[test]
    fn issue_kind_display() {
        assert_eq!(format!("{}", IssueKind::Reachability), "reachability");
        assert_eq!(format!("{}", IssueKind::CertificateExpiry), "certificate-expiry");
        assert_eq!(format!("{}", IssueKind::DomainExpiry), "domain-expiry");
    }
}
