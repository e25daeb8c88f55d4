//! Per-target health evaluation.
//!
//! Pure functions from (persisted notification state, fresh probe results)
//! to (state changes, outbound messages, audit events, status summary).
//! All debounce and re-alert policy lives here; the engine only commits
//! what this module decides.

use chrono::{DateTime, Duration, Utc};

use crate::config::WatchConfig;
use crate::monitor::state::{AlertState, IssueKind, NotificationState};
use crate::probe::ProbeReport;

/// Alerting policy knobs, extracted from [`WatchConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub warn_days: i64,
    pub realert_interval: Duration,
}

impl Policy {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            warn_days: config.expiry_warn_days,
            realert_interval: Duration::seconds(config.realert_interval.as_secs() as i64),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Issue,
    Recovery,
}

/// One user-facing message produced by an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl OutboundMessage {
    pub fn issue(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Issue,
            text: text.into(),
        }
    }

    pub fn recovery(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Recovery,
            text: text.into(),
        }
    }
}

/// Everything one evaluation decided: per-kind state changes to commit,
/// messages to deliver in order, audit-trail lines, and the composite
/// status to persist.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub changes: Vec<(IssueKind, AlertState)>,
    pub messages: Vec<OutboundMessage>,
    pub events: Vec<String>,
    pub status: String,
}

enum Transition {
    Raised,
    Cleared,
}

/// Open/close policy for the reachability kind. No re-alert cadence: the
/// issue fires once on the open transition and again only after a full
/// close/reopen cycle.
fn reachability_transition(alert: AlertState, reachable: bool) -> Option<Transition> {
    if !reachable && !alert.open {
        Some(Transition::Raised)
    } else if reachable && alert.open {
        Some(Transition::Cleared)
    } else {
        None
    }
}

/// Shared debounce policy for the two expiry kinds. The unknown (-1) and
/// sub-domain (-2) sentinels fall outside the warn window and therefore
/// never alert.
fn expiry_transition(
    alert: AlertState,
    days: i64,
    policy: &Policy,
    now: DateTime<Utc>,
) -> Option<Transition> {
    let expiring = (0..=policy.warn_days).contains(&days);

    if expiring {
        if !alert.open {
            return Some(Transition::Raised);
        }
        match alert.last_alert {
            None => Some(Transition::Raised),
            Some(ts) if now - ts >= policy.realert_interval => Some(Transition::Raised),
            Some(_) => None,
        }
    } else if alert.open {
        Some(Transition::Cleared)
    } else {
        None
    }
}

/// The composite status summary, rebuilt from raw probe outcomes every
/// cycle regardless of alerting state.
pub fn composite_status(report: &ProbeReport) -> String {
    format!(
        "{}, SSL {}d, Domain {}d",
        if report.reachable { "OK" } else { "DOWN" },
        report.cert_days,
        report.domain.days,
    )
}

/// Evaluate one target for one cycle.
///
/// Recovery messages are emitted individually, in kind order; newly raised
/// issues are combined into a single message headed by the target URL.
pub fn evaluate(
    url: &str,
    state: &NotificationState,
    report: &ProbeReport,
    policy: &Policy,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut eval = Evaluation {
        status: composite_status(report),
        ..Evaluation::default()
    };
    let mut issues: Vec<String> = Vec::new();

    match reachability_transition(state.reachability, report.reachable) {
        Some(Transition::Raised) => {
            issues.push("Site is unreachable".to_string());
            eval.events.push("Site unreachable".to_string());
            eval.changes.push((
                IssueKind::Reachability,
                AlertState {
                    open: true,
                    last_alert: None,
                },
            ));
        }
        Some(Transition::Cleared) => {
            eval.messages
                .push(OutboundMessage::recovery(format!("Site is back up: {url}")));
            eval.events.push("Site recovered".to_string());
            eval.changes
                .push((IssueKind::Reachability, AlertState::default()));
        }
        None => {}
    }

    match expiry_transition(state.certificate, report.cert_days, policy, now) {
        Some(Transition::Raised) => {
            issues.push(format!(
                "SSL certificate expires in {} days",
                report.cert_days
            ));
            eval.events.push(format!(
                "SSL certificate expires in {} days",
                report.cert_days
            ));
            eval.changes
                .push((IssueKind::CertificateExpiry, AlertState::opened_at(now)));
        }
        Some(Transition::Cleared) => {
            eval.messages.push(OutboundMessage::recovery(format!(
                "SSL certificate renewed for {url} ({} days left)",
                report.cert_days
            )));
            eval.events
                .push(format!("SSL renewed ({} days left)", report.cert_days));
            eval.changes
                .push((IssueKind::CertificateExpiry, AlertState::default()));
        }
        None => {}
    }

    match expiry_transition(state.domain, report.domain.days, policy, now) {
        Some(Transition::Raised) => {
            issues.push(format!(
                "Domain registration expires in {} days",
                report.domain.days
            ));
            eval.events.push(format!(
                "Domain registration expires in {} days",
                report.domain.days
            ));
            eval.changes
                .push((IssueKind::DomainExpiry, AlertState::opened_at(now)));
        }
        Some(Transition::Cleared) => {
            eval.messages.push(OutboundMessage::recovery(format!(
                "Domain renewed for {url} ({} days left)",
                report.domain.days
            )));
            eval.events
                .push(format!("Domain renewed ({} days left)", report.domain.days));
            eval.changes
                .push((IssueKind::DomainExpiry, AlertState::default()));
        }
        None => {}
    }

    if !issues.is_empty() {
        eval.messages
            .push(OutboundMessage::issue(format!("{url}\n{}", issues.join("\n"))));
    }

    eval
}
