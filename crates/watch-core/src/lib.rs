#![forbid(unsafe_code)]

pub mod config;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod store;

pub use config::WatchConfig;
pub use monitor::{
    composite_status, evaluate, AlertState, Checker, CycleOutcome, EngineState, Evaluation,
    IssueKind, MessageKind, NotificationState, OutboundMessage, Policy, RecipientId, StoredEvent,
    TargetError, TargetItem, TargetStatus,
};
pub use notify::{
    Dispatcher, LogMessenger, Messenger, NotifierConfig, SendError, WebhookMessenger,
    DEFAULT_OPERATOR,
};
pub use probe::{
    host_of, is_subdomain, normalize_url, DomainExpiry, HttpProbe, NetProber, ProbeReport, Prober,
    REACHABLE_STATUS_CEILING, SUBDOMAIN_EXEMPT, UNKNOWN_DAYS,
};
pub use store::{MemoryStore, StoreError, TargetStore};
