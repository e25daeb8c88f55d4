pub mod engine;
pub mod evaluate;
pub mod state;

pub use engine::{Checker, CycleOutcome, TargetError};
pub use evaluate::{composite_status, evaluate, Evaluation, MessageKind, OutboundMessage, Policy};
pub use state::{
    AlertState, EngineState, IssueKind, NotificationState, RecipientId, StoredEvent, TargetItem,
    TargetStatus,
};
