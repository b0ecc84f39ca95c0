//! Scan orchestration: the state machine, its event queue and the worker
//! thread driving them.

pub mod engine;
pub mod events;
pub mod mailbox;
mod worker;

pub use engine::{Engine, ScanBackend};
pub use events::{discard_progress, ProgressSink, ScanProgress, SignalInfo};
pub use mailbox::{Batch, Mailbox};
pub use worker::{ScanHandle, ScanOutcome};
