//! tvscan library - channel scanning for DVB, ISDB, ATSC and analog TV
//!
//! The scanner tunes every candidate frequency through a [`backend::Frontend`],
//! collects the SI tables of each locked transponder through a
//! [`backend::Demux`] and hands the collected data to a [`store::ScanStore`]
//! once the caller asks for it.

pub mod assembly;
pub mod backend;
pub mod channel_order;
pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod result;
pub mod scanner;
pub mod sequencer;
pub mod store;
pub mod table_control;
pub mod ts_analyzer;

// Re-export commonly used types
pub use assembly::{assemble, StoreBatch};
pub use backend::replay::ReplayBackend;
pub use backend::{Demux, Frontend};
pub use config::{AtvConfig, DtvConfig, ScanConfig};
pub use result::ScanResult;
pub use scanner::{ProgressSink, ScanBackend, ScanHandle, ScanOutcome, ScanProgress};
pub use store::{ScanStore, StoreSummary};
pub use tvscan_protocol::{EndCode, ScanError};
