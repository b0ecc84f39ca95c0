//! Database model definitions.

use serde::Serialize;
use tvscan_protocol::{ServiceType, SourceKind};

/// Channel list entry: a service joined with its transponder.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRecord {
    pub id: i64,
    pub transponder_id: i64,
    pub source: SourceKind,
    pub frequency: u32,
    pub service_id: u16,
    pub name: Option<String>,
    pub service_type: ServiceType,
    pub video_pid: u16,
    pub scrambled: bool,
    // Numbering
    pub lcn: Option<u16>,
    pub skip: bool,
    pub chan_num: i32,
    pub chan_order: i32,
    // ATSC
    pub major: Option<u16>,
    pub minor: Option<u16>,
    pub audio_pids: Vec<u16>,
}

impl ChannelRecord {
    /// Number shown to the user: `major.minor` for ATSC, the channel number otherwise.
    pub fn display_number(&self) -> String {
        match (self.major, self.minor) {
            (Some(major), Some(minor)) => format!("{}.{}", major, minor),
            _ if self.chan_num > 0 => self.chan_num.to_string(),
            _ => "-".to_string(),
        }
    }
}

/// Scan history record from database.
#[derive(Debug, Clone, Serialize)]
pub struct ScanHistoryRecord {
    pub id: i64,
    pub source: Option<SourceKind>,
    pub scan_time: i64,
    pub end_code: String,
    pub transponder_count: i32,
    pub service_count: i32,
}
