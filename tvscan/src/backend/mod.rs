//! Frontend and demultiplexer abstractions driven by the scanner.
//!
//! The scanner never talks to hardware directly. A [`Frontend`] tunes and
//! reports lock changes, a [`Demux`] runs section filters. Both push their
//! notifications through sinks registered by the scanner; the sinks only
//! enqueue events, so implementations may call them from any thread.

pub mod replay;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tvscan_protocol::{
    FrontendStatus, LoBand, Polarisation, SatelliteParams, ScanError, SignalQuality, TuneParams,
};

/// Number of filter/mask bytes of a section filter.
pub const FILTER_DEPTH: usize = 16;

/// Handle of an allocated section filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterHandle(pub u32);

impl fmt::Display for FilterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Section filter parameters.
///
/// `filter[0]` matches the table id. The following bytes match the section
/// from its fourth byte on, skipping the two section length bytes, so
/// `filter[1..3]` is the table id extension and `filter[3]` holds the
/// version/current-next byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionFilter {
    pub pid: u16,
    pub filter: [u8; FILTER_DEPTH],
    pub mask: [u8; FILTER_DEPTH],
    /// Drop sections with a bad CRC before delivery.
    pub check_crc: bool,
}

impl SectionFilter {
    /// Filter for one table, optionally narrowed to a table id extension.
    ///
    /// Only sections with `current_next_indicator` set pass.
    pub fn for_table(pid: u16, table_id: u8, extension: Option<u16>) -> Self {
        let mut filter = [0u8; FILTER_DEPTH];
        let mut mask = [0u8; FILTER_DEPTH];

        filter[0] = table_id;
        mask[0] = 0xFF;

        if let Some(ext) = extension {
            filter[1] = (ext >> 8) as u8;
            mask[1] = 0xFF;
            filter[2] = ext as u8;
            mask[2] = 0xFF;
        }

        filter[3] = 0x01;
        mask[3] = 0x01;

        Self {
            pid,
            filter,
            mask,
            check_crc: true,
        }
    }

    /// Returns true if a complete section passes this filter.
    pub fn matches(&self, section: &[u8]) -> bool {
        if section.is_empty() {
            return false;
        }
        if (section[0] ^ self.filter[0]) & self.mask[0] != 0 {
            return false;
        }
        for i in 1..FILTER_DEPTH {
            if self.mask[i] == 0 {
                continue;
            }
            match section.get(i + 2) {
                Some(&byte) if (byte ^ self.filter[i]) & self.mask[i] == 0 => {}
                _ => return false,
            }
        }
        true
    }
}

/// Receives complete sections from a running filter.
pub type SectionSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Receives frontend lock status changes.
pub type StatusSink = Arc<dyn Fn(FrontendStatus) + Send + Sync>;

/// Receives blind scan progress.
pub type BlindScanSink = Arc<dyn Fn(BlindScanEvent) + Send + Sync>;

/// Progress of one blind scan sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlindScanEvent {
    /// The sweep reached a new frequency (kHz).
    Start { frequency: u32 },
    /// Percent done within the sweep and every transponder found so far.
    Update {
        process: u32,
        transponders: Vec<TuneParams>,
    },
}

/// Backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no free section filter")]
    NoFreeFilter,

    #[error("unknown filter {0}")]
    UnknownFilter(FilterHandle),

    #[error("tune failed: {0}")]
    Tune(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for ScanError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NoFreeFilter => ScanError::NoFreeFilter,
            BackendError::Tune(msg) => ScanError::FrontendSetFailed(msg),
            other => ScanError::Demux(other.to_string()),
        }
    }
}

/// Tuner frontend.
pub trait Frontend: Send + Sync {
    /// Register the sink receiving lock status changes, replacing any
    /// previous one.
    fn subscribe(&self, sink: StatusSink);

    /// Drop the registered status sink.
    fn unsubscribe(&self);

    /// Start tuning. Lock is reported asynchronously through the sink.
    fn tune(&self, params: &TuneParams) -> Result<(), BackendError>;

    fn signal_quality(&self) -> SignalQuality;

    /// Analog only: whether the video decoder reports a stable picture.
    fn video_locked(&self) -> bool {
        true
    }

    /// Apply LNB/DiSEqC settings before satellite tuning.
    fn apply_satellite(&self, _satellite: &SatelliteParams) -> Result<(), BackendError> {
        Ok(())
    }

    /// Start a blind sweep over `[start_khz, stop_khz]` with the LNB set to
    /// the given polarisation and oscillator band.
    fn blind_scan(
        &self,
        _polarisation: Polarisation,
        _band: LoBand,
        _start_khz: u32,
        _stop_khz: u32,
        _sink: BlindScanSink,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("blind scan"))
    }

    /// Stop the running blind sweep. Blocks until the sweep's callbacks
    /// have returned.
    fn blind_scan_exit(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Section demultiplexer.
pub trait Demux: Send + Sync {
    fn alloc_filter(&self, filter: &SectionFilter) -> Result<FilterHandle, BackendError>;

    fn set_callback(&self, handle: FilterHandle, sink: SectionSink) -> Result<(), BackendError>;

    fn start(&self, handle: FilterHandle) -> Result<(), BackendError>;

    fn free(&self, handle: FilterHandle) -> Result<(), BackendError>;

    /// Wait until no callback of a freed filter is running or pending.
    fn sync(&self);
}
