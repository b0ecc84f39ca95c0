//! Progress notifications delivered to the caller.

use std::sync::Arc;

use tvscan_protocol::{EndCode, SignalQuality, TuneParams};

use crate::sequencer::blind::BlindStage;
use crate::ts_analyzer::{
    BatSection, CatSection, MgtSection, NitSection, PatSection, PmtSection, SdtSection, VctSection,
};

/// Frontend status seen by the engine after an accepted lock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalInfo {
    pub frequency: u32,
    pub locked: bool,
    /// Read for digital frequencies only.
    pub quality: Option<SignalQuality>,
}

/// One step of a running scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    ScanBegin,
    NitBegin,
    NitEnd,
    /// A frequency is about to be tuned.
    TsBegin {
        index: usize,
        total: usize,
        params: TuneParams,
    },
    TsEnd,
    PatDone(Vec<PatSection>),
    PmtDone(Vec<PmtSection>),
    CatDone(Vec<CatSection>),
    SdtDone(Vec<SdtSection>),
    NitDone(Vec<NitSection>),
    BatDone(Vec<BatSection>),
    MgtDone(Vec<MgtSection>),
    VctDone(Vec<VctSection>),
    BlindScan {
        stage: BlindStage,
        percent: u32,
        new_transponders: Vec<TuneParams>,
    },
    /// The blind sweep reached a new frequency (kHz).
    BlindScanFrequency(u32),
    /// Analog step search moved to a new frequency (Hz).
    AtvTuning(u32),
    Signal(SignalInfo),
    StoreBegin,
    StoreEnd,
    ScanEnd(EndCode),
}

impl ScanProgress {
    pub fn name(&self) -> &'static str {
        match self {
            ScanProgress::ScanBegin => "scan_begin",
            ScanProgress::NitBegin => "nit_begin",
            ScanProgress::NitEnd => "nit_end",
            ScanProgress::TsBegin { .. } => "ts_begin",
            ScanProgress::TsEnd => "ts_end",
            ScanProgress::PatDone(_) => "pat_done",
            ScanProgress::PmtDone(_) => "pmt_done",
            ScanProgress::CatDone(_) => "cat_done",
            ScanProgress::SdtDone(_) => "sdt_done",
            ScanProgress::NitDone(_) => "nit_done",
            ScanProgress::BatDone(_) => "bat_done",
            ScanProgress::MgtDone(_) => "mgt_done",
            ScanProgress::VctDone(_) => "vct_done",
            ScanProgress::BlindScan { .. } => "blind_scan",
            ScanProgress::BlindScanFrequency(_) => "blind_scan_frequency",
            ScanProgress::AtvTuning(_) => "atv_tuning",
            ScanProgress::Signal(_) => "signal",
            ScanProgress::StoreBegin => "store_begin",
            ScanProgress::StoreEnd => "store_end",
            ScanProgress::ScanEnd(_) => "scan_end",
        }
    }
}

/// Receives progress notifications on the scan worker thread.
pub type ProgressSink = Arc<dyn Fn(&ScanProgress) + Send + Sync>;

/// Sink that drops every notification.
pub fn discard_progress() -> ProgressSink {
    Arc::new(|_: &ScanProgress| {})
}
