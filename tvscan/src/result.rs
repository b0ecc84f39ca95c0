//! Scan result accumulated by the engine.
//!
//! Decoded sections are owned by the record of the transponder they were
//! received on, except for the NITs of the discovery pass and the BATs,
//! which belong to the whole scan.

use tvscan_protocol::{EndCode, ScanError, SignalQuality, SourceKind, TuneParams};

use crate::config::ScanConfig;
use crate::ts_analyzer::{
    BatSection, CatSection, MgtSection, NitSection, PatSection, PmtSection, SdtSection, SiTable,
    VctSection,
};

/// Analog carrier found by the step search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogTransponder {
    /// Locked frequency in Hz, rounded to .25/.75 MHz when close.
    pub frequency: u32,
    pub audio_std: u32,
    pub video_std: u32,
}

/// Digital multiplex that locked, with every section collected on it.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalTransponder {
    pub params: TuneParams,
    pub signal: SignalQuality,
    pub pats: Vec<PatSection>,
    pub pmts: Vec<PmtSection>,
    pub cats: Vec<CatSection>,
    pub sdts: Vec<SdtSection>,
    pub nits: Vec<NitSection>,
    pub mgts: Vec<MgtSection>,
    pub vcts: Vec<VctSection>,
}

impl DigitalTransponder {
    pub fn new(params: TuneParams, signal: SignalQuality) -> Self {
        Self {
            params,
            signal,
            pats: Vec::new(),
            pmts: Vec::new(),
            cats: Vec::new(),
            sdts: Vec::new(),
            nits: Vec::new(),
            mgts: Vec::new(),
            vcts: Vec::new(),
        }
    }

    /// Append a decoded section to the matching list. BAT sections are
    /// scan wide and handed back.
    pub fn push(&mut self, table: SiTable) -> Option<BatSection> {
        match table {
            SiTable::Pat(t) => self.pats.push(t),
            SiTable::Pmt(t) => self.pmts.push(t),
            SiTable::Cat(t) => self.cats.push(t),
            SiTable::Sdt(t) => self.sdts.push(t),
            SiTable::Nit(t) => self.nits.push(t),
            SiTable::Mgt(t) => self.mgts.push(t),
            SiTable::Vct(t) => self.vcts.push(t),
            SiTable::Bat(t) => return Some(t),
        }
        None
    }

    /// Transport stream id from the PAT, falling back to the SDT or VCT.
    pub fn transport_stream_id(&self) -> Option<u16> {
        self.pats
            .first()
            .map(|p| p.transport_stream_id)
            .or_else(|| self.sdts.first().map(|s| s.transport_stream_id))
            .or_else(|| self.vcts.first().map(|v| v.transport_stream_id))
    }

    pub fn original_network_id(&self) -> Option<u16> {
        self.sdts.first().map(|s| s.original_network_id)
    }

    /// Program numbers announced by every PAT section, without the NIT entry.
    pub fn programs(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.pats
            .iter()
            .flat_map(|pat| pat.services())
            .map(|p| (p.program_number, p.pid))
    }

    pub fn pmt(&self, program_number: u16) -> Option<&PmtSection> {
        self.pmts.iter().find(|p| p.program_number == program_number)
    }
}

/// One tuned frequency that locked.
#[derive(Debug, Clone, PartialEq)]
pub enum TransponderRecord {
    Analog(AnalogTransponder),
    Digital(DigitalTransponder),
}

impl TransponderRecord {
    pub fn frequency(&self) -> u32 {
        match self {
            TransponderRecord::Analog(a) => a.frequency,
            TransponderRecord::Digital(d) => d.params.frequency(),
        }
    }

    pub fn source(&self) -> SourceKind {
        match self {
            TransponderRecord::Analog(_) => SourceKind::Analog,
            TransponderRecord::Digital(d) => d.params.source(),
        }
    }

    pub fn as_digital(&self) -> Option<&DigitalTransponder> {
        match self {
            TransponderRecord::Digital(d) => Some(d),
            TransponderRecord::Analog(_) => None,
        }
    }

    pub fn as_digital_mut(&mut self) -> Option<&mut DigitalTransponder> {
        match self {
            TransponderRecord::Digital(d) => Some(d),
            TransponderRecord::Analog(_) => None,
        }
    }
}

/// Everything a scan produced.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub config: ScanConfig,
    pub transponders: Vec<TransponderRecord>,
    /// NITs of the discovery pass.
    pub nits: Vec<NitSection>,
    pub bats: Vec<BatSection>,
    pub end_code: EndCode,
    /// Set when the scan stopped on a terminal error.
    pub failure: Option<ScanError>,
}

impl ScanResult {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            transponders: Vec::new(),
            nits: Vec::new(),
            bats: Vec::new(),
            end_code: EndCode::NoSignal,
            failure: None,
        }
    }

    pub fn digital(&self) -> impl Iterator<Item = &DigitalTransponder> {
        self.transponders.iter().filter_map(|t| t.as_digital())
    }

    pub fn analog(&self) -> impl Iterator<Item = &AnalogTransponder> {
        self.transponders.iter().filter_map(|t| match t {
            TransponderRecord::Analog(a) => Some(a),
            TransponderRecord::Digital(_) => None,
        })
    }
}
