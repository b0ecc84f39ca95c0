//! Satellite blind scan staging.
//!
//! A blind scan sweeps the IF band once per polarisation and LNB oscillator
//! band: HL, HH, VL, VH. LNBs with a single oscillator skip the high band
//! stages. Each stage contributes a quarter of the reported progress.

use tvscan_protocol::{LoBand, Polarisation, TuneParams};

use crate::config::BlindScanRange;

/// One sweep of a blind scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlindStage {
    HorizontalLow,
    HorizontalHigh,
    VerticalLow,
    VerticalHigh,
}

impl BlindStage {
    pub const ALL: [BlindStage; 4] = [
        BlindStage::HorizontalLow,
        BlindStage::HorizontalHigh,
        BlindStage::VerticalLow,
        BlindStage::VerticalHigh,
    ];

    pub fn index(self) -> u32 {
        match self {
            BlindStage::HorizontalLow => 0,
            BlindStage::HorizontalHigh => 1,
            BlindStage::VerticalLow => 2,
            BlindStage::VerticalHigh => 3,
        }
    }

    pub fn polarisation(self) -> Polarisation {
        match self {
            BlindStage::HorizontalLow | BlindStage::HorizontalHigh => Polarisation::Horizontal,
            BlindStage::VerticalLow | BlindStage::VerticalHigh => Polarisation::Vertical,
        }
    }

    pub fn band(self) -> LoBand {
        match self {
            BlindStage::HorizontalLow | BlindStage::VerticalLow => LoBand::Low,
            BlindStage::HorizontalHigh | BlindStage::VerticalHigh => LoBand::High,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            BlindStage::HorizontalLow => "HL",
            BlindStage::HorizontalHigh => "HH",
            BlindStage::VerticalLow => "VL",
            BlindStage::VerticalHigh => "VH",
        }
    }
}

/// Progress reported after a blind scan update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindProgress {
    pub stage: BlindStage,
    pub percent: u32,
    /// Transponders found since the previous update.
    pub new_transponders: Vec<TuneParams>,
    /// The frontend finished the current stage.
    pub stage_done: bool,
}

/// Blind scan state machine.
#[derive(Debug, Clone)]
pub struct BlindScan {
    range: BlindScanRange,
    single_lo: bool,
    /// Index into [`BlindStage::ALL`]; past the end when finished.
    stage: usize,
    percent: u32,
    /// Transponders reported by the running stage.
    searched: Vec<TuneParams>,
    found: Vec<TuneParams>,
}

impl BlindScan {
    pub fn new(range: BlindScanRange, single_lo: bool) -> Self {
        Self {
            range,
            single_lo,
            stage: 0,
            percent: 0,
            searched: Vec::new(),
            found: Vec::new(),
        }
    }

    pub fn range(&self) -> BlindScanRange {
        self.range
    }

    pub fn percent(&self) -> u32 {
        self.percent
    }

    pub fn current_stage(&self) -> Option<BlindStage> {
        BlindStage::ALL.get(self.stage).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.stage >= BlindStage::ALL.len()
    }

    /// High band stages are pointless with a single oscillator.
    pub fn skips(&self, stage: BlindStage) -> bool {
        self.single_lo && stage.band() == LoBand::High
    }

    /// Give up on the current stage without results (skipped or refused
    /// by the frontend).
    pub fn skip_stage(&mut self) {
        self.searched.clear();
        self.percent = (self.percent + 25).min(100);
        self.stage += 1;
    }

    /// Record a frontend update for the running stage.
    ///
    /// `transponders` is every transponder the frontend has found in this
    /// stage so far.
    pub fn update(&mut self, process: u32, transponders: &[TuneParams]) -> Option<BlindProgress> {
        let stage = self.current_stage()?;
        let polarisation = stage.polarisation();

        let new_transponders: Vec<TuneParams> = transponders
            .iter()
            .skip(self.searched.len())
            .map(|tp| match *tp {
                TuneParams::Satellite {
                    frequency,
                    symbol_rate,
                    ..
                } => TuneParams::Satellite {
                    frequency,
                    symbol_rate,
                    polarisation,
                },
                other => other,
            })
            .collect();
        self.searched.extend(new_transponders.iter().copied());

        self.percent = stage.index() * 25 + process.min(100) / 4;

        Some(BlindProgress {
            stage,
            percent: self.percent,
            new_transponders,
            stage_done: process >= 100,
        })
    }

    /// Close the running stage, keeping what it found.
    pub fn finish_stage(&mut self) {
        let room = self.range.max_transponders.saturating_sub(self.found.len());
        self.found.extend(self.searched.drain(..).take(room));
        self.stage += 1;
    }

    /// Transponders found by every finished stage.
    pub fn transponders(&self) -> &[TuneParams] {
        &self.found
    }

    pub fn into_transponders(self) -> Vec<TuneParams> {
        self.found
    }
}
