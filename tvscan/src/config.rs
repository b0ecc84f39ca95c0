//! Scan configuration.
//!
//! A [`ScanConfig`] is built once by the caller, validated by
//! [`ScanConfig::validate`] when the scanner is created, and never changed
//! afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tvscan_protocol::{
    AtvMode, Bandwidth, DtvMode, DtvStandard, SatelliteParams, ScanError, ScanMode, SortMethod,
    SourceKind, StepDirection, TuneParams,
};

use crate::sequencer::defaults;

/// Complete scan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Order of the analog and digital passes.
    pub mode: ScanMode,
    /// Analog pass, if any.
    pub atv: Option<AtvConfig>,
    /// Digital pass, if any.
    pub dtv: Option<DtvConfig>,
    pub timeouts: TableTimeouts,
}

/// Analog pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtvConfig {
    pub mode: AtvMode,
    /// Frequencies in Hz. `Manual` and `Auto` read `min, max, start`.
    pub frequencies: Vec<u32>,
    /// Step direction for `Manual`.
    pub direction: StepDirection,
    /// Maximum distance between the tuned and the reported frequency.
    pub afc_range_hz: u32,
    /// Step after a frequency without RF lock.
    pub afc_unlocked_step_hz: u32,
    /// Step after RF lock without a stable picture.
    pub cvbs_unlocked_step_hz: u32,
    /// Step after a channel was found.
    pub cvbs_locked_step_hz: u32,
    pub default_audio_std: u32,
    pub default_video_std: u32,
}

impl Default for AtvConfig {
    fn default() -> Self {
        Self {
            mode: AtvMode::Fixed,
            frequencies: Vec::new(),
            direction: StepDirection::Up,
            afc_range_hz: 2_000_000,        // 2 MHz
            afc_unlocked_step_hz: 3_000_000, // 3 MHz
            cvbs_unlocked_step_hz: 1_000_000, // 1 MHz
            cvbs_locked_step_hz: 6_000_000, // 6 MHz
            default_audio_std: 0,
            default_video_std: 0,
        }
    }
}

impl AtvConfig {
    /// Frontend parameters for each configured frequency.
    pub fn tune_params(&self) -> Vec<TuneParams> {
        let count = match self.mode {
            AtvMode::Fixed => self.frequencies.len(),
            AtvMode::Manual | AtvMode::Auto => 3,
        };
        self.frequencies
            .iter()
            .take(count)
            .map(|&frequency| TuneParams::Analog {
                frequency,
                audio_std: self.default_audio_std,
                video_std: self.default_video_std,
            })
            .collect()
    }
}

/// Computed terrestrial frequency ladder (kHz bounds, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrestrialLadder {
    pub start_khz: u32,
    pub stop_khz: u32,
    pub bandwidth: Bandwidth,
}

/// Satellite blind scan band (kHz, intermediate frequency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlindScanRange {
    pub start_khz: u32,
    pub stop_khz: u32,
    /// Upper bound on transponders kept from one blind scan.
    pub max_transponders: usize,
}

impl Default for BlindScanRange {
    fn default() -> Self {
        Self {
            start_khz: defaults::BLIND_SCAN_START_KHZ,
            stop_khz: defaults::BLIND_SCAN_STOP_KHZ,
            max_transponders: 512,
        }
    }
}

/// Digital pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DtvConfig {
    pub standard: DtvStandard,
    pub source: SourceKind,
    pub mode: DtvMode,
    /// Caller supplied frequencies. Empty means the default plan for
    /// `Auto`/`AllBand`.
    pub frequencies: Vec<TuneParams>,
    /// Collect the BAT during NIT discovery.
    pub search_bat: bool,
    /// Satellite reception through a unicable LNB.
    pub unicable: bool,
    /// Renumber every service instead of appending after the stored ones.
    pub resort_all: bool,
    pub sort: SortMethod,
    /// TV and radio share one numbering sequence.
    pub sort_together: bool,
    /// PMT filters running at the same time.
    pub pmt_parallelism: usize,
    pub terrestrial_ladder: Option<TerrestrialLadder>,
    pub satellite: Option<SatelliteParams>,
    pub blind_scan: Option<BlindScanRange>,
}

impl Default for DtvConfig {
    fn default() -> Self {
        Self {
            standard: DtvStandard::Dvb,
            source: SourceKind::Cable,
            mode: DtvMode::Auto,
            frequencies: Vec::new(),
            search_bat: false,
            unicable: false,
            resort_all: false,
            sort: SortMethod::ScanOrder,
            sort_together: true,
            pmt_parallelism: 4,
            terrestrial_ladder: None,
            satellite: None,
            blind_scan: None,
        }
    }
}

impl DtvConfig {
    /// Candidate list of the digital pass as it stands before any NIT or
    /// blind scan replaces it.
    pub fn tune_params(&self) -> Vec<TuneParams> {
        match self.mode {
            DtvMode::Manual => self.frequencies.iter().take(1).copied().collect(),
            DtvMode::Blind => Vec::new(),
            DtvMode::Auto | DtvMode::AllBand if self.frequencies.is_empty() => match self.source {
                SourceKind::Cable => defaults::dvbc_standard(),
                SourceKind::Terrestrial => match self.terrestrial_ladder {
                    Some(ladder) => {
                        defaults::terrestrial_ladder(ladder.start_khz, ladder.stop_khz, ladder.bandwidth)
                    }
                    None => defaults::dvbt_standard(),
                },
                _ => Vec::new(),
            },
            DtvMode::Auto | DtvMode::AllBand => self.frequencies.clone(),
        }
    }

    pub fn blind_scan_range(&self) -> BlindScanRange {
        self.blind_scan.unwrap_or_default()
    }
}

/// Table timeouts in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableTimeouts {
    pub pat_ms: u64,
    pub pmt_ms: u64,
    pub cat_ms: u64,
    pub sdt_ms: u64,
    pub nit_ms: u64,
    pub bat_ms: u64,
    pub mgt_ms: u64,
    pub vct_ms: u64,
    /// Minimum age of the BAT before a repeated section may complete it.
    pub bat_repeat_distance_ms: u64,
    /// Bouquets tracked at the same time.
    pub bat_subtables: usize,
}

impl Default for TableTimeouts {
    fn default() -> Self {
        Self {
            pat_ms: 6000,
            pmt_ms: 3000,
            cat_ms: 3000,
            sdt_ms: 6000,
            nit_ms: 10000,
            bat_ms: 10000,
            mgt_ms: 2500,
            vct_ms: 2500,
            bat_repeat_distance_ms: 3000,
            bat_subtables: 32,
        }
    }
}

impl TableTimeouts {
    pub fn pat(&self) -> Duration {
        Duration::from_millis(self.pat_ms)
    }

    pub fn pmt(&self) -> Duration {
        Duration::from_millis(self.pmt_ms)
    }

    pub fn cat(&self) -> Duration {
        Duration::from_millis(self.cat_ms)
    }

    pub fn sdt(&self) -> Duration {
        Duration::from_millis(self.sdt_ms)
    }

    pub fn nit(&self) -> Duration {
        Duration::from_millis(self.nit_ms)
    }

    pub fn bat(&self) -> Duration {
        Duration::from_millis(self.bat_ms)
    }

    pub fn mgt(&self) -> Duration {
        Duration::from_millis(self.mgt_ms)
    }

    pub fn vct(&self) -> Duration {
        Duration::from_millis(self.vct_ms)
    }

    pub fn bat_repeat_distance(&self) -> Duration {
        Duration::from_millis(self.bat_repeat_distance_ms)
    }
}

fn invalid(msg: impl Into<String>) -> ScanError {
    ScanError::InvalidParameter(msg.into())
}

impl ScanConfig {
    /// Check parameter combinations before a scanner is created.
    pub fn validate(&self) -> Result<(), ScanError> {
        let mut total = 0usize;

        if let Some(atv) = &self.atv {
            if atv.mode != AtvMode::Fixed && atv.frequencies.len() < 3 {
                return Err(invalid(
                    "analog step scan needs min, max and start frequencies",
                ));
            }
            if atv.mode != AtvMode::Fixed && atv.frequencies[0] >= atv.frequencies[1] {
                return Err(invalid("analog min frequency must be below max"));
            }
            if atv.afc_unlocked_step_hz == 0
                || atv.cvbs_unlocked_step_hz == 0
                || atv.cvbs_locked_step_hz == 0
            {
                return Err(invalid("analog step sizes must be non-zero"));
            }
            if self.mode == ScanMode::Adtv && atv.mode != AtvMode::Fixed {
                return Err(invalid("interleaved scan needs fixed analog frequencies"));
            }
            total += atv.frequencies.len();
        }

        if let Some(dtv) = &self.dtv {
            if dtv.mode == DtvMode::Manual && dtv.frequencies.is_empty() {
                return Err(invalid("manual scan needs a frequency"));
            }
            if dtv.mode == DtvMode::Blind {
                if dtv.source != SourceKind::Satellite {
                    return Err(invalid("blind scan is only available for satellite"));
                }
                if dtv.satellite.is_none() {
                    return Err(invalid("blind scan needs satellite parameters"));
                }
                let range = dtv.blind_scan_range();
                if range.start_khz >= range.stop_khz {
                    return Err(invalid("blind scan start must be below stop"));
                }
            }
            if dtv.source == SourceKind::Satellite && dtv.satellite.is_none() {
                return Err(invalid("satellite scan needs satellite parameters"));
            }
            if let Some(p) = dtv.frequencies.iter().find(|p| p.source() != dtv.source) {
                return Err(invalid(format!(
                    "{} frequency {} in a {} scan",
                    p.source().as_str(),
                    p.frequency(),
                    dtv.source.as_str()
                )));
            }
            if self.mode == ScanMode::Adtv
                && (matches!(dtv.mode, DtvMode::Auto | DtvMode::Blind)
                    || dtv.source == SourceKind::Satellite)
            {
                return Err(invalid(
                    "interleaved scan needs a manual or all-band terrestrial, cable or ATSC pass",
                ));
            }
            if dtv.pmt_parallelism == 0 {
                return Err(invalid("pmt_parallelism must be at least 1"));
            }

            if dtv.mode == DtvMode::Blind {
                // filled by the blind scan
                total += 1;
            } else {
                total += dtv.tune_params().len();
            }
        }

        if self.timeouts.bat_subtables == 0 {
            return Err(invalid("bat_subtables must be at least 1"));
        }

        if total == 0 {
            return Err(invalid("no frequency to scan"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cable_auto() -> ScanConfig {
        ScanConfig {
            dtv: Some(DtvConfig::default()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_cable_plan() {
        let config = cable_auto();
        assert!(config.validate().is_ok());
        let params = config.dtv.as_ref().unwrap().tune_params();
        assert_eq!(params[0].frequency(), 52_500_000);
    }

    #[test]
    fn test_empty_config_rejected() {
        let config = ScanConfig::default();
        assert!(matches!(config.validate(), Err(ScanError::InvalidParameter(_))));

        let satellite_auto = ScanConfig {
            dtv: Some(DtvConfig {
                source: SourceKind::Satellite,
                satellite: Some(SatelliteParams::universal("Astra")),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(satellite_auto.validate().is_err());
    }

    #[test]
    fn test_atv_step_modes_need_three_frequencies() {
        let config = ScanConfig {
            mode: ScanMode::AtvFirst,
            atv: Some(AtvConfig {
                mode: AtvMode::Auto,
                frequencies: vec![44_250_000, 863_250_000],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let fixed = ScanConfig {
            mode: ScanMode::AtvFirst,
            atv: Some(AtvConfig {
                frequencies: vec![48_250_000],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(fixed.validate().is_ok());
    }

    #[test]
    fn test_manual_uses_first_frequency() {
        let dtv = DtvConfig {
            mode: DtvMode::Manual,
            frequencies: vec![
                TuneParams::Cable {
                    frequency: 474_000_000,
                    symbol_rate: 6_875_000,
                    modulation: tvscan_protocol::Modulation::Qam64,
                },
                TuneParams::Cable {
                    frequency: 482_000_000,
                    symbol_rate: 6_875_000,
                    modulation: tvscan_protocol::Modulation::Qam64,
                },
            ],
            ..Default::default()
        };
        assert_eq!(dtv.tune_params().len(), 1);

        let empty = ScanConfig {
            dtv: Some(DtvConfig {
                mode: DtvMode::Manual,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_blind_needs_satellite() {
        let mut config = ScanConfig {
            dtv: Some(DtvConfig {
                source: SourceKind::Satellite,
                mode: DtvMode::Blind,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.dtv.as_mut().unwrap().satellite = Some(SatelliteParams::universal("Hotbird"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_mismatch_rejected() {
        let config = ScanConfig {
            dtv: Some(DtvConfig {
                mode: DtvMode::AllBand,
                frequencies: vec![TuneParams::Terrestrial {
                    frequency: 474_000_000,
                    bandwidth: Bandwidth::Mhz8,
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ScanConfig = serde_json::from_str(
            r#"{"mode":"dtv_first","dtv":{"source":"terrestrial","mode":"all_band"}}"#,
        )
        .unwrap();
        let dtv = config.dtv.unwrap();
        assert_eq!(dtv.source, SourceKind::Terrestrial);
        assert!(dtv.sort_together);
        assert_eq!(dtv.pmt_parallelism, 4);
        assert_eq!(config.timeouts.nit_ms, 10000);
    }
}
