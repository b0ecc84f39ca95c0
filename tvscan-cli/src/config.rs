//! Configuration file format and merging with the command line.
//!
//! Every field of the file is optional. Command line flags take precedence
//! over file values, which take precedence over the library defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tvscan::config::{BlindScanRange, TableTimeouts, TerrestrialLadder};
use tvscan::{AtvConfig, DtvConfig, ScanConfig};
use tvscan_protocol::{
    AtvMode, Bandwidth, DtvMode, DtvStandard, Modulation, Polarisation, SatelliteParams, ScanMode,
    SortMethod, SourceKind, StepDirection, TuneParams,
};

use crate::ScanArgs;

/// Default name of the auto-detected configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "tvscan.toml";

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub atv: Option<AtvSection>,
    #[serde(default)]
    pub dtv: Option<DtvSection>,
    #[serde(default)]
    pub satellite: Option<SatelliteParams>,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub replay: ReplaySection,
}

#[derive(Debug, Deserialize, Default)]
pub struct ScanSection {
    pub mode: Option<ScanMode>,
    pub timeouts: Option<TableTimeouts>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AtvSection {
    pub mode: Option<AtvMode>,
    pub frequencies: Option<Vec<u32>>,
    pub direction: Option<StepDirection>,
    pub afc_range_hz: Option<u32>,
    pub afc_unlocked_step_hz: Option<u32>,
    pub cvbs_unlocked_step_hz: Option<u32>,
    pub cvbs_locked_step_hz: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DtvSection {
    pub standard: Option<DtvStandard>,
    pub source: Option<SourceKind>,
    pub mode: Option<DtvMode>,
    pub frequencies: Option<Vec<TuneParams>>,
    pub search_bat: Option<bool>,
    pub unicable: Option<bool>,
    pub resort_all: Option<bool>,
    pub sort: Option<SortMethod>,
    pub sort_together: Option<bool>,
    pub pmt_parallelism: Option<usize>,
    pub terrestrial_ladder: Option<TerrestrialLadder>,
    pub blind_scan: Option<BlindScanRange>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DatabaseSection {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReplaySection {
    /// Directory of `<frequency>.ts` captures.
    pub dir: Option<String>,
}

pub fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Explicit path > `tvscan.toml` in the working directory > nothing.
pub fn find_config(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    explicit.cloned().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    })
}

/// Default database path.
pub fn default_database_path() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("tvscan").join("channels.db");
        }
    }

    #[cfg(unix)]
    {
        if let Some(data_home) = std::env::var_os("XDG_DATA_HOME") {
            return PathBuf::from(data_home).join("tvscan").join("channels.db");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("tvscan")
                .join("channels.db");
        }
    }

    PathBuf::from("channels.db")
}

/// Tune parameters for a bare frequency given on the command line.
fn tune_params(source: SourceKind, frequency: u32, args: &ScanArgs) -> TuneParams {
    match source {
        SourceKind::Analog => TuneParams::Analog {
            frequency,
            audio_std: 0,
            video_std: 0,
        },
        SourceKind::Cable => TuneParams::Cable {
            frequency,
            symbol_rate: args.symbol_rate.unwrap_or(6_875_000),
            modulation: Modulation::Auto,
        },
        SourceKind::Terrestrial => TuneParams::Terrestrial {
            frequency,
            bandwidth: match args.bandwidth_mhz {
                6 => Bandwidth::Mhz6,
                7 => Bandwidth::Mhz7,
                _ => Bandwidth::Mhz8,
            },
        },
        SourceKind::Satellite => TuneParams::Satellite {
            frequency,
            symbol_rate: args.symbol_rate.unwrap_or(27_500_000),
            polarisation: args
                .polarisation
                .map(Polarisation::from)
                .unwrap_or(Polarisation::Horizontal),
        },
        SourceKind::Atsc => TuneParams::Atsc {
            frequency,
            modulation: Modulation::Vsb8,
        },
    }
}

/// Build the scan configuration from the file and the command line.
pub fn build_scan_config(file: &ConfigFile, args: &ScanArgs) -> ScanConfig {
    let mut config = ScanConfig {
        mode: args
            .order
            .map(ScanMode::from)
            .or(file.scan.mode)
            .unwrap_or_default(),
        atv: None,
        dtv: None,
        timeouts: file.scan.timeouts.unwrap_or_default(),
    };

    let atv_mode = args.atv.map(AtvMode::from);
    if atv_mode.is_some() || !args.atv_frequency.is_empty() || file.atv.is_some() {
        let section = file.atv.as_ref();
        let defaults = AtvConfig::default();
        let frequencies = if args.atv_frequency.is_empty() {
            section
                .and_then(|s| s.frequencies.clone())
                .unwrap_or_default()
        } else {
            args.atv_frequency.clone()
        };
        config.atv = Some(AtvConfig {
            mode: atv_mode
                .or(section.and_then(|s| s.mode))
                .unwrap_or(defaults.mode),
            frequencies,
            direction: section
                .and_then(|s| s.direction)
                .unwrap_or(defaults.direction),
            afc_range_hz: section
                .and_then(|s| s.afc_range_hz)
                .unwrap_or(defaults.afc_range_hz),
            afc_unlocked_step_hz: section
                .and_then(|s| s.afc_unlocked_step_hz)
                .unwrap_or(defaults.afc_unlocked_step_hz),
            cvbs_unlocked_step_hz: section
                .and_then(|s| s.cvbs_unlocked_step_hz)
                .unwrap_or(defaults.cvbs_unlocked_step_hz),
            cvbs_locked_step_hz: section
                .and_then(|s| s.cvbs_locked_step_hz)
                .unwrap_or(defaults.cvbs_locked_step_hz),
            ..defaults
        });
    }

    let source = args.source.map(SourceKind::from);
    if source.is_some() || !args.frequency.is_empty() || file.dtv.is_some() {
        let section = file.dtv.as_ref();
        let defaults = DtvConfig::default();
        let source = source
            .or(section.and_then(|s| s.source))
            .unwrap_or(defaults.source);
        let frequencies = if args.frequency.is_empty() {
            section
                .and_then(|s| s.frequencies.clone())
                .unwrap_or_default()
        } else {
            args.frequency
                .iter()
                .map(|&f| tune_params(source, f, args))
                .collect()
        };
        let standard = args
            .standard
            .map(DtvStandard::from)
            .or(section.and_then(|s| s.standard))
            .unwrap_or(if source == SourceKind::Atsc {
                DtvStandard::Atsc
            } else {
                defaults.standard
            });

        config.dtv = Some(DtvConfig {
            standard,
            source,
            mode: args
                .mode
                .map(DtvMode::from)
                .or(section.and_then(|s| s.mode))
                .unwrap_or(defaults.mode),
            frequencies,
            search_bat: args.search_bat || section.and_then(|s| s.search_bat).unwrap_or(false),
            unicable: section.and_then(|s| s.unicable).unwrap_or(defaults.unicable),
            resort_all: args.resort_all || section.and_then(|s| s.resort_all).unwrap_or(false),
            sort: args
                .sort
                .map(SortMethod::from)
                .or(section.and_then(|s| s.sort))
                .unwrap_or(defaults.sort),
            sort_together: section
                .and_then(|s| s.sort_together)
                .unwrap_or(defaults.sort_together),
            pmt_parallelism: section
                .and_then(|s| s.pmt_parallelism)
                .unwrap_or(defaults.pmt_parallelism),
            terrestrial_ladder: section.and_then(|s| s.terrestrial_ladder),
            satellite: file.satellite.clone(),
            blind_scan: section.and_then(|s| s.blind_scan),
        });
    }

    config
}
