//! Tuning, mode and service types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Signal source a frontend is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Analog,
    Cable,
    Terrestrial,
    Satellite,
    Atsc,
}

impl SourceKind {
    /// Stable integer stored in the database.
    pub fn code(self) -> i32 {
        match self {
            SourceKind::Analog => 0,
            SourceKind::Cable => 1,
            SourceKind::Terrestrial => 2,
            SourceKind::Satellite => 3,
            SourceKind::Atsc => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SourceKind::Analog),
            1 => Some(SourceKind::Cable),
            2 => Some(SourceKind::Terrestrial),
            3 => Some(SourceKind::Satellite),
            4 => Some(SourceKind::Atsc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Analog => "analog",
            SourceKind::Cable => "cable",
            SourceKind::Terrestrial => "terrestrial",
            SourceKind::Satellite => "satellite",
            SourceKind::Atsc => "atsc",
        }
    }
}

/// Digital modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modulation {
    Qpsk,
    Qam16,
    Qam32,
    Qam64,
    Qam128,
    Qam256,
    Vsb8,
    Vsb16,
    Auto,
}

impl Modulation {
    /// Maps the modulation field of a DVB cable delivery system descriptor.
    pub fn from_cable_descriptor(value: u8) -> Self {
        match value {
            0x01 => Modulation::Qam16,
            0x02 => Modulation::Qam32,
            0x03 => Modulation::Qam64,
            0x04 => Modulation::Qam128,
            0x05 => Modulation::Qam256,
            _ => Modulation::Auto,
        }
    }
}

/// Terrestrial channel bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    Mhz6,
    Mhz7,
    Mhz8,
}

impl Bandwidth {
    pub fn hz(self) -> u32 {
        match self {
            Bandwidth::Mhz6 => 6_000_000,
            Bandwidth::Mhz7 => 7_000_000,
            Bandwidth::Mhz8 => 8_000_000,
        }
    }

    /// Maps the bandwidth field of a DVB-T delivery system descriptor.
    pub fn from_terrestrial_descriptor(value: u8) -> Self {
        match value {
            0 => Bandwidth::Mhz8,
            1 => Bandwidth::Mhz7,
            _ => Bandwidth::Mhz6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarisation {
    Horizontal,
    Vertical,
}

impl Polarisation {
    pub fn code(self) -> i32 {
        match self {
            Polarisation::Horizontal => 0,
            Polarisation::Vertical => 1,
        }
    }
}

/// LNB local oscillator band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoBand {
    Low,
    High,
}

/// Frontend parameters for one candidate frequency.
///
/// Frequencies are in Hz, except for satellite where the intermediate
/// frequency is given in kHz as the frontend expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TuneParams {
    Analog {
        frequency: u32,
        #[serde(default)]
        audio_std: u32,
        #[serde(default)]
        video_std: u32,
    },
    Cable {
        frequency: u32,
        symbol_rate: u32,
        modulation: Modulation,
    },
    Terrestrial {
        frequency: u32,
        bandwidth: Bandwidth,
    },
    Satellite {
        frequency: u32,
        symbol_rate: u32,
        polarisation: Polarisation,
    },
    Atsc {
        frequency: u32,
        modulation: Modulation,
    },
}

impl TuneParams {
    pub fn frequency(&self) -> u32 {
        match *self {
            TuneParams::Analog { frequency, .. }
            | TuneParams::Cable { frequency, .. }
            | TuneParams::Terrestrial { frequency, .. }
            | TuneParams::Satellite { frequency, .. }
            | TuneParams::Atsc { frequency, .. } => frequency,
        }
    }

    /// Returns a copy tuned to another frequency.
    pub fn with_frequency(mut self, freq: u32) -> Self {
        match &mut self {
            TuneParams::Analog { frequency, .. }
            | TuneParams::Cable { frequency, .. }
            | TuneParams::Terrestrial { frequency, .. }
            | TuneParams::Satellite { frequency, .. }
            | TuneParams::Atsc { frequency, .. } => *frequency = freq,
        }
        self
    }

    pub fn is_analog(&self) -> bool {
        matches!(self, TuneParams::Analog { .. })
    }

    pub fn source(&self) -> SourceKind {
        match self {
            TuneParams::Analog { .. } => SourceKind::Analog,
            TuneParams::Cable { .. } => SourceKind::Cable,
            TuneParams::Terrestrial { .. } => SourceKind::Terrestrial,
            TuneParams::Satellite { .. } => SourceKind::Satellite,
            TuneParams::Atsc { .. } => SourceKind::Atsc,
        }
    }

    pub fn symbol_rate(&self) -> Option<u32> {
        match *self {
            TuneParams::Cable { symbol_rate, .. } | TuneParams::Satellite { symbol_rate, .. } => {
                Some(symbol_rate)
            }
            _ => None,
        }
    }
}

/// Digital broadcast standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtvStandard {
    Dvb,
    Isdb,
    Atsc,
}

/// Analog search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtvMode {
    /// Tune exactly the configured list.
    Fixed,
    /// Step from a start frequency in one direction, wrapping inside `[min, max]`.
    Manual,
    /// Step from min to max, stopping at max.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepDirection {
    #[default]
    Up,
    Down,
}

impl StepDirection {
    pub fn sign(self) -> i64 {
        match self {
            StepDirection::Up => 1,
            StepDirection::Down => -1,
        }
    }
}

/// Digital search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtvMode {
    /// One transponder, stored in place.
    Manual,
    /// NIT discovery at seed frequencies, then the NIT's transponders.
    Auto,
    /// Every configured frequency.
    AllBand,
    /// Satellite blind scan followed by an all-band pass.
    Blind,
}

/// Order of the analog and digital passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    AtvFirst,
    #[default]
    DtvFirst,
    /// One list; each entry is analog or digital on its own.
    Adtv,
}

/// Default channel numbering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortMethod {
    #[default]
    ScanOrder,
    ServiceId,
    Lcn,
}

/// Classified service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Unknown,
    Tv,
    Radio,
    /// Analog program found by the ATV pass.
    Atv,
    /// Raw service type not mapped to TV or radio.
    Other(u8),
}

impl ServiceType {
    pub fn code(self) -> i32 {
        match self {
            ServiceType::Unknown => 0,
            ServiceType::Tv => 1,
            ServiceType::Radio => 2,
            ServiceType::Atv => 3,
            ServiceType::Other(raw) => 0x100 + raw as i32,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ServiceType::Tv,
            2 => ServiceType::Radio,
            3 => ServiceType::Atv,
            0x100..=0x1FF => ServiceType::Other((code - 0x100) as u8),
            _ => ServiceType::Unknown,
        }
    }

    pub fn is_tv_or_radio(self) -> bool {
        matches!(self, ServiceType::Tv | ServiceType::Radio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    Mpeg1,
    Mpeg2,
    Mpeg4,
    H264,
    Hevc,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Mpeg,
    Aac,
    AacLatm,
    Ac3,
    Eac3,
    Dts,
    Lpcm,
    Unknown,
}

/// Signal quality snapshot read after a lock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalQuality {
    pub snr: i32,
    pub ber: u32,
    pub strength: i32,
}

/// Pushed frontend status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendStatus {
    pub locked: bool,
    /// Frequency the frontend reports, in the same unit as [`TuneParams::frequency`].
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LnbVoltage {
    Off,
    V13,
    V18,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tone22k {
    On,
    Off,
    #[default]
    Auto,
}

/// Unicable (EN 50494) user band assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnicableBand {
    pub user_band: u8,
    pub band_frequency_mhz: u32,
}

/// Satellite and LNB configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteParams {
    pub name: String,
    pub lnb_num: i32,
    pub lof_lo_khz: u32,
    pub lof_hi_khz: u32,
    pub lof_threshold_khz: u32,
    #[serde(default)]
    pub voltage: LnbVoltage,
    #[serde(default)]
    pub tone_22k: Tone22k,
    #[serde(default)]
    pub diseqc_committed: Option<u8>,
    #[serde(default)]
    pub diseqc_uncommitted: Option<u8>,
    #[serde(default)]
    pub motor_num: i32,
    #[serde(default)]
    pub position: i32,
    /// Orbital position in degrees, east positive.
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub unicable: Option<UnicableBand>,
}

impl SatelliteParams {
    /// Universal LNB (9750/10600 MHz, switch at 11700 MHz).
    pub fn universal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lnb_num: 0,
            lof_lo_khz: 9_750_000,
            lof_hi_khz: 10_600_000,
            lof_threshold_khz: 11_700_000,
            voltage: LnbVoltage::Auto,
            tone_22k: Tone22k::Auto,
            diseqc_committed: None,
            diseqc_uncommitted: None,
            motor_num: 0,
            position: 0,
            longitude: 0.0,
            unicable: None,
        }
    }

    /// Returns true when the LNB has one local oscillator only.
    pub fn single_lo(&self) -> bool {
        self.lof_hi_khz == self.lof_lo_khz
    }
}
