//! Built-in frequency plans.

use tvscan_protocol::{Bandwidth, Modulation, TuneParams};

pub const DVBC_DEFAULT_SYMBOL_RATE: u32 = 6_875_000;
pub const DVBC_DEFAULT_MODULATION: Modulation = Modulation::Qam64;

pub const DVBT_DEFAULT_START_KHZ: u32 = 474_000;
pub const DVBT_DEFAULT_STOP_KHZ: u32 = 858_000;
pub const DVBT_DEFAULT_BANDWIDTH: Bandwidth = Bandwidth::Mhz8;

/// Satellite IF band swept by a blind scan.
pub const BLIND_SCAN_START_KHZ: u32 = 950_000;
pub const BLIND_SCAN_STOP_KHZ: u32 = 2_150_000;

/// Standard cable channel centres in kHz.
pub fn dvbc_standard_khz() -> Vec<u32> {
    let mut freqs = vec![52_500, 60_250, 68_500, 80_000, 88_000, 115_000];
    freqs.extend((123_000..=467_000).step_by(8_000));
    freqs.extend((474_000..=874_000).step_by(8_000));
    freqs
}

/// Standard cable plan, 64-QAM at 6.875 Msym/s.
pub fn dvbc_standard() -> Vec<TuneParams> {
    dvbc_standard_khz()
        .into_iter()
        .map(|khz| TuneParams::Cable {
            frequency: khz * 1000,
            symbol_rate: DVBC_DEFAULT_SYMBOL_RATE,
            modulation: DVBC_DEFAULT_MODULATION,
        })
        .collect()
}

/// Terrestrial channels from `start_khz` to `stop_khz` inclusive, spaced by
/// the channel bandwidth.
pub fn terrestrial_ladder(start_khz: u32, stop_khz: u32, bandwidth: Bandwidth) -> Vec<TuneParams> {
    let step = (bandwidth.hz() / 1000) as usize;
    (start_khz..=stop_khz)
        .step_by(step)
        .map(|khz| TuneParams::Terrestrial {
            frequency: khz * 1000,
            bandwidth,
        })
        .collect()
}

/// Standard UHF plan, 474 to 858 MHz in 8 MHz steps.
pub fn dvbt_standard() -> Vec<TuneParams> {
    terrestrial_ladder(
        DVBT_DEFAULT_START_KHZ,
        DVBT_DEFAULT_STOP_KHZ,
        DVBT_DEFAULT_BANDWIDTH,
    )
}
