//! Shared types for the tvscan channel scan engine.
//!
//! This crate holds the plain data exchanged between the engine
//! (`tvscan`) and its front ends: tuning parameters, scan modes,
//! service classification and the error taxonomy.
//!
//! ```rust
//! use tvscan_protocol::{Bandwidth, ScanError, TuneParams};
//!
//! let params = TuneParams::Terrestrial { frequency: 474_000_000, bandwidth: Bandwidth::Mhz8 };
//! assert_eq!(params.frequency(), 474_000_000);
//!
//! let err = ScanError::CannotGetNit;
//! assert!(err.is_fatal());
//! ```

pub mod error;
pub mod types;

pub use error::{EndCode, ErrorCode, ScanError};
pub use types::{
    AtvMode, AudioFormat, Bandwidth, DtvMode, DtvStandard, FrontendStatus, LnbVoltage, LoBand,
    Modulation, Polarisation, SatelliteParams, ScanMode, ServiceType, SignalQuality, SortMethod,
    SourceKind, StepDirection, Tone22k, TuneParams, UnicableBand, VideoFormat,
};
