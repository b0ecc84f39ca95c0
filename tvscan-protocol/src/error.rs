//! Error types shared by the scan engine and its front ends.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the scan engine.
///
/// Only a handful of these terminate a scan (see [`ScanError::is_fatal`]);
/// the rest are absorbed per transponder or per table and only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Rejected scan configuration.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The demultiplexer has no section filter left. The request is retried later.
    #[error("No free section filter")]
    NoFreeFilter,

    /// A single section could not be decoded.
    #[error("Failed to parse section: {0}")]
    ParseError(String),

    /// Every NIT seed frequency was tried without decoding a NIT.
    #[error("Cannot get NIT")]
    CannotGetNit,

    /// The frontend refused the tuning parameters.
    #[error("Failed to set frontend: {0}")]
    FrontendSetFailed(String),

    /// Allocation failure while creating the scanner.
    #[error("Out of memory")]
    NoMemory,

    /// The worker thread could not be spawned.
    #[error("Failed to spawn scan worker: {0}")]
    ThreadSpawn(String),

    /// Demultiplexer failure other than filter exhaustion.
    #[error("Demux error: {0}")]
    Demux(String),

    /// Persisting the result failed.
    #[error("Store error: {0}")]
    Store(String),

    /// `start` was called twice on the same handle.
    #[error("Scan already started")]
    AlreadyStarted,

    /// The handle was used after the worker exited.
    #[error("Scanner stopped")]
    Stopped,
}

impl ScanError {
    /// Numeric code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ScanError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            ScanError::NoFreeFilter => ErrorCode::NoFreeFilter,
            ScanError::ParseError(_) => ErrorCode::ParseError,
            ScanError::CannotGetNit => ErrorCode::CannotGetNit,
            ScanError::FrontendSetFailed(_) => ErrorCode::FrontendSetFailed,
            ScanError::NoMemory => ErrorCode::NoMemory,
            ScanError::ThreadSpawn(_) => ErrorCode::ThreadSpawn,
            ScanError::Demux(_) => ErrorCode::Demux,
            ScanError::Store(_) => ErrorCode::Store,
            ScanError::AlreadyStarted => ErrorCode::AlreadyStarted,
            ScanError::Stopped => ErrorCode::Stopped,
        }
    }

    /// Returns true for errors that end the scan instead of skipping one step.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidParameter(_)
                | ScanError::NoMemory
                | ScanError::ThreadSpawn(_)
                | ScanError::CannotGetNit
        )
    }
}

/// Numeric error code, used as the CLI exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    /// Operation succeeded.
    Success = 0x0000,
    /// Unknown error occurred.
    Unknown = 0x0001,
    InvalidParameter = 0x0002,
    NoFreeFilter = 0x0003,
    ParseError = 0x0004,
    CannotGetNit = 0x0005,
    FrontendSetFailed = 0x0006,
    NoMemory = 0x0007,
    ThreadSpawn = 0x0008,
    Demux = 0x0009,
    Store = 0x000A,
    AlreadyStarted = 0x000B,
    Stopped = 0x000C,
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => ErrorCode::Success,
            0x0002 => ErrorCode::InvalidParameter,
            0x0003 => ErrorCode::NoFreeFilter,
            0x0004 => ErrorCode::ParseError,
            0x0005 => ErrorCode::CannotGetNit,
            0x0006 => ErrorCode::FrontendSetFailed,
            0x0007 => ErrorCode::NoMemory,
            0x0008 => ErrorCode::ThreadSpawn,
            0x0009 => ErrorCode::Demux,
            0x000A => ErrorCode::Store,
            0x000B => ErrorCode::AlreadyStarted,
            0x000C => ErrorCode::Stopped,
            _ => ErrorCode::Unknown,
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(value: ErrorCode) -> Self {
        value as u16
    }
}

impl ErrorCode {
    /// Returns true if this error code indicates success.
    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }
}

/// Final status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndCode {
    /// At least one transponder locked.
    Ok,
    /// No frequency produced a usable frontend event.
    NoSignal,
    /// The digital pass ran but nothing locked.
    Unlocked,
}

impl EndCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndCode::Ok => "ok",
            EndCode::NoSignal => "no_signal",
            EndCode::Unlocked => "unlocked",
        }
    }
}

impl std::fmt::Display for EndCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
