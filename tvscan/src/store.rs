//! Seam between the scan worker and whatever keeps the channel list.

use serde::Serialize;
use tvscan_protocol::ScanError;

use crate::result::ScanResult;

/// Counts reported by a store after writing a scan result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub transponders: usize,
    pub services: usize,
}

/// Receives the result of a finished scan.
///
/// The worker calls [`ScanStore::persist`] at most once per scan, on its own
/// thread, between the `StoreBegin` and `StoreEnd` notifications.
pub trait ScanStore: Send {
    fn persist(&mut self, result: &ScanResult) -> Result<StoreSummary, ScanError>;
}

impl<F> ScanStore for F
where
    F: FnMut(&ScanResult) -> Result<StoreSummary, ScanError> + Send,
{
    fn persist(&mut self, result: &ScanResult) -> Result<StoreSummary, ScanError> {
        self(result)
    }
}
