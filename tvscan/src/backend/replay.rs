//! Backend replaying captured transport streams.
//!
//! A capture directory holds one file per frequency, named `<frequency>.ts`
//! with the frequency as given in the tune parameters. Tuning a frequency
//! that has a capture reports lock; any other frequency reports no lock.
//! Every started filter gets a feeder thread that loops over the capture,
//! reassembles sections on the filter PID and delivers the ones passing the
//! filter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tvscan_protocol::{FrontendStatus, SignalQuality, TuneParams};

use super::{BackendError, Demux, FilterHandle, Frontend, SectionFilter, SectionSink, StatusSink};
use crate::ts_analyzer::{crc32_mpeg2, SectionCollector, TsPacketIterator};

/// Pause between two passes over a capture.
const LOOP_PAUSE: Duration = Duration::from_millis(100);

/// Maximum number of filters running at once.
const MAX_FILTERS: usize = 32;

struct FilterSlot {
    filter: SectionFilter,
    sink: Option<SectionSink>,
    stop: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

/// Frontend and demux serving a directory of TS captures.
pub struct ReplayBackend {
    dir: PathBuf,
    status_sink: Mutex<Option<StatusSink>>,
    /// Capture of the tuned frequency, empty when nothing locked.
    capture: Mutex<Bytes>,
    filters: Mutex<HashMap<FilterHandle, FilterSlot>>,
    /// Feeders of freed filters not joined yet.
    retired: Mutex<Vec<JoinHandle<()>>>,
    next_handle: AtomicU32,
}

impl ReplayBackend {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Arc<Self>, BackendError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("capture directory {} not found", dir.display()),
            )));
        }
        info!("Replay: Serving captures from {}", dir.display());

        Ok(Arc::new(Self {
            dir,
            status_sink: Mutex::new(None),
            capture: Mutex::new(Bytes::new()),
            filters: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            next_handle: AtomicU32::new(1),
        }))
    }

    /// Path of the capture for a frequency.
    pub fn capture_path(&self, frequency: u32) -> PathBuf {
        self.dir.join(format!("{}.ts", frequency))
    }

    fn report(&self, status: FrontendStatus) {
        let sink = self.status_sink.lock().clone();
        if let Some(sink) = sink {
            sink(status);
        }
    }
}

impl Frontend for ReplayBackend {
    fn subscribe(&self, sink: StatusSink) {
        *self.status_sink.lock() = Some(sink);
    }

    fn unsubscribe(&self) {
        *self.status_sink.lock() = None;
    }

    fn tune(&self, params: &TuneParams) -> Result<(), BackendError> {
        let frequency = params.frequency();
        let path = self.capture_path(frequency);

        let capture = match std::fs::read(&path) {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Bytes::new(),
            Err(e) => return Err(e.into()),
        };
        let locked = !capture.is_empty();
        debug!(
            "Replay: Tuned {} ({} bytes, locked={})",
            frequency,
            capture.len(),
            locked
        );
        *self.capture.lock() = capture;

        self.report(FrontendStatus { locked, frequency });
        Ok(())
    }

    fn signal_quality(&self) -> SignalQuality {
        if self.capture.lock().is_empty() {
            SignalQuality::default()
        } else {
            SignalQuality {
                snr: 300,
                ber: 0,
                strength: 100,
            }
        }
    }
}

impl Demux for ReplayBackend {
    fn alloc_filter(&self, filter: &SectionFilter) -> Result<FilterHandle, BackendError> {
        let mut filters = self.filters.lock();
        if filters.len() >= MAX_FILTERS {
            return Err(BackendError::NoFreeFilter);
        }
        let handle = FilterHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        filters.insert(
            handle,
            FilterSlot {
                filter: *filter,
                sink: None,
                stop: Arc::new(AtomicBool::new(false)),
                feeder: None,
            },
        );
        Ok(handle)
    }

    fn set_callback(&self, handle: FilterHandle, sink: SectionSink) -> Result<(), BackendError> {
        let mut filters = self.filters.lock();
        let slot = filters
            .get_mut(&handle)
            .ok_or(BackendError::UnknownFilter(handle))?;
        slot.sink = Some(sink);
        Ok(())
    }

    fn start(&self, handle: FilterHandle) -> Result<(), BackendError> {
        let capture = self.capture.lock().clone();
        let mut filters = self.filters.lock();
        let slot = filters
            .get_mut(&handle)
            .ok_or(BackendError::UnknownFilter(handle))?;
        if slot.feeder.is_some() {
            return Ok(());
        }
        let Some(sink) = slot.sink.clone() else {
            warn!("Replay: Filter {} started without callback", handle);
            return Ok(());
        };

        let filter = slot.filter;
        let stop = Arc::clone(&slot.stop);
        let feeder = std::thread::Builder::new()
            .name(format!("replay-filter-{}", handle.0))
            .spawn(move || feed(capture, filter, sink, stop))?;
        slot.feeder = Some(feeder);
        Ok(())
    }

    fn free(&self, handle: FilterHandle) -> Result<(), BackendError> {
        let slot = self
            .filters
            .lock()
            .remove(&handle)
            .ok_or(BackendError::UnknownFilter(handle))?;
        slot.stop.store(true, Ordering::SeqCst);
        if let Some(feeder) = slot.feeder {
            self.retired.lock().push(feeder);
        }
        Ok(())
    }

    fn sync(&self) {
        let retired: Vec<JoinHandle<()>> = std::mem::take(&mut *self.retired.lock());
        for feeder in retired {
            if feeder.join().is_err() {
                warn!("Replay: Feeder thread panicked");
            }
        }
    }
}

impl Drop for ReplayBackend {
    fn drop(&mut self) {
        for slot in self.filters.get_mut().values() {
            slot.stop.store(true, Ordering::SeqCst);
        }
    }
}

/// Loop over the capture until stopped, delivering matching sections.
fn feed(capture: Bytes, filter: SectionFilter, sink: SectionSink, stop: Arc<AtomicBool>) {
    if capture.is_empty() {
        return;
    }

    while !stop.load(Ordering::SeqCst) {
        let mut collector = SectionCollector::new();
        for packet in TsPacketIterator::new(&capture) {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            if packet.header.pid != filter.pid || packet.header.transport_error {
                continue;
            }
            let sections = collector.push(
                packet.payload,
                packet.header.continuity_counter,
                packet.header.payload_unit_start,
            );
            for section in sections {
                if !filter.matches(&section) {
                    continue;
                }
                if filter.check_crc && crc32_mpeg2(&section) != 0 {
                    debug!("Replay: Dropping section with bad CRC on PID 0x{:04X}", filter.pid);
                    continue;
                }
                sink(&section);
            }
        }
        std::thread::sleep(LOOP_PAUSE);
    }
}
