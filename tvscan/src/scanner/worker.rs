use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use log::{debug, error, info, warn};
use tvscan_protocol::ScanError;

use crate::config::ScanConfig;
use crate::result::ScanResult;
use crate::store::{ScanStore, StoreSummary};

use super::engine::{Engine, ScanBackend};
use super::events::{ProgressSink, ScanProgress};
use super::mailbox::Mailbox;

/// What the worker hands back when it exits.
#[derive(Debug)]
pub struct ScanOutcome {
    pub result: ScanResult,
    /// Set when the result was persisted.
    pub stored: Option<StoreSummary>,
}

/// Handle of a scan running on its own worker thread.
///
/// Dropping the handle without [`ScanHandle::destroy`] asks the worker to
/// quit without storing and detaches it.
pub struct ScanHandle {
    mailbox: Arc<Mailbox>,
    started: bool,
    worker: Option<JoinHandle<Result<ScanOutcome, ScanError>>>,
}

impl ScanHandle {
    /// Validate `config` and spawn the worker. The scan waits for
    /// [`ScanHandle::start`].
    pub fn create(
        config: ScanConfig,
        backend: ScanBackend,
        progress: ProgressSink,
        store: Option<Box<dyn ScanStore>>,
    ) -> Result<Self, ScanError> {
        config.validate()?;

        let mailbox = Arc::new(Mailbox::new());
        let engine = Engine::new(config, backend, Arc::clone(&mailbox), Arc::clone(&progress));

        let worker_mailbox = Arc::clone(&mailbox);
        let worker = std::thread::Builder::new()
            .name("tvscan-worker".to_string())
            .spawn(move || run(engine, worker_mailbox, progress, store))
            .map_err(|e| ScanError::ThreadSpawn(e.to_string()))?;
        debug!("Scanner: Worker spawned");

        Ok(Self {
            mailbox,
            started: false,
            worker: Some(worker),
        })
    }

    pub fn start(&mut self) -> Result<(), ScanError> {
        if self.worker.is_none() {
            return Err(ScanError::Stopped);
        }
        if self.started {
            return Err(ScanError::AlreadyStarted);
        }
        self.started = true;
        self.mailbox.post_start();
        Ok(())
    }

    /// Stop the scan and wait for the worker. With `store` set the result
    /// is persisted before the worker exits.
    pub fn destroy(mut self, store: bool) -> Result<ScanOutcome, ScanError> {
        let worker = self.worker.take().ok_or(ScanError::Stopped)?;
        self.mailbox.post_quit(store);
        match worker.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Scanner: Worker panicked");
                Err(ScanError::Stopped)
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        if self.worker.take().is_some() {
            self.mailbox.post_quit(false);
        }
    }
}

fn run(
    mut engine: Engine,
    mailbox: Arc<Mailbox>,
    progress: ProgressSink,
    store: Option<Box<dyn ScanStore>>,
) -> Result<ScanOutcome, ScanError> {
    let persist = loop {
        let deadline = engine.check_timeouts(Instant::now());
        let batch = mailbox.wait(deadline);
        if batch.is_empty() {
            continue;
        }
        if let Some(persist) = engine.handle_batch(batch, Instant::now()) {
            break persist;
        }
    };

    info!(
        "Scanner: Quit requested (finished={}, store={})",
        engine.is_finished(),
        persist
    );
    engine.shutdown();
    let result = engine.into_result();

    let stored = match (persist, store) {
        (true, Some(mut store)) => {
            progress(&ScanProgress::StoreBegin);
            let summary = store.persist(&result);
            progress(&ScanProgress::StoreEnd);
            Some(summary?)
        }
        (true, None) => {
            warn!("Scanner: Store requested but no store configured");
            None
        }
        (false, _) => None,
    };

    Ok(ScanOutcome { result, stored })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::replay::ReplayBackend;
    use crate::config::DtvConfig;
    use crate::ts_analyzer::SiDecoder;
    use std::sync::mpsc;
    use std::time::Duration;
    use tvscan_protocol::{Bandwidth, DtvMode, EndCode, ScanMode, SourceKind, TuneParams};

    fn manual_config(frequency: u32) -> ScanConfig {
        ScanConfig {
            mode: ScanMode::DtvFirst,
            atv: None,
            dtv: Some(DtvConfig {
                source: SourceKind::Terrestrial,
                mode: DtvMode::Manual,
                frequencies: vec![TuneParams::Terrestrial {
                    frequency,
                    bandwidth: Bandwidth::Mhz8,
                }],
                ..DtvConfig::default()
            }),
            ..ScanConfig::default()
        }
    }

    fn replay_backend() -> ScanBackend {
        let replay = ReplayBackend::open(std::env::temp_dir()).unwrap();
        ScanBackend {
            frontend: replay.clone(),
            demux: replay,
            decoder: Arc::new(SiDecoder::new()),
        }
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let result = ScanHandle::create(
            ScanConfig::default(),
            replay_backend(),
            crate::scanner::discard_progress(),
            None,
        );
        assert!(matches!(result, Err(ScanError::InvalidParameter(_))));
    }

    #[test]
    fn test_worker_runs_and_stores() {
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let progress: ProgressSink = Arc::new(move |event: &ScanProgress| {
            let _ = tx.lock().send(event.clone());
        });

        let (stored_tx, stored_rx) = mpsc::channel();
        let store = move |result: &ScanResult| -> Result<StoreSummary, ScanError> {
            let _ = stored_tx.send(result.end_code);
            Ok(StoreSummary::default())
        };

        // No capture exists for this frequency, so the scan ends unlocked.
        let mut handle = ScanHandle::create(
            manual_config(1_234_567),
            replay_backend(),
            progress,
            Some(Box::new(store)),
        )
        .unwrap();
        handle.start().unwrap();
        assert!(matches!(handle.start(), Err(ScanError::AlreadyStarted)));

        let mut events = Vec::new();
        loop {
            let event = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            let end = matches!(event, ScanProgress::ScanEnd(_));
            events.push(event);
            if end {
                break;
            }
        }
        assert_eq!(events.first(), Some(&ScanProgress::ScanBegin));

        let outcome = handle.destroy(true).unwrap();
        assert_eq!(outcome.stored, Some(StoreSummary::default()));
        assert_eq!(outcome.result.end_code, EndCode::Unlocked);
        assert_eq!(stored_rx.recv().unwrap(), EndCode::Unlocked);

        let tail: Vec<ScanProgress> = rx.try_iter().collect();
        assert!(tail.ends_with(&[ScanProgress::StoreBegin, ScanProgress::StoreEnd]));
    }

    #[test]
    fn test_destroy_without_start() {
        let handle = ScanHandle::create(
            manual_config(1_234_567),
            replay_backend(),
            crate::scanner::discard_progress(),
            None,
        )
        .unwrap();
        let outcome = handle.destroy(false).unwrap();
        assert!(outcome.stored.is_none());
        assert!(outcome.result.transponders.is_empty());
    }
}
