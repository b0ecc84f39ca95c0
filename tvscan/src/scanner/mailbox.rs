//! Event queue between the backend callbacks and the scan worker.
//!
//! Callbacks only push into the mailbox and signal the condition variable.
//! The worker drains everything pending into a [`Batch`] and handles it
//! without holding the lock, so a callback blocked on the lock never waits
//! for protocol work.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tvscan_protocol::FrontendStatus;

use crate::backend::BlindScanEvent;

#[derive(Debug, Default)]
struct Pending {
    start: bool,
    /// Quit request; the flag tells whether the result is stored.
    quit: Option<bool>,
    /// Only the latest frontend status is kept.
    frontend: Option<FrontendStatus>,
    sections: VecDeque<(u64, Vec<u8>)>,
    blind: VecDeque<(u64, BlindScanEvent)>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        !self.start
            && self.quit.is_none()
            && self.frontend.is_none()
            && self.sections.is_empty()
            && self.blind.is_empty()
    }
}

/// Events taken out of the mailbox in one go.
#[derive(Debug, Default)]
pub struct Batch {
    pub start: bool,
    pub quit: Option<bool>,
    pub frontend: Option<FrontendStatus>,
    /// Raw sections tagged with the ticket of the filter that delivered them.
    pub sections: Vec<(u64, Vec<u8>)>,
    /// Blind scan events tagged with the ticket of the sweep.
    pub blind: Vec<(u64, BlindScanEvent)>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        !self.start
            && self.quit.is_none()
            && self.frontend.is_none()
            && self.sections.is_empty()
            && self.blind.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Mailbox {
    pending: Mutex<Pending>,
    cond: Condvar,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_start(&self) {
        self.pending.lock().start = true;
        self.cond.notify_one();
    }

    pub fn post_quit(&self, store: bool) {
        self.pending.lock().quit = Some(store);
        self.cond.notify_one();
    }

    pub fn post_frontend(&self, status: FrontendStatus) {
        self.pending.lock().frontend = Some(status);
        self.cond.notify_one();
    }

    pub fn post_section(&self, ticket: u64, section: &[u8]) {
        self.pending.lock().sections.push_back((ticket, section.to_vec()));
        self.cond.notify_one();
    }

    pub fn post_blind(&self, ticket: u64, event: BlindScanEvent) {
        self.pending.lock().blind.push_back((ticket, event));
        self.cond.notify_one();
    }

    /// Take everything pending, waiting until `deadline` (or forever when
    /// `None`) if the mailbox is empty. Returns an empty batch on timeout.
    pub fn wait(&self, deadline: Option<Instant>) -> Batch {
        let mut pending = self.pending.lock();
        while pending.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut pending),
            }
        }
        Self::drain(&mut pending)
    }

    /// Take everything pending without waiting.
    pub fn take(&self) -> Batch {
        Self::drain(&mut self.pending.lock())
    }

    fn drain(pending: &mut Pending) -> Batch {
        Batch {
            start: std::mem::take(&mut pending.start),
            quit: pending.quit.take(),
            frontend: pending.frontend.take(),
            sections: pending.sections.drain(..).collect(),
            blind: pending.blind.drain(..).collect(),
        }
    }
}
