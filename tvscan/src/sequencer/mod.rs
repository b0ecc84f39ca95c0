//! Candidate frequency list and the cursor walking it.
//!
//! The analog and digital candidates share one list. `AtvFirst` and
//! `DtvFirst` lay the two blocks out one after the other; `Adtv` merges them
//! into a single list ordered by frequency, so both blocks cover the whole
//! list and each entry is handled according to its own kind.

pub mod atv;
pub mod blind;
pub mod defaults;

use tvscan_protocol::{ScanMode, TuneParams};

use crate::config::ScanConfig;

/// Range of the candidate list belonging to one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Block {
    pub start: usize,
    pub count: usize,
}

impl Block {
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Ordered candidate list with a cursor.
#[derive(Debug, Clone)]
pub struct FrequencyPlan {
    entries: Vec<TuneParams>,
    atv: Block,
    dtv: Block,
    shared: bool,
    /// Index of the entry being tried, -1 before the first one.
    cursor: isize,
}

impl FrequencyPlan {
    pub fn build(config: &ScanConfig) -> Self {
        let atv = config
            .atv
            .as_ref()
            .map(|a| a.tune_params())
            .unwrap_or_default();
        let dtv = config
            .dtv
            .as_ref()
            .map(|d| d.tune_params())
            .unwrap_or_default();
        Self::from_lists(config.mode, atv, dtv)
    }

    pub fn from_lists(mode: ScanMode, atv: Vec<TuneParams>, dtv: Vec<TuneParams>) -> Self {
        let (atv_count, dtv_count) = (atv.len(), dtv.len());
        match mode {
            ScanMode::AtvFirst => {
                let mut entries = atv;
                entries.extend(dtv);
                Self {
                    entries,
                    atv: Block { start: 0, count: atv_count },
                    dtv: Block { start: atv_count, count: dtv_count },
                    shared: false,
                    cursor: -1,
                }
            }
            ScanMode::DtvFirst => {
                let mut entries = dtv;
                entries.extend(atv);
                Self {
                    entries,
                    atv: Block { start: dtv_count, count: atv_count },
                    dtv: Block { start: 0, count: dtv_count },
                    shared: false,
                    cursor: -1,
                }
            }
            ScanMode::Adtv => {
                let mut entries = atv;
                entries.extend(dtv);
                entries.sort_by_key(|p| p.frequency());
                let all = Block { start: 0, count: entries.len() };
                Self {
                    entries,
                    atv: all,
                    dtv: all,
                    shared: true,
                    cursor: -1,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn atv(&self) -> Block {
        self.atv
    }

    pub fn dtv(&self) -> Block {
        self.dtv
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    /// Cursor as an index, `None` before the first entry or past the end.
    pub fn index(&self) -> Option<usize> {
        usize::try_from(self.cursor)
            .ok()
            .filter(|&i| i < self.entries.len())
    }

    /// Park the cursor right before `index`; the next [`advance`](Self::advance)
    /// lands on it.
    pub fn set_cursor_before(&mut self, index: usize) {
        self.cursor = index as isize - 1;
    }

    /// Move to the next entry and return its index, or `None` past the end.
    pub fn advance(&mut self) -> Option<usize> {
        if self.cursor < self.entries.len() as isize {
            self.cursor += 1;
        }
        self.index()
    }

    pub fn entry(&self, index: usize) -> Option<&TuneParams> {
        self.entries.get(index)
    }

    pub fn current(&self) -> Option<&TuneParams> {
        self.index().and_then(|i| self.entries.get(i))
    }

    /// Retune one entry in place (analog auto search starts at min).
    pub fn set_frequency(&mut self, index: usize, frequency: u32) {
        if let Some(entry) = self.entries.get_mut(index) {
            *entry = entry.with_frequency(frequency);
        }
    }

    pub fn entries(&self) -> &[TuneParams] {
        &self.entries
    }

    /// Replace the digital block, e.g. with the transponders announced by a
    /// NIT or found by a blind scan. An analog block placed after it moves
    /// along.
    pub fn replace_dtv(&mut self, params: Vec<TuneParams>) {
        let count = params.len();
        if self.shared {
            self.entries = params;
            self.atv = Block { start: 0, count };
            self.dtv = self.atv;
            return;
        }

        let range = self.dtv.start..self.dtv.end();
        self.entries.splice(range, params);
        if self.atv.start >= self.dtv.end() && !self.atv.is_empty() {
            self.atv.start = self.dtv.start + count;
        }
        self.dtv.count = count;
    }
}
