//! Section completion tracking for one SI table.
//!
//! A [`TableControl`] owns at most one demux filter. Every section the
//! filter delivers is checked against a set of [`SubtableControl`] slots,
//! one per table id extension, each holding a bitmap of the section numbers
//! still missing. Most tables use a single slot; the BAT carries one
//! subtable per bouquet and is given several.
//!
//! Completion rules:
//!
//! - single slot: complete the moment the last missing bit clears
//! - several slots: complete when a repeated section arrives, every slot is
//!   complete, and at least `repeat_distance` has passed since the first
//!   section, so that late bouquets still get a chance to show up
//! - timeout: the owner calls [`TableControl::force_complete`]

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use crate::backend::{BackendError, Demux, FilterHandle, SectionFilter, SectionSink};
use crate::ts_analyzer::{table_id, PsiHeader, SectionDecoder, SiError, SiTable};

/// Version tag of an unused subtable slot.
pub const FREE_VERSION: u8 = 0xFF;

/// The SI tables the scanner collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Pat,
    Pmt,
    Cat,
    Sdt,
    Nit,
    Bat,
    Mgt,
    Vct,
}

impl TableKind {
    pub fn name(self) -> &'static str {
        match self {
            TableKind::Pat => "PAT",
            TableKind::Pmt => "PMT",
            TableKind::Cat => "CAT",
            TableKind::Sdt => "SDT",
            TableKind::Nit => "NIT",
            TableKind::Bat => "BAT",
            TableKind::Mgt => "MGT",
            TableKind::Vct => "VCT",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reception state of one subtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtableControl {
    pub extension: u16,
    pub version: u8,
    pub last_section: u8,
    /// One bit per section number, set while the section is missing.
    mask: [u8; 32],
}

impl SubtableControl {
    pub const FREE: SubtableControl = SubtableControl {
        extension: 0,
        version: FREE_VERSION,
        last_section: 0,
        mask: [0; 32],
    };

    pub fn is_free(&self) -> bool {
        self.version == FREE_VERSION
    }

    /// True when no section of this slot is missing.
    pub fn is_complete(&self) -> bool {
        self.mask.iter().all(|&b| b == 0)
    }

    /// Number of sections still missing.
    pub fn missing(&self) -> u32 {
        self.mask.iter().map(|b| b.count_ones()).sum()
    }

    pub fn is_missing(&self, section_number: u8) -> bool {
        let n = section_number as usize;
        self.mask[n >> 3] & (0x80 >> (n & 7)) != 0
    }

    fn clear_missing(&mut self, section_number: u8) {
        let n = section_number as usize;
        self.mask[n >> 3] &= !(0x80 >> (n & 7));
    }

    fn claim(&mut self, extension: u16, version: u8, last_section: u8) {
        self.extension = extension;
        self.version = version;
        self.last_section = last_section;
        self.mask = [0; 32];
        for n in 0..=last_section as usize {
            self.mask[n >> 3] |= 0x80 >> (n & 7);
        }
    }

    fn matches(&self, header: &PsiHeader) -> bool {
        self.extension == header.table_id_extension
            && self.version == header.version_number
            && self.last_section == header.last_section_number
    }
}

/// What happened to a delivered section.
#[derive(Debug)]
pub enum SectionOutcome {
    /// Not a long-form section.
    Ignored,
    /// Already recorded. `complete` is set when this repeat finishes a
    /// multi-subtable table.
    Repeat { complete: bool },
    /// Decoded and recorded.
    Accepted { table: SiTable, complete: bool },
}

/// Reasons a delivered section was dropped.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("no free subtable slot for extension {0:#06x}")]
    NoFreeSubtable(u16),

    #[error(transparent)]
    Decode(#[from] SiError),
}

/// Reception controller for one SI table.
#[derive(Debug)]
pub struct TableControl {
    kind: TableKind,
    pid: u16,
    table_id: u8,
    /// Table id extension matched by the filter (PMT program number).
    extension: Option<u16>,
    timeout: Duration,
    repeat_distance: Duration,
    subtables: Vec<SubtableControl>,
    filter: Option<FilterHandle>,
    /// Identifies the sink of the current filter; sections carrying an
    /// older ticket belong to a freed filter.
    ticket: u64,
    deadline: Option<Instant>,
    data_arrived: Option<Instant>,
}

impl TableControl {
    /// Controller with a single subtable slot.
    pub fn new(kind: TableKind, pid: u16, table_id: u8, timeout: Duration) -> Self {
        Self::with_subtables(kind, pid, table_id, timeout, 1, Duration::ZERO)
    }

    /// Controller with `subtables` slots (at least one).
    pub fn with_subtables(
        kind: TableKind,
        pid: u16,
        table_id: u8,
        timeout: Duration,
        subtables: usize,
        repeat_distance: Duration,
    ) -> Self {
        Self {
            kind,
            pid,
            table_id,
            extension: None,
            timeout,
            repeat_distance,
            subtables: vec![SubtableControl::FREE; subtables.max(1)],
            filter: None,
            ticket: 0,
            deadline: None,
            data_arrived: None,
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    pub fn extension(&self) -> Option<u16> {
        self.extension
    }

    /// Point the controller at another PID and extension (PMT slots).
    pub fn set_target(&mut self, pid: u16, extension: Option<u16>) {
        self.pid = pid;
        self.extension = extension;
    }

    /// Switch the table id (TVCT vs CVCT).
    pub fn set_table_id(&mut self, table_id: u8) {
        self.table_id = table_id;
    }

    pub fn subtables(&self) -> &[SubtableControl] {
        &self.subtables
    }

    pub fn filter(&self) -> Option<FilterHandle> {
        self.filter
    }

    pub fn is_receiving(&self) -> bool {
        self.filter.is_some()
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn data_arrived(&self) -> Option<Instant> {
        self.data_arrived
    }

    /// Forget every recorded section.
    pub fn reset(&mut self) {
        self.subtables.fill(SubtableControl::FREE);
        self.data_arrived = None;
    }

    /// True when every claimed slot is complete. A controller that has not
    /// claimed any slot yet counts as complete.
    pub fn is_complete(&self) -> bool {
        self.subtables
            .iter()
            .filter(|s| !s.is_free())
            .all(|s| s.is_complete())
    }

    /// Allocate and start a filter for this table, replacing any running
    /// one. Recorded sections are forgotten and the timeout is armed.
    pub fn start(
        &mut self,
        demux: &dyn Demux,
        ticket: u64,
        sink: SectionSink,
        now: Instant,
    ) -> Result<(), BackendError> {
        self.stop(demux);
        self.reset();

        let extension = if self.table_id == table_id::PMT {
            self.extension
        } else {
            None
        };
        let params = SectionFilter::for_table(self.pid, self.table_id, extension);

        let handle = demux.alloc_filter(&params)?;
        if let Err(e) = demux
            .set_callback(handle, sink)
            .and_then(|_| demux.start(handle))
        {
            if let Err(free_err) = demux.free(handle) {
                warn!("TableControl[{}]: Failed to free filter {}: {}", self.kind, handle, free_err);
            }
            return Err(e);
        }

        debug!(
            "TableControl[{}]: Started filter {} on PID 0x{:04X}, table 0x{:02X}",
            self.kind, handle, self.pid, self.table_id
        );
        self.filter = Some(handle);
        self.ticket = ticket;
        self.deadline = Some(now + self.timeout);
        Ok(())
    }

    /// Free the filter and wait until the demux guarantees that no more
    /// sections are delivered for it.
    pub fn stop(&mut self, demux: &dyn Demux) {
        self.deadline = None;
        if let Some(handle) = self.filter.take() {
            if let Err(e) = demux.free(handle) {
                warn!("TableControl[{}]: Failed to free filter {}: {}", self.kind, handle, e);
            }
            demux.sync();
            debug!("TableControl[{}]: Stopped filter {}", self.kind, handle);
        }
    }

    /// Returns true once the armed deadline has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }

    /// Treat the table as complete regardless of missing sections.
    pub fn force_complete(&mut self, now: Instant) {
        for slot in self.subtables.iter_mut().filter(|s| !s.is_free()) {
            slot.mask = [0; 32];
        }
        self.data_arrived.get_or_insert(now);
        self.deadline = None;
    }

    fn is_received(&self, header: &PsiHeader) -> bool {
        self.subtables.iter().any(|s| {
            s.matches(header) && !s.is_missing(header.section_number)
        })
    }

    fn find_slot(&self, extension: u16) -> Option<usize> {
        self.subtables
            .iter()
            .position(|s| !s.is_free() && s.extension == extension)
            .or_else(|| self.subtables.iter().position(|s| s.is_free()))
    }

    fn mark(&mut self, slot: usize, header: &PsiHeader, now: Instant) {
        let sub = &mut self.subtables[slot];
        if !sub.is_free() && !sub.matches(header) {
            debug!(
                "TableControl[{}]: Subtable 0x{:04X} changed (version {} -> {}), restarting",
                self.kind, sub.extension, sub.version, header.version_number
            );
            *sub = SubtableControl::FREE;
        }
        if sub.is_free() {
            sub.claim(
                header.table_id_extension,
                header.version_number,
                header.last_section_number,
            );
        }
        sub.clear_missing(header.section_number);
        self.data_arrived.get_or_insert(now);
    }

    /// Process one delivered section.
    pub fn on_section(
        &mut self,
        raw: &[u8],
        decoder: &dyn SectionDecoder,
        now: Instant,
    ) -> Result<SectionOutcome, SectionError> {
        let header = PsiHeader::parse(raw)?;
        if !header.section_syntax_indicator {
            debug!("TableControl[{}]: Skipping short-form section", self.kind);
            return Ok(SectionOutcome::Ignored);
        }

        if self.is_received(&header) {
            debug!(
                "TableControl[{}]: Section {} of 0x{:04X} repeated",
                self.kind, header.section_number, header.table_id_extension
            );
            let complete = self.subtables.len() > 1
                && self.is_complete()
                && self
                    .data_arrived
                    .map(|t| now.saturating_duration_since(t) >= self.repeat_distance)
                    .unwrap_or(false);
            return Ok(SectionOutcome::Repeat { complete });
        }

        let slot = self
            .find_slot(header.table_id_extension)
            .ok_or(SectionError::NoFreeSubtable(header.table_id_extension))?;
        let table = decoder.decode(raw)?;
        self.mark(slot, &header, now);

        debug!(
            "TableControl[{}]: Section {}/{} of 0x{:04X} arrived",
            self.kind, header.section_number, header.last_section_number, header.table_id_extension
        );

        let complete = self.subtables.len() == 1 && self.is_complete();
        Ok(SectionOutcome::Accepted { table, complete })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ts_analyzer::{build_section, SiDecoder};
    use std::sync::{Arc, Mutex};

    /// Demux that records calls and hands out sequential handles.
    #[derive(Default)]
    pub(crate) struct RecordingDemux {
        pub calls: Mutex<Vec<String>>,
        pub filters: Mutex<Vec<(FilterHandle, SectionFilter)>>,
        pub capacity: Mutex<Option<usize>>,
        next: Mutex<u32>,
    }

    impl RecordingDemux {
        pub fn with_capacity(capacity: usize) -> Self {
            let demux = Self::default();
            *demux.capacity.lock().unwrap() = Some(capacity);
            demux
        }

        pub fn active(&self) -> usize {
            self.filters.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Demux for RecordingDemux {
        fn alloc_filter(&self, filter: &SectionFilter) -> Result<FilterHandle, BackendError> {
            let mut filters = self.filters.lock().unwrap();
            if let Some(cap) = *self.capacity.lock().unwrap() {
                if filters.len() >= cap {
                    return Err(BackendError::NoFreeFilter);
                }
            }
            let mut next = self.next.lock().unwrap();
            *next += 1;
            let handle = FilterHandle(*next);
            filters.push((handle, *filter));
            self.calls
                .lock()
                .unwrap()
                .push(format!("alloc pid=0x{:04X} tid=0x{:02X}", filter.pid, filter.filter[0]));
            Ok(handle)
        }

        fn set_callback(&self, _handle: FilterHandle, _sink: SectionSink) -> Result<(), BackendError> {
            Ok(())
        }

        fn start(&self, _handle: FilterHandle) -> Result<(), BackendError> {
            Ok(())
        }

        fn free(&self, handle: FilterHandle) -> Result<(), BackendError> {
            self.filters.lock().unwrap().retain(|(h, _)| *h != handle);
            self.calls.lock().unwrap().push(format!("free {}", handle));
            Ok(())
        }

        fn sync(&self) {
            self.calls.lock().unwrap().push("sync".to_string());
        }
    }

    fn noop_sink() -> SectionSink {
        Arc::new(|_: &[u8]| {})
    }

    fn pat_section(version: u8, section: u8, last: u8) -> Vec<u8> {
        build_section(table_id::PAT, 0x0001, version, section, last, &[0x00, 0x65, 0xE1, 0x00])
    }

    fn bat_section(bouquet: u16, section: u8, last: u8) -> Vec<u8> {
        // empty bouquet descriptors and transport stream loop
        build_section(table_id::BAT, bouquet, 0, section, last, &[0xF0, 0x00, 0xF0, 0x00])
    }

    fn accepted_complete(outcome: SectionOutcome) -> Option<bool> {
        match outcome {
            SectionOutcome::Accepted { complete, .. } => Some(complete),
            _ => None,
        }
    }

    #[test]
    fn test_completion_any_order_with_duplicates() {
        let decoder = SiDecoder::new();
        let now = Instant::now();
        let mut ctl = TableControl::new(TableKind::Pat, 0, table_id::PAT, Duration::from_secs(6));

        let order = [2u8, 0, 2, 0, 3, 1, 3];
        let mut completions = 0;
        for n in order {
            match ctl.on_section(&pat_section(1, n, 3), &decoder, now).unwrap() {
                SectionOutcome::Accepted { complete, .. } => {
                    if complete {
                        completions += 1;
                    }
                }
                SectionOutcome::Repeat { complete } => assert!(!complete),
                SectionOutcome::Ignored => panic!("long-form section ignored"),
            }
        }
        assert_eq!(completions, 1);
        assert!(ctl.is_complete());

        // the table stays complete, repeats never complete it again
        let again = ctl.on_section(&pat_section(1, 1, 3), &decoder, now).unwrap();
        assert!(matches!(again, SectionOutcome::Repeat { complete: false }));
    }

    #[test]
    fn test_version_change_resets_slot() {
        let decoder = SiDecoder::new();
        let now = Instant::now();
        let mut ctl = TableControl::new(TableKind::Pat, 0, table_id::PAT, Duration::from_secs(6));

        ctl.on_section(&pat_section(1, 0, 2), &decoder, now).unwrap();
        ctl.on_section(&pat_section(1, 1, 2), &decoder, now).unwrap();
        assert_eq!(ctl.subtables()[0].missing(), 1);

        // new version, section 2 of 0..=4
        let outcome = ctl.on_section(&pat_section(2, 2, 4), &decoder, now).unwrap();
        assert_eq!(accepted_complete(outcome), Some(false));
        let slot = ctl.subtables()[0];
        assert_eq!(slot.version, 2);
        assert_eq!(slot.last_section, 4);
        assert_eq!(slot.missing(), 4);
        assert!(slot.is_missing(0));
        assert!(slot.is_missing(1));
        assert!(!slot.is_missing(2));
    }

    #[test]
    fn test_short_form_section_ignored() {
        let decoder = SiDecoder::new();
        let mut ctl = TableControl::new(TableKind::Pat, 0, table_id::PAT, Duration::from_secs(6));
        let mut raw = pat_section(0, 0, 0);
        raw[1] &= 0x7F;
        assert!(matches!(
            ctl.on_section(&raw, &decoder, Instant::now()).unwrap(),
            SectionOutcome::Ignored
        ));
        assert!(ctl.subtables()[0].is_free());
    }

    #[test]
    fn test_decode_error_leaves_section_missing() {
        let decoder = SiDecoder::new();
        let now = Instant::now();
        let mut ctl = TableControl::new(TableKind::Pat, 0, table_id::PAT, Duration::from_secs(6));
        let mut raw = pat_section(0, 0, 0);
        raw[9] ^= 0xFF;

        assert!(matches!(
            ctl.on_section(&raw, &decoder, now),
            Err(SectionError::Decode(SiError::CrcMismatch { .. }))
        ));
        assert!(ctl.subtables()[0].is_free());
        assert!(ctl.data_arrived().is_none());

        let outcome = ctl.on_section(&pat_section(0, 0, 0), &decoder, now).unwrap();
        assert_eq!(accepted_complete(outcome), Some(true));
    }

    #[test]
    fn test_repeat_distance_debounce() {
        let decoder = SiDecoder::new();
        let t0 = Instant::now();
        let mut ctl = TableControl::with_subtables(
            TableKind::Bat,
            0x11,
            table_id::BAT,
            Duration::from_secs(10),
            4,
            Duration::from_secs(3),
        );

        // two bouquets, both single-section
        let first = ctl.on_section(&bat_section(0x0001, 0, 0), &decoder, t0).unwrap();
        assert_eq!(accepted_complete(first), Some(false));
        let second = ctl.on_section(&bat_section(0x0002, 0, 0), &decoder, t0).unwrap();
        assert_eq!(accepted_complete(second), Some(false));
        assert!(ctl.is_complete());

        // a repeat before the distance elapsed does not complete
        let early = ctl
            .on_section(&bat_section(0x0001, 0, 0), &decoder, t0 + Duration::from_secs(2))
            .unwrap();
        assert!(matches!(early, SectionOutcome::Repeat { complete: false }));

        // a third bouquet starts; its slot is incomplete until section 1 shows up
        ctl.on_section(&bat_section(0x0003, 0, 1), &decoder, t0 + Duration::from_secs(3))
            .unwrap();
        let pending = ctl
            .on_section(&bat_section(0x0001, 0, 0), &decoder, t0 + Duration::from_secs(4))
            .unwrap();
        assert!(matches!(pending, SectionOutcome::Repeat { complete: false }));

        ctl.on_section(&bat_section(0x0003, 1, 1), &decoder, t0 + Duration::from_secs(4))
            .unwrap();
        let done = ctl
            .on_section(&bat_section(0x0002, 0, 0), &decoder, t0 + Duration::from_secs(5))
            .unwrap();
        assert!(matches!(done, SectionOutcome::Repeat { complete: true }));
    }

    #[test]
    fn test_no_free_subtable() {
        let decoder = SiDecoder::new();
        let now = Instant::now();
        let mut single = TableControl::new(TableKind::Sdt, 0x11, table_id::BAT, Duration::from_secs(6));
        single.on_section(&bat_section(0x0001, 0, 1), &decoder, now).unwrap();
        assert!(matches!(
            single.on_section(&bat_section(0x0002, 0, 0), &decoder, now),
            Err(SectionError::NoFreeSubtable(0x0002))
        ));
        assert_eq!(single.subtables()[0].extension, 0x0001);

        let mut full = TableControl::with_subtables(
            TableKind::Bat,
            0x11,
            table_id::BAT,
            Duration::from_secs(10),
            2,
            Duration::from_secs(3),
        );
        full.on_section(&bat_section(0x0001, 0, 0), &decoder, now).unwrap();
        full.on_section(&bat_section(0x0002, 0, 0), &decoder, now).unwrap();
        assert!(matches!(
            full.on_section(&bat_section(0x0003, 0, 0), &decoder, now),
            Err(SectionError::NoFreeSubtable(0x0003))
        ));
    }

    #[test]
    fn test_timeout_forces_completion_and_stop_frees_filter() {
        let demux = RecordingDemux::default();
        let t0 = Instant::now();
        let mut ctl = TableControl::with_subtables(
            TableKind::Bat,
            0x11,
            table_id::BAT,
            Duration::from_secs(10),
            32,
            Duration::from_secs(3),
        );
        ctl.start(&demux, 7, noop_sink(), t0).unwrap();
        assert!(ctl.is_receiving());
        assert_eq!(ctl.ticket(), 7);
        assert!(!ctl.is_expired(t0 + Duration::from_secs(9)));
        assert!(ctl.is_expired(t0 + Duration::from_secs(10)));

        ctl.force_complete(t0 + Duration::from_secs(10));
        assert!(ctl.is_complete());
        assert!(ctl.deadline().is_none());
        assert!(ctl.data_arrived().is_some());

        ctl.stop(&demux);
        assert!(!ctl.is_receiving());
        assert_eq!(demux.active(), 0);
        let calls = demux.calls();
        assert_eq!(calls.last().map(String::as_str), Some("sync"));
    }

    #[test]
    fn test_pmt_filter_carries_program_number() {
        let demux = RecordingDemux::default();
        let mut ctl = TableControl::new(TableKind::Pmt, 0x1FFF, table_id::PMT, Duration::from_secs(3));
        ctl.set_target(0x0100, Some(0x0065));
        ctl.start(&demux, 1, noop_sink(), Instant::now()).unwrap();

        let filters = demux.filters.lock().unwrap();
        let (_, params) = filters[0];
        assert_eq!(params.pid, 0x0100);
        assert_eq!(params.filter[..4], [0x02, 0x00, 0x65, 0x01]);
        assert_eq!(params.mask[..4], [0xFF, 0xFF, 0xFF, 0x01]);
    }

    #[test]
    fn test_start_without_free_filter() {
        let demux = RecordingDemux::with_capacity(0);
        let mut ctl = TableControl::new(TableKind::Cat, 1, table_id::CAT, Duration::from_secs(3));
        assert!(matches!(
            ctl.start(&demux, 1, noop_sink(), Instant::now()),
            Err(BackendError::NoFreeFilter)
        ));
        assert!(!ctl.is_receiving());
        assert!(ctl.deadline().is_none());
    }
}
