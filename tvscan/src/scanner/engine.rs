//! Scan state machine.
//!
//! The [`Engine`] is owned by the worker thread and never shared. Backend
//! callbacks reach it only through the [`Mailbox`]: the worker drains a
//! [`Batch`] and hands it to [`Engine::handle_batch`], then calls
//! [`Engine::check_timeouts`] to expire tables and to move on once a
//! transponder has nothing left to receive.
//!
//! Every filter and blind sweep is started with a fresh ticket. Events
//! tagged with a ticket the engine no longer waits for are dropped, so
//! sections of a freed filter can never be attributed to the next one.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use tvscan_protocol::{
    AtvMode, DtvMode, DtvStandard, EndCode, FrontendStatus, ScanError, ScanMode, SignalQuality,
    SourceKind, TuneParams,
};

use crate::backend::{BackendError, BlindScanEvent, BlindScanSink, Demux, Frontend, SectionSink};
use crate::config::ScanConfig;
use crate::result::{AnalogTransponder, DigitalTransponder, ScanResult, TransponderRecord};
use crate::sequencer::atv::{format_frequency, AtvStepper};
use crate::sequencer::blind::{BlindScan, BlindStage};
use crate::sequencer::FrequencyPlan;
use crate::table_control::{SectionOutcome, TableControl, TableKind};
use crate::ts_analyzer::{pid, table_id, SectionDecoder, SiTable};

use super::events::{ProgressSink, ScanProgress, SignalInfo};
use super::mailbox::{Batch, Mailbox};

/// Hardware collaborators of a scan.
#[derive(Clone)]
pub struct ScanBackend {
    pub frontend: Arc<dyn Frontend>,
    pub demux: Arc<dyn Demux>,
    pub decoder: Arc<dyn SectionDecoder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    /// Tuning NIT seed frequencies until one NIT is decoded.
    NitSearch,
    BlindScan,
    TransponderScan,
    Done,
}

/// Order in which completed tables are handled within one batch.
const DONE_ORDER: [TableKind; 8] = [
    TableKind::Pat,
    TableKind::Pmt,
    TableKind::Cat,
    TableKind::Sdt,
    TableKind::Nit,
    TableKind::Bat,
    TableKind::Mgt,
    TableKind::Vct,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TableMask(u16);

impl TableMask {
    fn bit(kind: TableKind) -> u16 {
        let shift = match kind {
            TableKind::Pat => 0,
            TableKind::Pmt => 1,
            TableKind::Cat => 2,
            TableKind::Sdt => 3,
            TableKind::Nit => 4,
            TableKind::Bat => 5,
            TableKind::Mgt => 6,
            TableKind::Vct => 7,
        };
        1 << shift
    }

    fn insert(&mut self, kind: TableKind) {
        self.0 |= Self::bit(kind);
    }

    fn remove(&mut self, kind: TableKind) {
        self.0 &= !Self::bit(kind);
    }

    fn contains(&self, kind: TableKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Addresses one table controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableSlot {
    Pat,
    Pmt(usize),
    Cat,
    Sdt,
    Nit,
    Bat,
    Mgt,
    Vct,
}

impl TableSlot {
    fn kind(self) -> TableKind {
        match self {
            TableSlot::Pat => TableKind::Pat,
            TableSlot::Pmt(_) => TableKind::Pmt,
            TableSlot::Cat => TableKind::Cat,
            TableSlot::Sdt => TableKind::Sdt,
            TableSlot::Nit => TableKind::Nit,
            TableSlot::Bat => TableKind::Bat,
            TableSlot::Mgt => TableKind::Mgt,
            TableSlot::Vct => TableKind::Vct,
        }
    }
}

struct Tables {
    pat: TableControl,
    pmts: Vec<TableControl>,
    cat: TableControl,
    sdt: TableControl,
    nit: TableControl,
    bat: TableControl,
    mgt: TableControl,
    vct: TableControl,
}

impl Tables {
    fn new(config: &ScanConfig) -> Self {
        let t = &config.timeouts;
        let parallel = config
            .dtv
            .as_ref()
            .map_or(1, |d| d.pmt_parallelism.max(1));

        Self {
            pat: TableControl::new(TableKind::Pat, pid::PAT, table_id::PAT, t.pat()),
            pmts: (0..parallel)
                .map(|_| TableControl::new(TableKind::Pmt, pid::NULL, table_id::PMT, t.pmt()))
                .collect(),
            cat: TableControl::new(TableKind::Cat, pid::CAT, table_id::CAT, t.cat()),
            sdt: TableControl::new(TableKind::Sdt, pid::SDT, table_id::SDT_ACTUAL, t.sdt()),
            nit: TableControl::new(TableKind::Nit, pid::NIT, table_id::NIT_ACTUAL, t.nit()),
            bat: TableControl::with_subtables(
                TableKind::Bat,
                pid::BAT,
                table_id::BAT,
                t.bat(),
                t.bat_subtables,
                t.bat_repeat_distance(),
            ),
            mgt: TableControl::new(TableKind::Mgt, pid::PSIP, table_id::MGT, t.mgt()),
            vct: TableControl::new(TableKind::Vct, pid::PSIP, table_id::CVCT, t.vct()),
        }
    }

    fn slots(&self) -> Vec<TableSlot> {
        let mut slots = vec![TableSlot::Pat];
        slots.extend((0..self.pmts.len()).map(TableSlot::Pmt));
        slots.extend([
            TableSlot::Cat,
            TableSlot::Sdt,
            TableSlot::Nit,
            TableSlot::Bat,
            TableSlot::Mgt,
            TableSlot::Vct,
        ]);
        slots
    }

    fn get(&self, slot: TableSlot) -> &TableControl {
        match slot {
            TableSlot::Pat => &self.pat,
            TableSlot::Pmt(i) => &self.pmts[i],
            TableSlot::Cat => &self.cat,
            TableSlot::Sdt => &self.sdt,
            TableSlot::Nit => &self.nit,
            TableSlot::Bat => &self.bat,
            TableSlot::Mgt => &self.mgt,
            TableSlot::Vct => &self.vct,
        }
    }

    fn get_mut(&mut self, slot: TableSlot) -> &mut TableControl {
        match slot {
            TableSlot::Pat => &mut self.pat,
            TableSlot::Pmt(i) => &mut self.pmts[i],
            TableSlot::Cat => &mut self.cat,
            TableSlot::Sdt => &mut self.sdt,
            TableSlot::Nit => &mut self.nit,
            TableSlot::Bat => &mut self.bat,
            TableSlot::Mgt => &mut self.mgt,
            TableSlot::Vct => &mut self.vct,
        }
    }

    /// Receiving controller whose filter was started with `ticket`.
    fn find_by_ticket(&self, ticket: u64) -> Option<TableSlot> {
        self.slots().into_iter().find(|&slot| {
            let table = self.get(slot);
            table.is_receiving() && table.ticket() == ticket
        })
    }

    fn pmts_receiving(&self) -> usize {
        self.pmts.iter().filter(|p| p.is_receiving()).count()
    }
}

/// Channel scan state machine.
pub struct Engine {
    config: ScanConfig,
    frontend: Arc<dyn Frontend>,
    demux: Arc<dyn Demux>,
    decoder: Arc<dyn SectionDecoder>,
    mailbox: Arc<Mailbox>,
    progress: ProgressSink,
    plan: FrequencyPlan,

    stage: Stage,
    started: bool,
    /// Parameters last handed to the frontend.
    tuning: Option<TuneParams>,
    /// A tune is pending and its lock event has not been accepted yet.
    wait_frontend: bool,
    /// A `TsBegin` was emitted without its `TsEnd`.
    ts_open: bool,
    atv: Option<AtvStepper>,
    atv_locked_freq: u32,
    atv_started: bool,
    dtv_started: bool,

    blind: Option<BlindScan>,
    blind_ticket: Option<u64>,
    blind_done: bool,

    tables: Tables,
    /// Tables being received on the current transponder.
    recv: TableMask,
    /// Tables that completed and wait for their handler.
    done: TableMask,
    /// `(program_number, pmt_pid)` announced by the PAT.
    programs: Vec<(u16, u16)>,
    pmt_next: usize,
    pmts_pending: bool,

    /// Index of the digital record collecting sections.
    current: Option<usize>,
    result: ScanResult,
    next_ticket: u64,
    now: Instant,
}

impl Engine {
    pub fn new(
        config: ScanConfig,
        backend: ScanBackend,
        mailbox: Arc<Mailbox>,
        progress: ProgressSink,
    ) -> Self {
        let plan = FrequencyPlan::build(&config);
        let tables = Tables::new(&config);
        let atv = config
            .atv
            .as_ref()
            .map(|a| AtvStepper::new(a.mode, a.direction));
        let result = ScanResult::new(config.clone());

        Self {
            config,
            frontend: backend.frontend,
            demux: backend.demux,
            decoder: backend.decoder,
            mailbox,
            progress,
            plan,
            stage: Stage::Idle,
            started: false,
            tuning: None,
            wait_frontend: false,
            ts_open: false,
            atv,
            atv_locked_freq: 0,
            atv_started: false,
            dtv_started: false,
            blind: None,
            blind_ticket: None,
            blind_done: false,
            tables,
            recv: TableMask::default(),
            done: TableMask::default(),
            programs: Vec::new(),
            pmt_next: 0,
            pmts_pending: false,
            current: None,
            result,
            next_ticket: 0,
            now: Instant::now(),
        }
    }

    pub fn result(&self) -> &ScanResult {
        &self.result
    }

    pub fn into_result(self) -> ScanResult {
        self.result
    }

    /// True once `ScanEnd` was emitted.
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Handle one drained batch. Returns the store flag when a quit request
    /// was part of it.
    pub fn handle_batch(&mut self, batch: Batch, now: Instant) -> Option<bool> {
        self.now = now;

        if batch.start && !self.started {
            self.start();
        }

        for (ticket, raw) in batch.sections {
            self.on_raw_section(ticket, &raw);
        }

        for (ticket, event) in batch.blind {
            if self.blind_ticket == Some(ticket) {
                self.on_blind_event(event);
            } else {
                debug!("Scanner: Dropping blind scan event of sweep {}", ticket);
            }
        }

        if let Some(status) = batch.frontend {
            self.on_frontend(status);
        }

        self.run_done_handlers();

        if std::mem::take(&mut self.blind_done) {
            self.blind_stage_done();
        }

        batch.quit
    }

    /// Expire overdue tables and advance past a transponder with nothing
    /// left to receive. Returns the next deadline to wait for.
    pub fn check_timeouts(&mut self, now: Instant) -> Option<Instant> {
        self.now = now;

        let expired: Vec<TableSlot> = self
            .tables
            .slots()
            .into_iter()
            .filter(|&slot| {
                let table = self.tables.get(slot);
                table.is_receiving() && table.is_expired(now)
            })
            .collect();
        for slot in expired {
            let kind = slot.kind();
            info!("Scanner: {} timeout", kind);
            self.tables.get_mut(slot).force_complete(now);
            self.done.insert(kind);
        }
        self.run_done_handlers();

        if self.stage == Stage::TransponderScan && self.recv.is_empty() && !self.wait_frontend {
            self.next_ts();
        }

        self.tables
            .slots()
            .into_iter()
            .filter_map(|slot| self.tables.get(slot).deadline())
            .min()
    }

    /// Stop everything still running on the backend.
    pub fn shutdown(&mut self) {
        if self.blind_ticket.take().is_some() {
            if let Err(e) = self.frontend.blind_scan_exit() {
                warn!("Scanner: Failed to stop blind scan: {}", e);
            }
        }
        self.stop_tables();
        self.frontend.unsubscribe();
        debug!("Scanner: Backend released");
    }

    fn emit(&self, event: ScanProgress) {
        debug!("Scanner: -> {}", event.name());
        (self.progress)(&event);
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn dtv_standard(&self) -> DtvStandard {
        self.config.dtv.as_ref().map_or(DtvStandard::Dvb, |d| d.standard)
    }

    fn atv_mode(&self) -> Option<AtvMode> {
        self.config.atv.as_ref().map(|a| a.mode)
    }

    fn current_digital(&self) -> Option<&DigitalTransponder> {
        self.result.transponders.get(self.current?)?.as_digital()
    }

    fn current_digital_mut(&mut self) -> Option<&mut DigitalTransponder> {
        self.result.transponders.get_mut(self.current?)?.as_digital_mut()
    }

    // ---- tables --------------------------------------------------------

    fn request(&mut self, slot: TableSlot) -> Result<(), BackendError> {
        let ticket = self.issue_ticket();
        let mailbox = Arc::clone(&self.mailbox);
        let sink: SectionSink = Arc::new(move |raw: &[u8]| mailbox.post_section(ticket, raw));

        let kind = slot.kind();
        self.tables
            .get_mut(slot)
            .start(self.demux.as_ref(), ticket, sink, self.now)?;
        self.recv.insert(kind);
        self.done.remove(kind);
        Ok(())
    }

    fn request_or_warn(&mut self, slot: TableSlot) -> bool {
        match self.request(slot) {
            Ok(()) => true,
            Err(e) => {
                warn!("Scanner: Cannot receive {}: {}", slot.kind(), e);
                false
            }
        }
    }

    /// Free the filter of a single-slot table and stop waiting for it.
    fn stop_table(&mut self, slot: TableSlot) {
        self.tables.get_mut(slot).stop(self.demux.as_ref());
        self.recv.remove(slot.kind());
    }

    fn stop_tables(&mut self) {
        for slot in self.tables.slots() {
            self.tables.get_mut(slot).stop(self.demux.as_ref());
        }
        self.recv.clear();
        self.done.clear();
        self.pmts_pending = false;
    }

    fn on_raw_section(&mut self, ticket: u64, raw: &[u8]) {
        let Some(slot) = self.tables.find_by_ticket(ticket) else {
            debug!("Scanner: Dropping section of stale filter {}", ticket);
            return;
        };
        let kind = slot.kind();
        if !self.recv.contains(kind) {
            return;
        }

        match self
            .tables
            .get_mut(slot)
            .on_section(raw, self.decoder.as_ref(), self.now)
        {
            Ok(SectionOutcome::Accepted { table, complete }) => {
                self.collect(table);
                if complete {
                    self.done.insert(kind);
                }
            }
            Ok(SectionOutcome::Repeat { complete: true }) => self.done.insert(kind),
            Ok(_) => {}
            Err(e) => debug!("Scanner: Dropping {} section: {}", kind, e),
        }
    }

    fn collect(&mut self, table: SiTable) {
        match table {
            SiTable::Bat(bat) => self.result.bats.push(bat),
            SiTable::Nit(nit) if self.stage != Stage::TransponderScan => self.result.nits.push(nit),
            table => match self.current_digital_mut() {
                Some(ts) => {
                    ts.push(table);
                }
                None => debug!("Scanner: No transponder for {} section", table.name()),
            },
        }
    }

    fn run_done_handlers(&mut self) {
        for kind in DONE_ORDER {
            if !self.done.contains(kind) {
                continue;
            }
            self.done.remove(kind);
            match kind {
                TableKind::Pat => self.pat_done(),
                TableKind::Pmt => self.pmt_done(),
                TableKind::Cat => self.cat_done(),
                TableKind::Sdt => self.sdt_done(),
                TableKind::Nit => self.nit_done(),
                TableKind::Bat => self.bat_done(),
                TableKind::Mgt => self.mgt_done(),
                TableKind::Vct => self.vct_done(),
            }
        }
    }

    fn pat_done(&mut self) {
        self.stop_table(TableSlot::Pat);
        let pats = self.current_digital().map(|ts| ts.pats.clone()).unwrap_or_default();
        self.programs = self
            .current_digital()
            .map(|ts| ts.programs().collect())
            .unwrap_or_default();
        self.pmt_next = 0;
        debug!("Scanner: PAT announces {} programs", self.programs.len());
        let has_pat = !pats.is_empty();
        self.emit(ScanProgress::PatDone(pats));

        if has_pat {
            self.pmts_pending = true;
            self.request_pmts();
        }
    }

    /// Hand the next programs to idle PMT slots.
    fn request_pmts(&mut self) {
        let mut slot = 0;
        while slot < self.tables.pmts.len() {
            if self.tables.pmts[slot].is_receiving() {
                slot += 1;
                continue;
            }

            let Some(&(program, pmt_pid)) = self.programs.get(self.pmt_next) else {
                if self.pmts_pending && self.tables.pmts_receiving() == 0 {
                    self.pmts_pending = false;
                    self.recv.remove(TableKind::Pmt);
                    let pmts = self.current_digital().map(|ts| ts.pmts.clone()).unwrap_or_default();
                    self.emit(ScanProgress::PmtDone(pmts));
                }
                return;
            };

            self.tables.pmts[slot].set_target(pmt_pid, Some(program));
            match self.request(TableSlot::Pmt(slot)) {
                Ok(()) => {
                    debug!(
                        "Scanner: Receiving PMT of program {} on PID 0x{:04X}",
                        program, pmt_pid
                    );
                    self.pmt_next += 1;
                    slot += 1;
                }
                Err(BackendError::NoFreeFilter) if self.tables.pmts_receiving() > 0 => return,
                Err(e) => {
                    warn!("Scanner: Skipping PMT of program {}: {}", program, e);
                    self.pmt_next += 1;
                }
            }
        }
    }

    fn pmt_done(&mut self) {
        for pmt in self.tables.pmts.iter_mut() {
            if pmt.is_receiving() && pmt.is_complete() && pmt.data_arrived().is_some() {
                pmt.stop(self.demux.as_ref());
            }
        }
        self.request_pmts();
    }

    fn cat_done(&mut self) {
        self.stop_table(TableSlot::Cat);
        let cats = self.current_digital().map(|ts| ts.cats.clone()).unwrap_or_default();
        self.emit(ScanProgress::CatDone(cats));
    }

    fn sdt_done(&mut self) {
        self.stop_table(TableSlot::Sdt);
        let sdts = self.current_digital().map(|ts| ts.sdts.clone()).unwrap_or_default();
        self.emit(ScanProgress::SdtDone(sdts));
    }

    fn nit_done(&mut self) {
        self.stop_table(TableSlot::Nit);

        match self.stage {
            Stage::TransponderScan => {
                let nits = self.current_digital().map(|ts| ts.nits.clone()).unwrap_or_default();
                self.emit(ScanProgress::NitDone(nits));
            }
            Stage::NitSearch => self.nit_search_done(),
            _ => {}
        }
    }

    fn nit_search_done(&mut self) {
        if self.result.nits.is_empty() {
            info!("Scanner: No NIT on this frequency, trying the next one");
            self.stop_table(TableSlot::Bat);
            self.try_nit();
            return;
        }

        self.emit(ScanProgress::NitDone(self.result.nits.clone()));

        let source = self
            .config
            .dtv
            .as_ref()
            .map_or(SourceKind::Cable, |d| d.source);
        let mut params: Vec<TuneParams> = Vec::new();
        for p in self
            .result
            .nits
            .iter()
            .flat_map(|nit| nit.transport_streams.iter())
            .flat_map(|ts| ts.tune_params())
        {
            if p.source() == source && !params.contains(&p) {
                params.push(p);
            }
        }

        if params.is_empty() {
            info!("Scanner: NIT carries no usable delivery descriptor, keeping the frequency list");
        } else {
            info!("Scanner: NIT announces {} transponders", params.len());
            self.plan.replace_dtv(params);
        }
        self.plan.set_cursor_before(self.plan.dtv().start);
        self.finish_nit_stage();
    }

    fn bat_done(&mut self) {
        self.stop_table(TableSlot::Bat);
        self.emit(ScanProgress::BatDone(self.result.bats.clone()));
        if self.stage == Stage::NitSearch {
            self.finish_nit_stage();
        }
    }

    fn finish_nit_stage(&mut self) {
        if self.stage != Stage::NitSearch || !self.recv.is_empty() || self.wait_frontend {
            return;
        }
        self.end_ts();
        self.emit(ScanProgress::NitEnd);
        self.stage = Stage::TransponderScan;
        self.next_ts();
    }

    fn mgt_done(&mut self) {
        self.stop_table(TableSlot::Mgt);
        let mgts = self.current_digital().map(|ts| ts.mgts.clone()).unwrap_or_default();
        let vct_table = mgts.first().map(|mgt| {
            if mgt.is_cable() {
                table_id::CVCT
            } else {
                table_id::TVCT
            }
        });
        self.emit(ScanProgress::MgtDone(mgts));

        match vct_table {
            Some(tid) => {
                self.tables.vct.set_table_id(tid);
                if !self.request_or_warn(TableSlot::Vct) {
                    self.request_or_warn(TableSlot::Pat);
                }
            }
            None => {
                debug!("Scanner: No MGT, falling back to the PAT");
                self.request_or_warn(TableSlot::Pat);
            }
        }
    }

    fn vct_done(&mut self) {
        self.stop_table(TableSlot::Vct);
        let vcts = self.current_digital().map(|ts| ts.vcts.clone()).unwrap_or_default();
        let located = vcts.iter().flat_map(|v| v.local_channels()).any(|c| {
            c.service_location()
                .map_or(false, |sl| !sl.elements.is_empty())
        });
        self.emit(ScanProgress::VctDone(vcts));

        if !located {
            debug!("Scanner: VCT without service locations, reading the PAT");
            self.request_or_warn(TableSlot::Pat);
        }
    }

    // ---- frontend ------------------------------------------------------

    fn status_matches(&self, tuning: &TuneParams, reported: u32) -> bool {
        match *tuning {
            TuneParams::Analog { frequency, .. } => {
                let range = self.config.atv.as_ref().map_or(0, |a| a.afc_range_hz);
                frequency.abs_diff(reported) <= range
            }
            TuneParams::Satellite {
                frequency,
                symbol_rate,
                ..
            } => {
                let unicable = self.config.dtv.as_ref().map_or(false, |d| d.unicable);
                unicable || frequency.abs_diff(reported) <= symbol_rate / 2000
            }
            other => other.frequency() == reported,
        }
    }

    fn on_frontend(&mut self, status: FrontendStatus) {
        if self.plan.index().is_none() || !self.wait_frontend {
            return;
        }
        let Some(tuning) = self.tuning else {
            return;
        };
        if !self.status_matches(&tuning, status.frequency) {
            debug!(
                "Scanner: Ignoring frontend event at {} while tuned to {}",
                status.frequency,
                tuning.frequency()
            );
            return;
        }

        let quality = if tuning.is_analog() {
            None
        } else {
            Some(self.frontend.signal_quality())
        };
        self.emit(ScanProgress::Signal(SignalInfo {
            frequency: status.frequency,
            locked: status.locked,
            quality,
        }));
        self.wait_frontend = false;

        if status.locked {
            info!("Scanner: Locked at {}", status.frequency);
            if tuning.is_analog() {
                self.atv_locked_freq = status.frequency;
            }
            self.on_locked(tuning, quality.unwrap_or_default());
        } else {
            debug!("Scanner: No lock at {}", tuning.frequency());
            self.try_next(tuning);
        }
    }

    fn try_next(&mut self, tuning: TuneParams) {
        if tuning.is_analog() {
            let step = self.config.atv.as_ref().map_or(0, |a| a.afc_unlocked_step_hz);
            self.atv_step_tune(tuning.frequency(), step);
        } else if self.stage == Stage::NitSearch {
            self.try_nit();
        } else {
            self.next_ts();
        }
    }

    fn on_locked(&mut self, tuning: TuneParams, quality: SignalQuality) {
        self.result.end_code = EndCode::Ok;

        match self.stage {
            Stage::TransponderScan if tuning.is_analog() => self.on_analog_locked(tuning),
            Stage::TransponderScan => {
                self.result
                    .transponders
                    .push(TransponderRecord::Digital(DigitalTransponder::new(tuning, quality)));
                self.current = Some(self.result.transponders.len() - 1);

                let slots: &[TableSlot] = if self.dtv_standard() == DtvStandard::Atsc {
                    &[TableSlot::Cat, TableSlot::Mgt]
                } else {
                    &[TableSlot::Pat, TableSlot::Cat, TableSlot::Sdt, TableSlot::Nit]
                };
                for &slot in slots {
                    self.request_or_warn(slot);
                }
            }
            Stage::NitSearch => {
                if !self.request_or_warn(TableSlot::Nit) {
                    self.try_nit();
                    return;
                }
                if self.config.dtv.as_ref().map_or(false, |d| d.search_bat) {
                    self.request_or_warn(TableSlot::Bat);
                }
            }
            _ => {}
        }
    }

    fn on_analog_locked(&mut self, tuning: TuneParams) {
        let Some((mode, cvbs_unlocked, cvbs_locked)) = self
            .config
            .atv
            .as_ref()
            .map(|a| (a.mode, a.cvbs_unlocked_step_hz, a.cvbs_locked_step_hz))
        else {
            return self.next_ts();
        };
        let locked = self.atv_locked_freq;

        if !self.frontend.video_locked() {
            debug!("Scanner: No picture at {}", locked);
            return self.atv_step_tune(locked, cvbs_unlocked);
        }

        let (audio_std, video_std) = match tuning {
            TuneParams::Analog {
                audio_std,
                video_std,
                ..
            } => (audio_std, video_std),
            _ => (0, 0),
        };
        let frequency = format_frequency(locked);
        info!("Scanner: Analog channel at {}", frequency);
        self.result
            .transponders
            .push(TransponderRecord::Analog(AnalogTransponder {
                frequency,
                audio_std,
                video_std,
            }));

        match mode {
            AtvMode::Manual | AtvMode::Fixed => self.next_ts(),
            AtvMode::Auto => self.atv_step_tune(locked, cvbs_locked),
        }
    }

    /// Step the analog search away from `from`; the pass over the current
    /// entry ends when the stepper runs out of range.
    fn atv_step_tune(&mut self, from: u32, step: u32) {
        let mut from = from;
        loop {
            let Some(next) = self.atv.as_mut().and_then(|s| s.next_frequency(from, step)) else {
                return self.next_ts();
            };
            let Some(entry) = self.plan.current().copied() else {
                return self.next_ts();
            };
            let params = entry.with_frequency(next);
            self.tuning = Some(params);
            self.emit(ScanProgress::AtvTuning(next));
            match self.frontend.tune(&params) {
                Ok(()) => {
                    self.wait_frontend = true;
                    return;
                }
                Err(e) => {
                    warn!("Scanner: Failed to tune {}: {}", next, e);
                    from = next;
                }
            }
        }
    }

    // ---- frequency walk ------------------------------------------------

    fn begin_ts(&mut self, index: usize, params: TuneParams) {
        self.ts_open = true;
        self.emit(ScanProgress::TsBegin {
            index,
            total: self.plan.len(),
            params,
        });
    }

    fn end_ts(&mut self) {
        if std::mem::take(&mut self.ts_open) {
            self.emit(ScanProgress::TsEnd);
        }
    }

    fn start(&mut self) {
        self.started = true;
        info!(
            "Scanner: Starting {:?} scan over {} frequencies",
            self.config.mode,
            self.plan.len()
        );
        self.emit(ScanProgress::ScanBegin);

        let mailbox = Arc::clone(&self.mailbox);
        self.frontend
            .subscribe(Arc::new(move |status| mailbox.post_frontend(status)));

        if self.config.mode == ScanMode::AtvFirst {
            self.start_atv();
        } else {
            self.start_dtv();
        }
    }

    fn start_atv(&mut self) {
        self.atv_started = true;
        let block = self.plan.atv();
        let Some(atv) = self.config.atv.as_ref() else {
            self.plan.set_cursor_before(block.start);
            return self.next_ts();
        };
        info!("Scanner: Starting analog pass ({:?})", atv.mode);

        let bounds = (atv.frequencies.first().copied(), atv.frequencies.get(1).copied());
        match (atv.mode, bounds) {
            (AtvMode::Manual, (Some(min), Some(max))) => {
                if let Some(stepper) = self.atv.as_mut() {
                    stepper.set_range(min, max);
                }
                self.plan.set_cursor_before(block.start + 2);
            }
            (AtvMode::Auto, (Some(min), Some(max))) => {
                if let Some(stepper) = self.atv.as_mut() {
                    stepper.set_range(min, max);
                }
                self.plan.set_frequency(block.start + 2, min);
                self.plan.set_cursor_before(block.start + 2);
            }
            _ => self.plan.set_cursor_before(block.start),
        }
        self.next_ts();
    }

    fn start_dtv(&mut self) {
        self.dtv_started = true;
        self.plan.set_cursor_before(self.plan.dtv().start);
        let Some(dtv) = self.config.dtv.as_ref() else {
            return self.next_ts();
        };
        info!(
            "Scanner: Starting digital pass ({:?} {} {:?})",
            dtv.standard,
            dtv.source.as_str(),
            dtv.mode
        );
        let (mode, standard) = (dtv.mode, dtv.standard);
        let satellite = dtv.satellite.clone();
        let range = dtv.blind_scan_range();

        if self.result.end_code != EndCode::Ok {
            self.result.end_code = EndCode::Unlocked;
        }

        if let Some(sat) = &satellite {
            if let Err(e) = self.frontend.apply_satellite(sat) {
                warn!("Scanner: Failed to apply satellite {}: {}", sat.name, e);
            }
        }

        match mode {
            DtvMode::Auto if standard == DtvStandard::Dvb => self.try_nit(),
            DtvMode::Blind => {
                let single_lo = satellite.as_ref().map_or(false, |s| s.single_lo());
                self.blind = Some(BlindScan::new(range, single_lo));
                self.stage = Stage::BlindScan;
                self.start_blind_stage();
            }
            _ => self.next_ts(),
        }
    }

    /// Tune the next candidate of the plan, switching passes at block
    /// boundaries.
    fn next_ts(&mut self) {
        self.stop_tables();
        self.end_ts();
        self.stage = Stage::TransponderScan;
        self.current = None;
        self.wait_frontend = false;

        loop {
            let Some(index) = self.plan.advance() else {
                return self.all_done();
            };
            if index >= self.plan.atv().end() && !self.dtv_started {
                return self.start_dtv();
            }
            if index >= self.plan.dtv().end() && !self.atv_started {
                return self.start_atv();
            }
            let Some(entry) = self.plan.entry(index).copied() else {
                continue;
            };

            let params = match entry {
                TuneParams::Analog { frequency, .. } if self.atv_mode() == Some(AtvMode::Fixed) => {
                    let start = self
                        .atv
                        .as_mut()
                        .map_or(frequency, |s| s.window_around(frequency));
                    entry.with_frequency(start)
                }
                _ => entry,
            };

            self.tuning = Some(params);
            self.begin_ts(index, params);
            match self.frontend.tune(&params) {
                Ok(()) => {
                    self.wait_frontend = true;
                    return;
                }
                Err(e) => {
                    warn!("Scanner: Failed to tune {}: {}", params.frequency(), e);
                    self.end_ts();
                }
            }
        }
    }

    /// Tune the next NIT seed frequency.
    fn try_nit(&mut self) {
        if self.stage != Stage::NitSearch {
            self.stage = Stage::NitSearch;
            self.emit(ScanProgress::NitBegin);
        }
        self.end_ts();
        self.wait_frontend = false;

        let dtv = self.plan.dtv();
        loop {
            let index = match self.plan.advance() {
                Some(index) if dtv.contains(index) => index,
                _ => {
                    warn!("Scanner: No NIT found on any seed frequency");
                    self.stage = Stage::Done;
                    self.tuning = None;
                    self.result.failure = Some(ScanError::CannotGetNit);
                    self.emit(ScanProgress::ScanEnd(self.result.end_code));
                    return;
                }
            };
            let Some(params) = self.plan.entry(index).copied() else {
                continue;
            };

            self.tuning = Some(params);
            self.begin_ts(index, params);
            match self.frontend.tune(&params) {
                Ok(()) => {
                    self.wait_frontend = true;
                    return;
                }
                Err(e) => {
                    warn!("Scanner: Failed to tune NIT seed {}: {}", params.frequency(), e);
                    self.end_ts();
                }
            }
        }
    }

    fn all_done(&mut self) {
        self.end_ts();
        self.stage = Stage::Done;
        self.tuning = None;
        info!(
            "Scanner: Scan finished ({}), {} transponders locked",
            self.result.end_code,
            self.result.transponders.len()
        );
        self.emit(ScanProgress::ScanEnd(self.result.end_code));
    }

    // ---- blind scan ----------------------------------------------------

    /// Report a stage that ended without results.
    fn emit_skipped(&self, stage: BlindStage) {
        let percent = self.blind.as_ref().map_or(100, |b| b.percent());
        self.emit(ScanProgress::BlindScan {
            stage,
            percent,
            new_transponders: Vec::new(),
        });
    }

    fn start_blind_stage(&mut self) {
        loop {
            let (stage, skipped, range) = match self.blind.as_mut() {
                Some(blind) => match blind.current_stage() {
                    Some(stage) if blind.skips(stage) => {
                        blind.skip_stage();
                        (stage, true, blind.range())
                    }
                    Some(stage) => (stage, false, blind.range()),
                    None => break,
                },
                None => return self.next_ts(),
            };

            if skipped {
                debug!("Scanner: Skipping blind scan stage {}", stage.short_name());
                self.emit_skipped(stage);
                continue;
            }

            let ticket = self.issue_ticket();
            let mailbox = Arc::clone(&self.mailbox);
            let sink: BlindScanSink = Arc::new(move |event| mailbox.post_blind(ticket, event));
            match self.frontend.blind_scan(
                stage.polarisation(),
                stage.band(),
                range.start_khz,
                range.stop_khz,
                sink,
            ) {
                Ok(()) => {
                    info!(
                        "Scanner: Blind scan stage {} ({}..{} kHz)",
                        stage.short_name(),
                        range.start_khz,
                        range.stop_khz
                    );
                    self.blind_ticket = Some(ticket);
                    return;
                }
                Err(e) => {
                    warn!("Scanner: Blind scan stage {} failed: {}", stage.short_name(), e);
                    if let Some(blind) = self.blind.as_mut() {
                        blind.skip_stage();
                    }
                    self.emit_skipped(stage);
                }
            }
        }

        let found = self
            .blind
            .take()
            .map(BlindScan::into_transponders)
            .unwrap_or_default();
        info!("Scanner: Blind scan found {} transponders", found.len());
        self.plan.replace_dtv(found);
        self.plan.set_cursor_before(self.plan.dtv().start);
        self.next_ts();
    }

    fn on_blind_event(&mut self, event: BlindScanEvent) {
        match event {
            BlindScanEvent::Start { frequency } => {
                self.emit(ScanProgress::BlindScanFrequency(frequency));
            }
            BlindScanEvent::Update {
                process,
                transponders,
            } => {
                let Some(progress) = self
                    .blind
                    .as_mut()
                    .and_then(|b| b.update(process, &transponders))
                else {
                    return;
                };
                if progress.stage_done {
                    self.blind_done = true;
                }
                self.emit(ScanProgress::BlindScan {
                    stage: progress.stage,
                    percent: progress.percent,
                    new_transponders: progress.new_transponders,
                });
            }
        }
    }

    fn blind_stage_done(&mut self) {
        if let Some(blind) = self.blind.as_mut() {
            blind.finish_stage();
        }
        if let Err(e) = self.frontend.blind_scan_exit() {
            warn!("Scanner: Failed to stop blind scan: {}", e);
        }
        self.blind_ticket = None;
        self.start_blind_stage();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FilterHandle, SectionFilter, StatusSink};
    use crate::config::{AtvConfig, DtvConfig};
    use crate::ts_analyzer::{build_section, vct_channel_bytes, SiDecoder};
    use std::sync::Mutex;
    use std::time::Duration;
    use tvscan_protocol::{
        Bandwidth, LoBand, Modulation, Polarisation, SatelliteParams,
    };

    #[derive(Default)]
    struct MockFrontend {
        sink: Mutex<Option<StatusSink>>,
        tuned: Mutex<Vec<TuneParams>>,
        fail: Mutex<Vec<u32>>,
        no_picture: Mutex<bool>,
        sweeps: Mutex<Vec<(Polarisation, LoBand, BlindScanSink)>>,
        sweep_exits: Mutex<usize>,
    }

    impl MockFrontend {
        fn last_tuned(&self) -> Option<TuneParams> {
            self.tuned.lock().unwrap().last().copied()
        }

        fn tuned_frequencies(&self) -> Vec<u32> {
            self.tuned.lock().unwrap().iter().map(|p| p.frequency()).collect()
        }

        fn report(&self, locked: bool, frequency: u32) {
            let sink = self.sink.lock().unwrap().clone();
            if let Some(sink) = sink {
                sink(FrontendStatus { locked, frequency });
            }
        }

        fn sweep_sink(&self, n: usize) -> BlindScanSink {
            Arc::clone(&self.sweeps.lock().unwrap()[n].2)
        }
    }

    impl Frontend for MockFrontend {
        fn subscribe(&self, sink: StatusSink) {
            *self.sink.lock().unwrap() = Some(sink);
        }

        fn unsubscribe(&self) {
            *self.sink.lock().unwrap() = None;
        }

        fn tune(&self, params: &TuneParams) -> Result<(), BackendError> {
            if self.fail.lock().unwrap().contains(&params.frequency()) {
                return Err(BackendError::Tune("refused".into()));
            }
            self.tuned.lock().unwrap().push(*params);
            Ok(())
        }

        fn signal_quality(&self) -> SignalQuality {
            SignalQuality {
                snr: 30,
                ber: 0,
                strength: 80,
            }
        }

        fn video_locked(&self) -> bool {
            !*self.no_picture.lock().unwrap()
        }

        fn blind_scan(
            &self,
            polarisation: Polarisation,
            band: LoBand,
            _start_khz: u32,
            _stop_khz: u32,
            sink: BlindScanSink,
        ) -> Result<(), BackendError> {
            self.sweeps.lock().unwrap().push((polarisation, band, sink));
            Ok(())
        }

        fn blind_scan_exit(&self) -> Result<(), BackendError> {
            *self.sweep_exits.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDemux {
        filters: Mutex<Vec<(FilterHandle, SectionFilter, Option<SectionSink>)>>,
        allocated: Mutex<Vec<SectionFilter>>,
        next: Mutex<u32>,
    }

    impl MockDemux {
        fn active_tables(&self) -> Vec<u8> {
            self.filters.lock().unwrap().iter().map(|(_, f, _)| f.filter[0]).collect()
        }

        fn allocated_for(&self, table: u8) -> Vec<SectionFilter> {
            self.allocated
                .lock()
                .unwrap()
                .iter()
                .filter(|f| f.filter[0] == table)
                .copied()
                .collect()
        }

        fn deliver(&self, pid: u16, raw: &[u8]) {
            let sinks: Vec<SectionSink> = self
                .filters
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, f, _)| f.pid == pid && f.matches(raw))
                .filter_map(|(_, _, sink)| sink.clone())
                .collect();
            for sink in sinks {
                sink(raw);
            }
        }
    }

    impl Demux for MockDemux {
        fn alloc_filter(&self, filter: &SectionFilter) -> Result<FilterHandle, BackendError> {
            let mut next = self.next.lock().unwrap();
            *next += 1;
            let handle = FilterHandle(*next);
            self.filters.lock().unwrap().push((handle, *filter, None));
            self.allocated.lock().unwrap().push(*filter);
            Ok(handle)
        }

        fn set_callback(&self, handle: FilterHandle, sink: SectionSink) -> Result<(), BackendError> {
            let mut filters = self.filters.lock().unwrap();
            let entry = filters
                .iter_mut()
                .find(|(h, _, _)| *h == handle)
                .ok_or(BackendError::UnknownFilter(handle))?;
            entry.2 = Some(sink);
            Ok(())
        }

        fn start(&self, _handle: FilterHandle) -> Result<(), BackendError> {
            Ok(())
        }

        fn free(&self, handle: FilterHandle) -> Result<(), BackendError> {
            self.filters.lock().unwrap().retain(|(h, _, _)| *h != handle);
            Ok(())
        }

        fn sync(&self) {}
    }

    struct Harness {
        engine: Engine,
        mailbox: Arc<Mailbox>,
        frontend: Arc<MockFrontend>,
        demux: Arc<MockDemux>,
        events: Arc<Mutex<Vec<ScanProgress>>>,
        now: Instant,
    }

    impl Harness {
        fn new(config: ScanConfig) -> Self {
            let mailbox = Arc::new(Mailbox::new());
            let frontend = Arc::new(MockFrontend::default());
            let demux = Arc::new(MockDemux::default());
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink_events = Arc::clone(&events);
            let progress: ProgressSink =
                Arc::new(move |event: &ScanProgress| sink_events.lock().unwrap().push(event.clone()));
            let backend = ScanBackend {
                frontend: frontend.clone(),
                demux: demux.clone(),
                decoder: Arc::new(SiDecoder::new()),
            };
            let engine = Engine::new(config, backend, Arc::clone(&mailbox), progress);
            Self {
                engine,
                mailbox,
                frontend,
                demux,
                events,
                now: Instant::now(),
            }
        }

        /// Run the worker loop until the mailbox stays empty.
        fn pump(&mut self) -> Option<bool> {
            for _ in 0..64 {
                let batch = self.mailbox.take();
                let idle = batch.is_empty();
                if let Some(store) = self.engine.handle_batch(batch, self.now) {
                    return Some(store);
                }
                self.engine.check_timeouts(self.now);
                if idle {
                    break;
                }
            }
            None
        }

        fn start(&mut self) {
            self.mailbox.post_start();
            self.pump();
        }

        fn lock(&mut self, locked: bool) {
            let frequency = self.frontend.last_tuned().unwrap().frequency();
            self.lock_at(locked, frequency);
        }

        fn lock_at(&mut self, locked: bool, frequency: u32) {
            self.frontend.report(locked, frequency);
            self.pump();
        }

        fn deliver(&mut self, pid: u16, raw: &[u8]) {
            self.demux.deliver(pid, raw);
            self.pump();
        }

        fn expire(&mut self) {
            self.now += Duration::from_secs(60);
            self.pump();
        }

        fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.name()).collect()
        }

        fn last_event(&self) -> Option<ScanProgress> {
            self.events.lock().unwrap().last().cloned()
        }

        fn count(&self, name: &str) -> usize {
            self.names().into_iter().filter(|n| *n == name).count()
        }
    }

    fn cable(frequency: u32) -> TuneParams {
        TuneParams::Cable {
            frequency,
            symbol_rate: 6_875_000,
            modulation: Modulation::Qam64,
        }
    }

    fn terrestrial(frequency: u32) -> TuneParams {
        TuneParams::Terrestrial {
            frequency,
            bandwidth: Bandwidth::Mhz8,
        }
    }

    fn satellite(frequency: u32) -> TuneParams {
        TuneParams::Satellite {
            frequency,
            symbol_rate: 27_500_000,
            polarisation: Polarisation::Horizontal,
        }
    }

    fn dtv_config(dtv: DtvConfig) -> ScanConfig {
        ScanConfig {
            dtv: Some(dtv),
            ..Default::default()
        }
    }

    fn manual_cable() -> ScanConfig {
        dtv_config(DtvConfig {
            mode: DtvMode::Manual,
            frequencies: vec![cable(474_000_000)],
            ..Default::default()
        })
    }

    fn pat_section() -> Vec<u8> {
        // program 0 -> NIT, 101 -> 0x100, 102 -> 0x200
        build_section(
            table_id::PAT,
            0x0401,
            0,
            0,
            0,
            &[0x00, 0x00, 0xE0, 0x10, 0x00, 0x65, 0xE1, 0x00, 0x00, 0x66, 0xE2, 0x00],
        )
    }

    fn pmt_section(program: u16, video_pid: u16) -> Vec<u8> {
        let body = [
            0xE0 | (video_pid >> 8) as u8,
            video_pid as u8,
            0xF0,
            0x00,
            0x02,
            0xE0 | (video_pid >> 8) as u8,
            video_pid as u8,
            0xF0,
            0x00,
        ];
        build_section(table_id::PMT, program, 0, 0, 0, &body)
    }

    fn nit_section(descriptors: &[u8]) -> Vec<u8> {
        let mut body = vec![0xF0, 0x00];
        let ts_len = 6 + descriptors.len();
        body.extend_from_slice(&[0xF0 | (ts_len >> 8) as u8, ts_len as u8]);
        body.extend_from_slice(&[0x04, 0x01, 0x00, 0x01]);
        body.extend_from_slice(&[0xF0 | (descriptors.len() >> 8) as u8, descriptors.len() as u8]);
        body.extend_from_slice(descriptors);
        build_section(table_id::NIT_ACTUAL, 0x0001, 0, 0, 0, &body)
    }

    #[test]
    fn test_pat_requests_one_pmt_per_program() {
        let mut h = Harness::new(manual_cable());
        h.start();
        assert_eq!(h.frontend.tuned_frequencies(), vec![474_000_000]);
        h.lock(true);

        let mut active = h.demux.active_tables();
        active.sort_unstable();
        assert_eq!(
            active,
            vec![table_id::PAT, table_id::CAT, table_id::NIT_ACTUAL, table_id::SDT_ACTUAL]
        );

        h.deliver(pid::PAT, &pat_section());
        let pmts = h.demux.allocated_for(table_id::PMT);
        assert_eq!(pmts.len(), 2);
        assert_eq!((pmts[0].pid, pmts[0].filter[1], pmts[0].filter[2]), (0x0100, 0x00, 0x65));
        assert_eq!((pmts[1].pid, pmts[1].filter[1], pmts[1].filter[2]), (0x0200, 0x00, 0x66));
        assert!(!h.demux.active_tables().contains(&table_id::PAT));
    }

    #[test]
    fn test_digital_scan_runs_to_completion() {
        let mut h = Harness::new(manual_cable());
        h.start();
        h.lock(true);
        h.deliver(pid::PAT, &pat_section());
        h.deliver(0x0100, &pmt_section(101, 0x0101));
        assert_eq!(h.count("pmt_done"), 0);
        h.deliver(0x0200, &pmt_section(102, 0x0201));
        assert_eq!(h.count("pmt_done"), 1);

        // CAT, SDT and NIT never show up
        h.expire();

        assert_eq!(h.last_event(), Some(ScanProgress::ScanEnd(EndCode::Ok)));
        assert_eq!(h.count("ts_begin"), 1);
        assert_eq!(h.count("ts_end"), 1);
        assert!(h.demux.active_tables().is_empty());

        let result = h.engine.result();
        let ts = result.digital().next().unwrap();
        assert_eq!(ts.pmts.len(), 2);
        assert_eq!(ts.signal.snr, 30);
        assert_eq!(ts.transport_stream_id(), Some(0x0401));
    }

    #[test]
    fn test_unlocked_everywhere() {
        let mut config = manual_cable();
        if let Some(dtv) = config.dtv.as_mut() {
            dtv.mode = DtvMode::AllBand;
            dtv.frequencies = vec![cable(474_000_000), cable(482_000_000)];
        }
        let mut h = Harness::new(config);
        h.start();
        h.lock(false);
        h.lock(false);

        assert_eq!(h.frontend.tuned_frequencies(), vec![474_000_000, 482_000_000]);
        assert_eq!(h.last_event(), Some(ScanProgress::ScanEnd(EndCode::Unlocked)));
        assert_eq!(h.count("ts_begin"), h.count("ts_end"));
        assert!(h.engine.is_finished());
    }

    #[test]
    fn test_mismatched_frequency_ignored() {
        let mut h = Harness::new(manual_cable());
        h.start();
        h.lock_at(true, 482_000_000);
        assert_eq!(h.count("signal"), 0);
        assert!(h.demux.active_tables().is_empty());
    }

    #[test]
    fn test_failed_tune_skips_frequency() {
        let mut config = manual_cable();
        if let Some(dtv) = config.dtv.as_mut() {
            dtv.mode = DtvMode::AllBand;
            dtv.frequencies = vec![cable(474_000_000), cable(482_000_000)];
        }
        let mut h = Harness::new(config);
        h.frontend.fail.lock().unwrap().push(474_000_000);
        h.start();
        assert_eq!(h.frontend.tuned_frequencies(), vec![482_000_000]);
        assert_eq!(h.count("ts_begin"), 2);
        assert_eq!(h.count("ts_end"), 1);
    }

    fn terrestrial_auto() -> ScanConfig {
        dtv_config(DtvConfig {
            source: SourceKind::Terrestrial,
            mode: DtvMode::Auto,
            frequencies: vec![terrestrial(474_000_000), terrestrial(482_000_000)],
            ..Default::default()
        })
    }

    #[test]
    fn test_nit_search_replaces_plan() {
        let mut h = Harness::new(terrestrial_auto());
        h.start();
        assert_eq!(h.names()[..2], ["scan_begin", "nit_begin"]);
        h.lock(false);
        h.lock(true);
        assert_eq!(h.demux.active_tables(), vec![table_id::NIT_ACTUAL]);

        // 506 and 522 MHz, 8 MHz bandwidth
        let mut descriptors = vec![0x5A, 0x0B, 0x03, 0x04, 0x18, 0x40, 0x1F];
        descriptors.extend_from_slice(&[0xFF; 6]);
        descriptors.extend_from_slice(&[0x5A, 0x0B, 0x03, 0x1C, 0x82, 0x40, 0x1F]);
        descriptors.extend_from_slice(&[0xFF; 6]);
        // only the first delivery descriptor of a transport stream counts
        h.deliver(pid::NIT, &nit_section(&descriptors));

        assert_eq!(h.count("nit_done"), 1);
        assert_eq!(h.count("nit_end"), 1);
        assert_eq!(h.frontend.last_tuned(), Some(terrestrial(506_000_000)));
        assert_eq!(h.engine.result().nits.len(), 1);

        // the seed lock already counts
        h.lock(false);
        assert_eq!(h.last_event(), Some(ScanProgress::ScanEnd(EndCode::Ok)));
    }

    #[test]
    fn test_nit_search_gives_up() {
        let mut h = Harness::new(terrestrial_auto());
        h.start();
        h.lock(true);
        h.expire();
        assert_eq!(h.frontend.tuned_frequencies(), vec![474_000_000, 482_000_000]);
        h.lock(false);

        assert_eq!(h.engine.result().failure, Some(ScanError::CannotGetNit));
        assert!(matches!(h.last_event(), Some(ScanProgress::ScanEnd(_))));
        assert!(h.engine.is_finished());
    }

    #[test]
    fn test_bat_timeout_frees_filter() {
        let mut h = Harness::new(dtv_config(DtvConfig {
            mode: DtvMode::Auto,
            frequencies: vec![cable(474_000_000)],
            search_bat: true,
            ..Default::default()
        }));
        h.start();
        h.lock(true);
        assert!(h.demux.active_tables().contains(&table_id::BAT));

        // 474 MHz, 64-QAM, 6.875 MS/s
        let cable_descriptor = [
            0x44, 0x0B, 0x04, 0x74, 0x00, 0x00, 0xFF, 0xF2, 0x03, 0x00, 0x68, 0x75, 0x00,
        ];
        h.deliver(pid::NIT, &nit_section(&cable_descriptor));
        assert_eq!(h.count("nit_done"), 1);
        assert_eq!(h.count("nit_end"), 0);

        h.expire();
        assert!(h
            .events
            .lock()
            .unwrap()
            .contains(&ScanProgress::BatDone(Vec::new())));
        assert!(!h.demux.active_tables().contains(&table_id::BAT));
        assert_eq!(h.count("nit_end"), 1);
        assert_eq!(h.frontend.tuned_frequencies(), vec![474_000_000, 474_000_000]);
    }

    fn blind_config(single_lo: bool) -> ScanConfig {
        let mut sat = SatelliteParams::universal("Astra");
        if single_lo {
            sat.lof_hi_khz = sat.lof_lo_khz;
        }
        dtv_config(DtvConfig {
            source: SourceKind::Satellite,
            mode: DtvMode::Blind,
            satellite: Some(sat),
            ..Default::default()
        })
    }

    #[test]
    fn test_single_lo_blind_scan() {
        let mut h = Harness::new(blind_config(true));
        h.start();
        assert_eq!(h.frontend.sweeps.lock().unwrap().len(), 1);

        let sink = h.frontend.sweep_sink(0);
        sink(BlindScanEvent::Start { frequency: 950_000 });
        sink(BlindScanEvent::Update {
            process: 100,
            transponders: vec![satellite(1_200_000)],
        });
        h.pump();

        let sweeps: Vec<(Polarisation, LoBand)> = h
            .frontend
            .sweeps
            .lock()
            .unwrap()
            .iter()
            .map(|(p, b, _)| (*p, *b))
            .collect();
        assert_eq!(
            sweeps,
            vec![
                (Polarisation::Horizontal, LoBand::Low),
                (Polarisation::Vertical, LoBand::Low),
            ]
        );

        // events of the finished sweep are dropped
        sink(BlindScanEvent::Update {
            process: 100,
            transponders: vec![satellite(1_300_000)],
        });
        let second = h.frontend.sweep_sink(1);
        second(BlindScanEvent::Update {
            process: 100,
            transponders: vec![satellite(1_500_000)],
        });
        h.pump();

        assert_eq!(*h.frontend.sweep_exits.lock().unwrap(), 2);
        assert_eq!(h.frontend.last_tuned(), Some(satellite(1_200_000)));
        assert!(h.events.lock().unwrap().contains(&ScanProgress::BlindScan {
            stage: BlindStage::HorizontalHigh,
            percent: 50,
            new_transponders: Vec::new(),
        }));

        h.lock(false);
        let TuneParams::Satellite { polarisation, .. } = h.frontend.last_tuned().unwrap() else {
            panic!("satellite expected");
        };
        assert_eq!(polarisation, Polarisation::Vertical);
        assert_eq!(h.frontend.last_tuned().unwrap().frequency(), 1_500_000);
        assert_eq!(h.count("blind_scan_frequency"), 1);
    }

    fn satellite_manual(unicable: bool) -> ScanConfig {
        dtv_config(DtvConfig {
            source: SourceKind::Satellite,
            mode: DtvMode::Manual,
            frequencies: vec![satellite(1_200_000)],
            satellite: Some(SatelliteParams::universal("Astra")),
            unicable,
            ..Default::default()
        })
    }

    #[test]
    fn test_satellite_drift_tolerance() {
        let mut h = Harness::new(satellite_manual(false));
        h.start();
        // 27.5 MS/s tolerates 13.75 MHz
        h.lock_at(true, 1_220_000);
        assert_eq!(h.count("signal"), 0);
        h.lock_at(true, 1_210_000);
        assert_eq!(h.count("signal"), 1);

        let mut h = Harness::new(satellite_manual(true));
        h.start();
        h.lock_at(true, 1_220_000);
        assert_eq!(h.count("signal"), 1);
    }

    fn analog_manual() -> ScanConfig {
        ScanConfig {
            mode: ScanMode::AtvFirst,
            atv: Some(AtvConfig {
                mode: AtvMode::Manual,
                frequencies: vec![44_250_000, 200_000_000, 48_000_000],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_analog_manual_search() {
        let mut h = Harness::new(analog_manual());
        h.start();
        assert_eq!(h.frontend.tuned_frequencies(), vec![48_000_000]);

        h.lock(false);
        assert_eq!(h.frontend.last_tuned().unwrap().frequency(), 51_000_000);
        assert!(h
            .events
            .lock()
            .unwrap()
            .contains(&ScanProgress::AtvTuning(51_000_000)));

        // within the AFC range of the tuned frequency
        h.lock_at(true, 52_760_000);
        let analog: Vec<u32> = h.engine.result().analog().map(|a| a.frequency).collect();
        assert_eq!(analog, vec![52_750_000]);
        assert_eq!(h.last_event(), Some(ScanProgress::ScanEnd(EndCode::Ok)));
    }

    #[test]
    fn test_analog_without_picture_keeps_stepping() {
        let mut h = Harness::new(analog_manual());
        *h.frontend.no_picture.lock().unwrap() = true;
        h.start();
        h.lock_at(true, 48_100_000);
        assert_eq!(h.frontend.last_tuned().unwrap().frequency(), 49_100_000);
        assert_eq!(h.engine.result().analog().count(), 0);
    }

    fn atsc_manual() -> ScanConfig {
        dtv_config(DtvConfig {
            standard: DtvStandard::Atsc,
            source: SourceKind::Atsc,
            mode: DtvMode::Manual,
            frequencies: vec![TuneParams::Atsc {
                frequency: 473_000_000,
                modulation: Modulation::Vsb8,
            }],
            ..Default::default()
        })
    }

    /// MGT announcing one VCT of `table_type` on the PSIP PID.
    fn mgt(table_type: u16) -> Vec<u8> {
        let body = [
            0x00, 0x00, 0x01,
            (table_type >> 8) as u8, table_type as u8, 0xFF, 0xFB, 0xE1, 0x00, 0x00, 0x00, 0x64, 0xF0, 0x00,
            0xF0, 0x00,
        ];
        build_section(table_id::MGT, 0, 0, 0, 0, &body)
    }

    /// VCT of transport stream 0x0801 with one local channel.
    fn vct(table: u8, descriptors: &[u8]) -> Vec<u8> {
        let mut body = vec![0x00, 0x01];
        body.extend(vct_channel_bytes("KQED", 9, 1, 0x0801, 3, 0x02, descriptors));
        body.extend_from_slice(&[0xFC, 0x00]);
        build_section(table, 0x0801, 0, 0, 0, &body)
    }

    #[test]
    fn test_atsc_lock_requests_psip() {
        let mut h = Harness::new(atsc_manual());
        h.start();
        h.lock(true);
        let mut active = h.demux.active_tables();
        active.sort_unstable();
        assert_eq!(active, vec![table_id::CAT, table_id::MGT]);

        // no MGT: the PAT is read instead
        h.now += Duration::from_millis(2600);
        h.pump();
        assert!(h.demux.active_tables().contains(&table_id::PAT));
    }

    #[test]
    fn test_vct_with_service_locations_skips_pat() {
        let mut h = Harness::new(atsc_manual());
        h.start();
        h.lock(true);

        h.deliver(pid::PSIP, &mgt(0x0000));
        assert_eq!(h.count("mgt_done"), 1);
        assert_eq!(h.demux.allocated_for(table_id::TVCT).len(), 1);
        assert!(h.demux.allocated_for(table_id::CVCT).is_empty());
        assert!(h.demux.active_tables().contains(&table_id::TVCT));

        let location = [
            0xA1, 0x09, 0xE0, 0x31, 0x01, 0x02, 0xE0, 0x31, 0x00, 0x00, 0x00,
        ];
        h.deliver(pid::PSIP, &vct(table_id::TVCT, &location));
        assert_eq!(h.count("vct_done"), 1);
        assert!(!h.demux.active_tables().contains(&table_id::TVCT));
        assert!(h.demux.allocated_for(table_id::PAT).is_empty());
    }

    #[test]
    fn test_vct_without_service_locations_reads_pat() {
        let mut h = Harness::new(atsc_manual());
        h.start();
        h.lock(true);

        h.deliver(pid::PSIP, &mgt(0x0002));
        assert_eq!(h.demux.allocated_for(table_id::CVCT).len(), 1);
        assert!(h.demux.allocated_for(table_id::TVCT).is_empty());
        assert!(h.demux.allocated_for(table_id::PAT).is_empty());

        h.deliver(pid::PSIP, &vct(table_id::CVCT, &[]));
        assert_eq!(h.count("vct_done"), 1);
        assert!(h.demux.active_tables().contains(&table_id::PAT));
    }

    #[test]
    fn test_quit_returns_store_flag() {
        let mut h = Harness::new(manual_cable());
        h.start();
        h.mailbox.post_quit(true);
        assert_eq!(h.pump(), Some(true));
        h.engine.shutdown();
        assert!(h.frontend.sink.lock().unwrap().is_none());
    }
}
