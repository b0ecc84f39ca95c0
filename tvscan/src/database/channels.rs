use std::collections::{HashMap, HashSet};

use log::{debug, info};
use rusqlite::{params, Connection};
use serde::Serialize;
use tvscan_protocol::{DtvStandard, EndCode, SatelliteParams, ScanError, ServiceType, SourceKind, TuneParams};

use super::{ChannelRecord, Database, Result, ScanHistoryRecord};
use crate::assembly::{
    assemble, lcn, ClearScope, LcnCandidates, LcnSlot, ServiceAssemblyRecord, StoreBatch,
    TransponderEntry,
};
use crate::channel_order::{number_analog, number_digital, OrderPolicy, OrderSlot};
use crate::result::ScanResult;
use crate::store::{ScanStore, StoreSummary};

/// Text form of a serde enum value (`"mpeg2"`, not `"\"mpeg2\""`).
fn enum_text<T: Serialize>(value: &T) -> Result<String> {
    Ok(match serde_json::to_value(value)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn source_from_code(code: i32) -> rusqlite::Result<SourceKind> {
    SourceKind::from_code(code).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, code as i64))
}

/// Services found by this scan, in scan order.
#[derive(Default)]
struct NewServices {
    order: Vec<i64>,
    lcn: HashMap<i64, LcnCandidates>,
}

struct StoredService {
    id: i64,
    service_type: ServiceType,
    frequency: u32,
    service_id: u16,
    lcn: Option<u16>,
    sd_lcn: Option<u16>,
    hd_lcn: Option<u16>,
    skip: bool,
    default_chan_num: i32,
}

impl Database {
    /// Write a scan's services and renumber the channel list in one transaction.
    pub fn store_batch(&mut self, batch: &StoreBatch, end_code: EndCode) -> Result<StoreSummary> {
        let tx = self.conn.transaction()?;

        match batch.clear_digital {
            ClearScope::Nothing => {}
            ClearScope::Source(source) => {
                let removed = tx.execute("DELETE FROM transponders WHERE source = ?1", [source.code()])?;
                debug!("Database: cleared {} transponders of {}", removed, source.as_str());
            }
            ClearScope::Satellite => {
                if let Some(id) = batch.satellite.as_ref().map(|sat| find_sat_para(&tx, sat)).transpose()?.flatten() {
                    tx.execute("DELETE FROM sat_paras WHERE id = ?1", [id])?;
                    debug!("Database: cleared satellite {}", id);
                }
            }
        }
        if batch.clear_analog {
            let removed = tx.execute(
                "DELETE FROM transponders WHERE source = ?1",
                [SourceKind::Analog.code()],
            )?;
            debug!("Database: cleared {} analog transponders", removed);
        }

        let sat_id = match &batch.satellite {
            Some(sat) if batch.has_digital() => Some(match find_sat_para(&tx, sat)? {
                Some(id) => id,
                None => insert_sat_para(&tx, sat)?,
            }),
            _ => None,
        };

        let mut fresh: HashMap<SourceKind, NewServices> = HashMap::new();
        for ts in &batch.transponders {
            let source = ts.source();
            let ts_sat = if source == SourceKind::Satellite { sat_id } else { None };
            let ts_id = upsert_transponder(&tx, ts, ts_sat)?;
            for service in &ts.services {
                let id = upsert_service(&tx, ts_id, source, ts_sat, service)?;
                let entry = fresh.entry(source).or_default();
                entry.order.push(id);
                entry.lcn.insert(id, service.lcn);
            }
        }

        if let Some(policy) = batch.order {
            for (source, new) in fresh.iter().filter(|(s, _)| **s != SourceKind::Analog) {
                renumber_digital(&tx, *source, policy, batch.standard, new)?;
            }
        }
        renumber_analog(&tx)?;

        tx.execute(
            "UPDATE services SET chan_num = default_chan_num, chan_order = default_chan_num,
                updated_at = strftime('%s', 'now')
             WHERE default_chan_num > 0",
            [],
        )?;

        let summary = StoreSummary {
            transponders: batch.transponders.len(),
            services: batch.service_count(),
        };
        let history_source = batch
            .transponders
            .iter()
            .map(|t| t.source())
            .find(|s| *s != SourceKind::Analog)
            .unwrap_or(SourceKind::Analog);
        tx.execute(
            "INSERT INTO scan_history (source, end_code, transponder_count, service_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                history_source.code(),
                end_code.as_str(),
                summary.transponders as i64,
                summary.services as i64
            ],
        )?;

        tx.commit()?;
        info!(
            "Database: stored {} transponders, {} services",
            summary.transponders, summary.services
        );
        Ok(summary)
    }

    /// Channel list, numbered channels first in channel order.
    pub fn channels(&self, source: Option<SourceKind>) -> Result<Vec<ChannelRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.transponder_id, s.source, t.frequency, s.service_id, s.name,
                    s.service_type, s.video_pid, s.scrambled, s.lcn, s.skip, s.chan_num,
                    s.chan_order, s.major, s.minor
             FROM services s JOIN transponders t ON t.id = s.transponder_id
             WHERE ?1 IS NULL OR s.source = ?1
             ORDER BY s.chan_num <= 0, s.chan_order, s.source, s.id",
        )?;
        let mut records = stmt
            .query_map([source.map(|s| s.code())], Self::row_to_channel_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut audio = self
            .conn
            .prepare("SELECT pid FROM service_audios WHERE service_ref = ?1 ORDER BY id")?;
        for record in &mut records {
            record.audio_pids = audio
                .query_map([record.id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<u16>, _>>()?;
        }
        Ok(records)
    }

    /// Look up one channel by its database id.
    pub fn channel(&self, id: i64) -> Result<Option<ChannelRecord>> {
        Ok(self.channels(None)?.into_iter().find(|c| c.id == id))
    }

    /// Get the most recent scan history entries.
    pub fn scan_history(&self, limit: i32) -> Result<Vec<ScanHistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, scan_time, end_code, transponder_count, service_count
             FROM scan_history ORDER BY id DESC LIMIT ?1",
        )?;

        let records = stmt
            .query_map([limit], |row| {
                Ok(ScanHistoryRecord {
                    id: row.get(0)?,
                    source: SourceKind::from_code(row.get(1)?),
                    scan_time: row.get(2)?,
                    end_code: row.get(3)?,
                    transponder_count: row.get(4)?,
                    service_count: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn row_to_channel_record(row: &rusqlite::Row) -> rusqlite::Result<ChannelRecord> {
        Ok(ChannelRecord {
            id: row.get(0)?,
            transponder_id: row.get(1)?,
            source: source_from_code(row.get(2)?)?,
            frequency: row.get(3)?,
            service_id: row.get(4)?,
            name: row.get(5)?,
            service_type: ServiceType::from_code(row.get(6)?),
            video_pid: row.get(7)?,
            scrambled: row.get::<_, i32>(8)? != 0,
            lcn: row.get(9)?,
            skip: row.get::<_, i32>(10)? != 0,
            chan_num: row.get(11)?,
            chan_order: row.get(12)?,
            major: row.get(13)?,
            minor: row.get(14)?,
            audio_pids: Vec::new(),
        })
    }
}

impl ScanStore for Database {
    fn persist(&mut self, result: &ScanResult) -> std::result::Result<StoreSummary, ScanError> {
        let batch = assemble(result);
        Ok(self.store_batch(&batch, result.end_code)?)
    }
}

fn find_sat_para(conn: &Connection, sat: &SatelliteParams) -> Result<Option<i64>> {
    let found = conn.query_row(
        "SELECT id FROM sat_paras
         WHERE name = ?1 AND lof_lo = ?2 AND lof_hi = ?3 AND lof_threshold = ?4 AND longitude = ?5",
        params![sat.name, sat.lof_lo_khz, sat.lof_hi_khz, sat.lof_threshold_khz, sat.longitude],
        |row| row.get(0),
    );
    match found {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn insert_sat_para(conn: &Connection, sat: &SatelliteParams) -> Result<i64> {
    conn.execute(
        "INSERT INTO sat_paras (name, lnb_num, lof_lo, lof_hi, lof_threshold, voltage, tone_22k,
            diseqc_committed, diseqc_uncommitted, motor_num, position, longitude,
            unicable_user_band, unicable_band_freq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            sat.name,
            sat.lnb_num,
            sat.lof_lo_khz,
            sat.lof_hi_khz,
            sat.lof_threshold_khz,
            enum_text(&sat.voltage)?,
            enum_text(&sat.tone_22k)?,
            sat.diseqc_committed,
            sat.diseqc_uncommitted,
            sat.motor_num,
            sat.position,
            sat.longitude,
            sat.unicable.map(|u| u.user_band),
            sat.unicable.map(|u| u.band_frequency_mhz),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn upsert_transponder(conn: &Connection, ts: &TransponderEntry, sat_id: Option<i64>) -> Result<i64> {
    let polarisation = match ts.params {
        TuneParams::Satellite { polarisation, .. } => polarisation.code(),
        _ => -1,
    };
    let tune_params = serde_json::to_string(&ts.params)?;

    let existing = conn.query_row(
        "SELECT id FROM transponders
         WHERE source = ?1 AND frequency = ?2 AND polarisation = ?3 AND sat_para_id IS ?4",
        params![ts.source().code(), ts.params.frequency(), polarisation, sat_id],
        |row| row.get::<_, i64>(0),
    );

    match existing {
        Ok(id) => {
            conn.execute(
                "UPDATE transponders SET tune_params = ?2, transport_stream_id = ?3,
                    original_network_id = ?4, snr = ?5, ber = ?6, strength = ?7,
                    updated_at = strftime('%s', 'now')
                 WHERE id = ?1",
                params![
                    id,
                    tune_params,
                    ts.transport_stream_id,
                    ts.original_network_id,
                    ts.signal.snr,
                    ts.signal.ber,
                    ts.signal.strength
                ],
            )?;
            Ok(id)
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            conn.execute(
                "INSERT INTO transponders (source, frequency, polarisation, sat_para_id, tune_params,
                    transport_stream_id, original_network_id, snr, ber, strength)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    ts.source().code(),
                    ts.params.frequency(),
                    polarisation,
                    sat_id,
                    tune_params,
                    ts.transport_stream_id,
                    ts.original_network_id,
                    ts.signal.snr,
                    ts.signal.ber,
                    ts.signal.strength
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }
        Err(e) => Err(e.into()),
    }
}

/// Insert or update a service; numbering fields are reset for resolution.
fn upsert_service(
    conn: &Connection,
    transponder_id: i64,
    source: SourceKind,
    sat_id: Option<i64>,
    service: &ServiceAssemblyRecord,
) -> Result<i64> {
    let video_format = service.video_format.as_ref().map(enum_text).transpose()?;
    let atsc = service.atsc;

    let existing = conn.query_row(
        "SELECT id FROM services WHERE transponder_id = ?1 AND service_id = ?2",
        params![transponder_id, service.service_id],
        |row| row.get::<_, i64>(0),
    );
    let id = match existing {
        Ok(id) => id,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            conn.execute(
                "INSERT INTO services (transponder_id, source, service_id, service_type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    transponder_id,
                    source.code(),
                    service.service_id,
                    service.service_type.code()
                ],
            )?;
            conn.last_insert_rowid()
        }
        Err(e) => return Err(e.into()),
    };

    conn.execute(
        "UPDATE services SET source = ?2, sat_para_id = ?3, name = ?4, service_type = ?5,
            video_pid = ?6, video_format = ?7, pcr_pid = ?8, scrambled = ?9, free_ca = ?10,
            eit_schedule = ?11, eit_present_following = ?12, running_status = ?13,
            major = ?14, minor = ?15, access_controlled = ?16, hidden = ?17, hide_guide = ?18,
            source_id = ?19, lcn = NULL, sd_lcn = NULL, hd_lcn = NULL, skip = 0,
            default_chan_num = -1, updated_at = strftime('%s', 'now')
         WHERE id = ?1",
        params![
            id,
            source.code(),
            sat_id,
            service.name,
            service.service_type.code(),
            service.video_pid,
            video_format,
            service.pcr_pid,
            service.scrambled,
            service.free_ca,
            service.eit_schedule,
            service.eit_present_following,
            service.running_status,
            atsc.map(|a| a.major),
            atsc.map(|a| a.minor),
            atsc.is_some_and(|a| a.access_controlled),
            atsc.is_some_and(|a| a.hidden),
            atsc.is_some_and(|a| a.hide_guide),
            atsc.map(|a| a.source_id),
        ],
    )?;

    conn.execute("DELETE FROM service_audios WHERE service_ref = ?1", [id])?;
    conn.execute("DELETE FROM service_subtitles WHERE service_ref = ?1", [id])?;
    conn.execute("DELETE FROM service_teletexts WHERE service_ref = ?1", [id])?;

    for audio in &service.audios {
        conn.execute(
            "INSERT INTO service_audios (service_ref, pid, format, language) VALUES (?1, ?2, ?3, ?4)",
            params![id, audio.pid, enum_text(&audio.format)?, audio.language],
        )?;
    }
    for sub in &service.subtitles {
        conn.execute(
            "INSERT INTO service_subtitles (service_ref, pid, language, subtitling_type,
                composition_page, ancillary_page)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                sub.pid,
                sub.language,
                sub.subtitling_type,
                sub.composition_page,
                sub.ancillary_page
            ],
        )?;
    }
    for ttx in &service.teletexts {
        conn.execute(
            "INSERT INTO service_teletexts (service_ref, pid, language, teletext_type, magazine, page)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, ttx.pid, ttx.language, ttx.teletext_type, ttx.magazine, ttx.page],
        )?;
    }

    Ok(id)
}

fn load_services(conn: &Connection, source: SourceKind) -> Result<Vec<StoredService>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.service_type, t.frequency, s.service_id, s.lcn, s.sd_lcn, s.hd_lcn,
                s.skip, s.default_chan_num
         FROM services s JOIN transponders t ON t.id = s.transponder_id
         WHERE s.source = ?1 ORDER BY s.id",
    )?;
    let rows = stmt
        .query_map([source.code()], |row| {
            Ok(StoredService {
                id: row.get(0)?,
                service_type: ServiceType::from_code(row.get(1)?),
                frequency: row.get(2)?,
                service_id: row.get(3)?,
                lcn: row.get(4)?,
                sd_lcn: row.get(5)?,
                hd_lcn: row.get(6)?,
                skip: row.get::<_, i32>(7)? != 0,
                default_chan_num: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Resolve LCNs and compute default numbers for one digital source.
fn renumber_digital(
    conn: &Connection,
    source: SourceKind,
    policy: OrderPolicy,
    standard: Option<DtvStandard>,
    new: &NewServices,
) -> Result<()> {
    let stored = load_services(conn, source)?;
    let is_new: HashSet<i64> = new.order.iter().copied().collect();

    // Services kept from earlier scans first, then this scan's in scan order.
    let by_id: HashMap<i64, &StoredService> = stored.iter().map(|s| (s.id, s)).collect();
    let ordered: Vec<&StoredService> = stored
        .iter()
        .filter(|s| !is_new.contains(&s.id))
        .chain(new.order.iter().filter_map(|id| by_id.get(id).copied()))
        .collect();

    let mut slots: Vec<LcnSlot> = ordered
        .iter()
        .map(|s| LcnSlot {
            id: s.id,
            service_type: s.service_type,
            is_new: is_new.contains(&s.id),
            candidates: new.lcn.get(&s.id).copied().unwrap_or_default(),
            lcn: s.lcn,
            sd_lcn: s.sd_lcn,
            hd_lcn: s.hd_lcn,
            skip: s.skip,
        })
        .collect();

    if standard != Some(DtvStandard::Atsc) {
        lcn::resolve(&mut slots);
        for slot in &slots {
            conn.execute(
                "UPDATE services SET lcn = ?2, sd_lcn = ?3, hd_lcn = ?4, skip = ?5 WHERE id = ?1",
                params![slot.id, slot.lcn, slot.sd_lcn, slot.hd_lcn, slot.skip],
            )?;
        }
    }

    let order_slots: Vec<OrderSlot> = ordered
        .iter()
        .zip(&slots)
        .map(|(s, slot)| OrderSlot {
            id: s.id,
            service_type: s.service_type,
            frequency: s.frequency,
            service_id: s.service_id,
            lcn: slot.lcn,
            previous: u32::try_from(s.default_chan_num).ok().filter(|n| *n > 0),
            is_new: slot.is_new,
        })
        .collect();

    let numbers = number_digital(&order_slots, policy);
    debug!(
        "Database: {} numbers for {} ({:?})",
        numbers.len(),
        source.as_str(),
        policy.method
    );
    for (id, number) in numbers {
        conn.execute(
            "UPDATE services SET default_chan_num = ?2 WHERE id = ?1",
            params![id, number],
        )?;
    }
    Ok(())
}

/// Analog programs are numbered after every digital channel.
fn renumber_analog(conn: &Connection) -> Result<()> {
    let last_digital: i64 = conn.query_row(
        "SELECT COALESCE(MAX(default_chan_num), 0) FROM services WHERE source != ?1",
        [SourceKind::Analog.code()],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT s.id, t.frequency
         FROM services s JOIN transponders t ON t.id = s.transponder_id
         WHERE s.source = ?1 AND s.service_type = ?2",
    )?;
    let programs = stmt
        .query_map(
            params![SourceKind::Analog.code(), ServiceType::Atv.code()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let first = u32::try_from(last_digital.max(0)).unwrap_or(0) + 1;
    for (id, number) in number_analog(&programs, first) {
        conn.execute(
            "UPDATE services SET default_chan_num = ?2 WHERE id = ?1",
            params![id, number],
        )?;
    }
    Ok(())
}
