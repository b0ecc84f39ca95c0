//! Logical channel number lookup and conflict resolution.
//!
//! Numbers are looked up in the NIT of the service's own transponder first
//! and then in the NITs of the other scanned transponders. A broadcaster may
//! announce an SD number (descriptor 0x83) and an HD simulcast number
//! (descriptor 0x88) for the same service.

use log::debug;
use tvscan_protocol::ServiceType;

use crate::ts_analyzer::descriptors::LcnEntry;
use crate::ts_analyzer::{descriptor_tag, NitSection};

/// First number handed out to services without a usable LCN.
pub const LCN_CONFLICT_START: u16 = 900;

/// SD and HD entries announced for one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LcnCandidates {
    pub sd: Option<LcnEntry>,
    pub hd: Option<LcnEntry>,
}

impl LcnCandidates {
    pub fn is_empty(&self) -> bool {
        self.sd.is_none() && self.hd.is_none()
    }

    /// Look up `service_id` of the transport stream `(onid, tsid)` in one
    /// transponder's NITs.
    pub fn lookup(
        nits: &[NitSection],
        original_network_id: u16,
        transport_stream_id: u16,
        service_id: u16,
    ) -> Self {
        let mut found = Self::default();
        let streams = nits
            .iter()
            .filter_map(|nit| nit.find_transport_stream(original_network_id, transport_stream_id));

        for ts in streams {
            if found.sd.is_none() {
                found.sd = ts
                    .logical_channels(descriptor_tag::LOGICAL_CHANNEL)
                    .into_iter()
                    .find(|e| e.service_id == service_id);
            }
            if found.hd.is_none() {
                found.hd = ts
                    .logical_channels(descriptor_tag::HD_SIMULCAST_LOGICAL_CHANNEL)
                    .into_iter()
                    .find(|e| e.service_id == service_id);
            }
            if found.sd.is_some() && found.hd.is_some() {
                break;
            }
        }
        found
    }

    /// Search the own transponder's NITs, then each other list in order,
    /// stopping at the first list that knows the service.
    pub fn search<'a>(
        own: &[NitSection],
        others: impl IntoIterator<Item = &'a [NitSection]>,
        original_network_id: u16,
        transport_stream_id: u16,
        service_id: u16,
    ) -> Self {
        let found = Self::lookup(own, original_network_id, transport_stream_id, service_id);
        if !found.is_empty() {
            return found;
        }
        others
            .into_iter()
            .map(|nits| Self::lookup(nits, original_network_id, transport_stream_id, service_id))
            .find(|c| !c.is_empty())
            .unwrap_or_default()
    }
}

/// Numbering state of one service of the source being stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcnSlot {
    pub id: i64,
    pub service_type: ServiceType,
    /// Found by this scan. Only these are resolved; the rest are occupants.
    pub is_new: bool,
    pub candidates: LcnCandidates,
    pub lcn: Option<u16>,
    pub sd_lcn: Option<u16>,
    pub hd_lcn: Option<u16>,
    pub skip: bool,
}

fn is_taken(slots: &[LcnSlot], number: u16, except: &[usize]) -> bool {
    slots
        .iter()
        .enumerate()
        .any(|(j, s)| !except.contains(&j) && s.lcn == Some(number))
}

fn next_free(slots: &[LcnSlot], conflict: &mut u16, except: &[usize]) -> u16 {
    while is_taken(slots, *conflict, except) {
        *conflict += 1;
    }
    let assigned = *conflict;
    *conflict += 1;
    assigned
}

/// Assign the final LCN of every new TV or radio slot, in slot order.
///
/// A service announcing both an SD and an HD number takes the HD number when
/// another service already holds that number as its SD number; that service
/// moves to its own HD number. Services without a number, or whose number
/// is taken, are placed from [`LCN_CONFLICT_START`] (or after the highest
/// number kept from earlier scans) upwards. The same applies to a moved
/// service without a free HD number.
pub fn resolve(slots: &mut [LcnSlot]) {
    for slot in slots.iter_mut().filter(|s| s.is_new) {
        slot.lcn = None;
        slot.sd_lcn = None;
        slot.hd_lcn = None;
    }

    let mut conflict = slots
        .iter()
        .filter(|s| !s.is_new)
        .filter_map(|s| s.lcn)
        .max()
        .map_or(LCN_CONFLICT_START, |max| max.saturating_add(1).max(LCN_CONFLICT_START));

    for i in 0..slots.len() {
        if !slots[i].is_new || !slots[i].service_type.is_tv_or_radio() {
            continue;
        }

        let LcnCandidates { sd, hd } = slots[i].candidates;
        let mut number = sd.map(|e| e.lcn);
        let mut visible = sd.map_or(true, |e| e.visible);

        match (sd, hd) {
            (Some(_), Some(hd)) => {
                let holder = (0..slots.len())
                    .find(|&j| {
                        j != i
                            && slots[j].sd_lcn == Some(hd.lcn)
                            && slots[j].lcn == Some(hd.lcn)
                    })
                    .filter(|&j| !is_taken(slots, hd.lcn, &[i, j]));
                if let Some(j) = holder {
                    slots[i].lcn = Some(hd.lcn);
                    slots[j].lcn = None;
                    let moved = match slots[j].hd_lcn {
                        Some(n) if !is_taken(slots, n, &[j]) => n,
                        _ => next_free(slots, &mut conflict, &[j]),
                    };
                    debug!("LCN: service {} moves from {} to {}", slots[j].id, hd.lcn, moved);
                    slots[j].lcn = Some(moved);
                    number = Some(hd.lcn);
                    visible = hd.visible;
                }
            }
            (None, Some(hd)) => {
                number = Some(hd.lcn);
                visible = hd.visible;
            }
            _ => {}
        }

        number = match number {
            Some(n) if !is_taken(slots, n, &[i]) => Some(n),
            requested => {
                let assigned = next_free(slots, &mut conflict, &[i]);
                match requested {
                    Some(n) => debug!("LCN: {} already used, service {} set to {}", n, slots[i].id, assigned),
                    None => debug!("LCN: no number for service {}, set to {}", slots[i].id, assigned),
                }
                Some(assigned)
            }
        };

        let slot = &mut slots[i];
        slot.lcn = number;
        slot.sd_lcn = sd.map(|e| e.lcn);
        slot.hd_lcn = hd.map(|e| e.lcn);
        slot.skip = !visible;
    }
}
