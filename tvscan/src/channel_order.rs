//! Default channel numbering.
//!
//! Only TV and radio services get a number. With `together` set, radio
//! services continue the TV sequence; otherwise both start on their own.

use serde::{Deserialize, Serialize};
use tvscan_protocol::{DtvStandard, ServiceType, SortMethod};

use crate::config::DtvConfig;

/// Numbering state of one digital service of the source being stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSlot {
    pub id: i64,
    pub service_type: ServiceType,
    pub frequency: u32,
    pub service_id: u16,
    pub lcn: Option<u16>,
    /// Number given by an earlier scan.
    pub previous: Option<u32>,
    /// Found by this scan.
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPolicy {
    pub method: SortMethod,
    pub together: bool,
    pub resort_all: bool,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            method: SortMethod::ScanOrder,
            together: true,
            resort_all: false,
        }
    }
}

impl OrderPolicy {
    /// ATSC channels carry no LCN, so LCN ordering falls back to scan order.
    pub fn for_config(dtv: &DtvConfig) -> Self {
        let method = match (dtv.sort, dtv.standard) {
            (SortMethod::Lcn, DtvStandard::Atsc) => SortMethod::ScanOrder,
            (method, _) => method,
        };
        Self {
            method,
            together: dtv.sort_together,
            resort_all: dtv.resort_all,
        }
    }
}

/// Compute `(id, number)` for the digital services that get a new number.
///
/// Scan order and LCN order renumber every TV and radio service. Service id
/// order renumbers everything with `resort_all`, and otherwise numbers only
/// the new services after the highest number already given.
pub fn number_digital(slots: &[OrderSlot], policy: OrderPolicy) -> Vec<(i64, u32)> {
    let of_type = |ty: ServiceType| slots.iter().filter(move |s| s.service_type == ty);

    match policy.method {
        SortMethod::ScanOrder => {
            let order = |ty| {
                let mut kept: Vec<&OrderSlot> = of_type(ty).filter(|s| !s.is_new).collect();
                kept.sort_by_key(|s| (s.previous.unwrap_or(u32::MAX), s.id));
                kept.extend(of_type(ty).filter(|s| s.is_new));
                kept
            };
            sequence(order(ServiceType::Tv), order(ServiceType::Radio), policy.together, (1, 1))
        }
        SortMethod::ServiceId => {
            let order = |ty| {
                let mut picked: Vec<&OrderSlot> = of_type(ty)
                    .filter(|s| policy.resort_all || s.is_new)
                    .collect();
                picked.sort_by_key(|s| (s.frequency, s.service_id, s.id));
                picked
            };
            let start = if policy.resort_all {
                (1, 1)
            } else {
                let max_of = |ty: Option<ServiceType>| {
                    slots
                        .iter()
                        .filter(|s| !s.is_new)
                        .filter(|s| match ty {
                            Some(ty) => s.service_type == ty,
                            None => s.service_type.is_tv_or_radio(),
                        })
                        .filter_map(|s| s.previous)
                        .max()
                        .unwrap_or(0)
                };
                if policy.together {
                    let next = max_of(None) + 1;
                    (next, next)
                } else {
                    (
                        max_of(Some(ServiceType::Tv)) + 1,
                        max_of(Some(ServiceType::Radio)) + 1,
                    )
                }
            };
            sequence(order(ServiceType::Tv), order(ServiceType::Radio), policy.together, start)
        }
        SortMethod::Lcn => {
            let key = |s: &&OrderSlot| (s.lcn.unwrap_or(u16::MAX), s.id);
            if policy.together {
                let mut all: Vec<&OrderSlot> = slots
                    .iter()
                    .filter(|s| s.service_type.is_tv_or_radio())
                    .collect();
                all.sort_by_key(key);
                all.iter().zip(1..).map(|(s, n)| (s.id, n)).collect()
            } else {
                let order = |ty| {
                    let mut picked: Vec<&OrderSlot> = of_type(ty).collect();
                    picked.sort_by_key(key);
                    picked
                };
                sequence(order(ServiceType::Tv), order(ServiceType::Radio), false, (1, 1))
            }
        }
    }
}

fn sequence(
    tv: Vec<&OrderSlot>,
    radio: Vec<&OrderSlot>,
    together: bool,
    (tv_start, radio_start): (u32, u32),
) -> Vec<(i64, u32)> {
    let mut numbers: Vec<(i64, u32)> = tv.iter().zip(tv_start..).map(|(s, n)| (s.id, n)).collect();
    let radio_start = if together {
        tv_start + tv.len() as u32
    } else {
        radio_start
    };
    numbers.extend(radio.iter().zip(radio_start..).map(|(s, n)| (s.id, n)));
    numbers
}

/// Number analog programs by ascending frequency, starting at `first`.
pub fn number_analog(programs: &[(i64, u32)], first: u32) -> Vec<(i64, u32)> {
    let mut sorted = programs.to_vec();
    sorted.sort_by_key(|&(id, frequency)| (frequency, id));
    sorted
        .into_iter()
        .zip(first..)
        .map(|((id, _), n)| (id, n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: i64, service_type: ServiceType, frequency: u32, service_id: u16) -> OrderSlot {
        OrderSlot {
            id,
            service_type,
            frequency,
            service_id,
            lcn: None,
            previous: None,
            is_new: true,
        }
    }

    fn kept(id: i64, service_type: ServiceType, previous: u32) -> OrderSlot {
        OrderSlot {
            previous: Some(previous),
            is_new: false,
            ..slot(id, service_type, 0, 0)
        }
    }

    fn policy(method: SortMethod, together: bool, resort_all: bool) -> OrderPolicy {
        OrderPolicy {
            method,
            together,
            resort_all,
        }
    }

    #[test]
    fn test_scan_order_appends_after_kept() {
        let slots = vec![
            kept(10, ServiceType::Tv, 2),
            kept(11, ServiceType::Tv, 1),
            slot(1, ServiceType::Radio, 474, 3),
            slot(2, ServiceType::Tv, 474, 2),
            slot(3, ServiceType::Other(0x0C), 474, 9),
        ];

        let split = number_digital(&slots, policy(SortMethod::ScanOrder, false, false));
        assert_eq!(split, vec![(11, 1), (10, 2), (2, 3), (1, 1)]);

        let together = number_digital(&slots, policy(SortMethod::ScanOrder, true, false));
        assert_eq!(together, vec![(11, 1), (10, 2), (2, 3), (1, 4)]);
    }

    #[test]
    fn test_service_id_order() {
        let slots = vec![
            slot(1, ServiceType::Tv, 482, 1),
            slot(2, ServiceType::Tv, 474, 20),
            slot(3, ServiceType::Tv, 474, 10),
            slot(4, ServiceType::Radio, 474, 5),
        ];
        let numbers = number_digital(&slots, policy(SortMethod::ServiceId, true, true));
        assert_eq!(numbers, vec![(3, 1), (2, 2), (1, 3), (4, 4)]);
    }

    #[test]
    fn test_service_id_continues_without_resort_all() {
        let slots = vec![
            kept(10, ServiceType::Tv, 4),
            kept(11, ServiceType::Radio, 2),
            slot(1, ServiceType::Tv, 474, 2),
            slot(2, ServiceType::Radio, 474, 1),
        ];
        let together = number_digital(&slots, policy(SortMethod::ServiceId, true, false));
        assert_eq!(together, vec![(1, 5), (2, 6)]);

        let split = number_digital(&slots, policy(SortMethod::ServiceId, false, false));
        assert_eq!(split, vec![(1, 5), (2, 3)]);
    }

    #[test]
    fn test_lcn_order() {
        let mut a = slot(1, ServiceType::Tv, 474, 1);
        a.lcn = Some(5);
        let mut b = slot(2, ServiceType::Radio, 474, 2);
        b.lcn = Some(3);
        let mut c = slot(3, ServiceType::Tv, 474, 3);
        c.lcn = Some(900);
        let slots = vec![a, b, c];

        let together = number_digital(&slots, policy(SortMethod::Lcn, true, false));
        assert_eq!(together, vec![(2, 1), (1, 2), (3, 3)]);

        let split = number_digital(&slots, policy(SortMethod::Lcn, false, false));
        assert_eq!(split, vec![(1, 1), (3, 2), (2, 1)]);
    }

    #[test]
    fn test_atsc_lcn_falls_back_to_scan_order() {
        let dtv = DtvConfig {
            standard: DtvStandard::Atsc,
            sort: SortMethod::Lcn,
            ..DtvConfig::default()
        };
        assert_eq!(OrderPolicy::for_config(&dtv).method, SortMethod::ScanOrder);
    }

    #[test]
    fn test_analog_by_frequency() {
        let numbers = number_analog(&[(1, 62_250_000), (2, 48_250_000), (3, 55_250_000)], 7);
        assert_eq!(numbers, vec![(2, 7), (3, 8), (1, 9)]);
    }
}
