//! NIT (Network Information Table) parsing.
//!
//! The NIT is transmitted on PID 0x0010 and lists the transport streams
//! of the network with their delivery system parameters. The BAT reuses
//! the same transport stream loop layout.

use tvscan_protocol::{Bandwidth, Modulation, Polarisation, TuneParams};

use super::descriptors::{
    descriptors, find_descriptor, parse_logical_channels, parse_name_descriptor,
    CableDeliveryDescriptor, IsdbTerrestrialDeliveryDescriptor, LcnEntry,
    SatelliteDeliveryDescriptor, TerrestrialDeliveryDescriptor,
};
use super::psi::{PsiSection, SiError};
use super::{descriptor_tag, table_id};

/// Transport stream entry of a NIT or BAT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NitTransportStream {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    /// Raw transport descriptor loop.
    pub descriptors: Vec<u8>,
}

impl NitTransportStream {
    /// Tuning parameters announced by the first delivery system descriptor.
    ///
    /// ISDB-T descriptors may announce several frequencies, each becomes one
    /// entry.
    pub fn tune_params(&self) -> Vec<TuneParams> {
        for (tag, body) in descriptors(&self.descriptors) {
            match tag {
                descriptor_tag::CABLE_DELIVERY => {
                    if let Ok(d) = CableDeliveryDescriptor::parse(body) {
                        return vec![TuneParams::Cable {
                            frequency: d.frequency,
                            symbol_rate: d.symbol_rate,
                            modulation: Modulation::from_cable_descriptor(d.modulation),
                        }];
                    }
                }
                descriptor_tag::TERRESTRIAL_DELIVERY => {
                    if let Ok(d) = TerrestrialDeliveryDescriptor::parse(body) {
                        return vec![TuneParams::Terrestrial {
                            frequency: d.centre_frequency,
                            bandwidth: Bandwidth::from_terrestrial_descriptor(d.bandwidth),
                        }];
                    }
                }
                descriptor_tag::ISDB_TERRESTRIAL_DELIVERY => {
                    if let Ok(d) = IsdbTerrestrialDeliveryDescriptor::parse(body) {
                        return d
                            .frequencies
                            .into_iter()
                            .map(|frequency| TuneParams::Terrestrial {
                                frequency,
                                bandwidth: Bandwidth::Mhz6,
                            })
                            .collect();
                    }
                }
                descriptor_tag::SATELLITE_DELIVERY => {
                    if let Ok(d) = SatelliteDeliveryDescriptor::parse(body) {
                        return vec![TuneParams::Satellite {
                            frequency: d.frequency,
                            symbol_rate: d.symbol_rate,
                            polarisation: if d.polarization == 1 {
                                Polarisation::Vertical
                            } else {
                                Polarisation::Horizontal
                            },
                        }];
                    }
                }
                _ => {}
            }
        }
        Vec::new()
    }

    /// Entries of every logical channel descriptor with `tag` (0x83 or 0x88).
    pub fn logical_channels(&self, tag: u8) -> Vec<LcnEntry> {
        descriptors(&self.descriptors)
            .filter(|(t, _)| *t == tag)
            .flat_map(|(_, body)| parse_logical_channels(body))
            .collect()
    }
}

/// Parse a transport stream loop starting at its 12-bit length field.
pub(super) fn parse_ts_loop(data: &[u8]) -> Result<Vec<NitTransportStream>, SiError> {
    if data.len() < 2 {
        return Err(SiError::TooShort("transport stream loop"));
    }
    let loop_length = ((data[0] as usize & 0x0F) << 8) | data[1] as usize;
    let end = 2 + loop_length;
    if end > data.len() {
        return Err(SiError::Malformed("transport stream loop length"));
    }

    let mut streams = Vec::new();
    let mut offset = 2;
    while offset + 6 <= end {
        let transport_stream_id = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
        let original_network_id = ((data[offset + 2] as u16) << 8) | data[offset + 3] as u16;
        let descriptors_length =
            ((data[offset + 4] as usize & 0x0F) << 8) | data[offset + 5] as usize;

        offset += 6;

        if offset + descriptors_length > end {
            return Err(SiError::Malformed("transport descriptors length"));
        }

        streams.push(NitTransportStream {
            transport_stream_id,
            original_network_id,
            descriptors: data[offset..offset + descriptors_length].to_vec(),
        });
        offset += descriptors_length;
    }

    Ok(streams)
}

/// Split a leading descriptor loop (12-bit length) from the rest of the data.
pub(super) fn split_descriptor_loop<'a>(
    data: &'a [u8],
    what: &'static str,
) -> Result<(&'a [u8], &'a [u8]), SiError> {
    if data.len() < 2 {
        return Err(SiError::TooShort(what));
    }
    let length = ((data[0] as usize & 0x0F) << 8) | data[1] as usize;
    if data.len() < 2 + length {
        return Err(SiError::Malformed(what));
    }
    Ok((&data[2..2 + length], &data[2 + length..]))
}

/// One decoded NIT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NitSection {
    pub network_id: u16,
    pub version_number: u8,
    pub section_number: u8,
    /// Network name (from descriptor).
    pub network_name: Option<String>,
    /// Raw network descriptor loop.
    pub network_descriptors: Vec<u8>,
    pub transport_streams: Vec<NitTransportStream>,
}

impl NitSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        if section.header.table_id != table_id::NIT_ACTUAL
            && section.header.table_id != table_id::NIT_OTHER
        {
            return Err(SiError::UnexpectedTable(section.header.table_id));
        }

        let (network_descriptors, rest) =
            split_descriptor_loop(section.data, "network descriptors")?;

        let network_name = find_descriptor(network_descriptors, descriptor_tag::NETWORK_NAME)
            .map(parse_name_descriptor)
            .filter(|name| !name.is_empty());

        Ok(NitSection {
            network_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            section_number: section.header.section_number,
            network_name,
            network_descriptors: network_descriptors.to_vec(),
            transport_streams: parse_ts_loop(rest)?,
        })
    }

    pub fn find_transport_stream(
        &self,
        original_network_id: u16,
        transport_stream_id: u16,
    ) -> Option<&NitTransportStream> {
        self.transport_streams.iter().find(|ts| {
            ts.transport_stream_id == transport_stream_id
                && ts.original_network_id == original_network_id
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::build_section;

    fn nit_body() -> Vec<u8> {
        vec![
            // network descriptors: name "NET"
            0xF0, 0x05, 0x40, 0x03, b'N', b'E', b'T',
            // transport stream loop length
            0xF0, 0x1D,
            // TS 0x0001 / ONID 0x0022, 23 bytes of descriptors
            0x00, 0x01, 0x00, 0x22, 0xF0, 0x17,
            // cable delivery: 346 MHz, 64-QAM, 6.875 Msym/s
            0x44, 0x0B, 0x03, 0x46, 0x00, 0x00, 0xFF, 0xF2, 0x03, 0x00, 0x68, 0x75, 0x05,
            // LCN: service 0x0065 -> 7 visible, service 0x0066 -> 8 hidden
            0x83, 0x08, 0x00, 0x65, 0xFC, 0x07, 0x00, 0x66, 0x7C, 0x08,
        ]
    }

    #[test]
    fn test_parse_nit() {
        let raw = build_section(table_id::NIT_ACTUAL, 0x3001, 1, 0, 0, &nit_body());
        let section = PsiSection::parse(&raw).unwrap();
        let nit = NitSection::parse(&section).unwrap();

        assert_eq!(nit.network_id, 0x3001);
        assert_eq!(nit.network_name.as_deref(), Some("NET"));
        assert_eq!(nit.transport_streams.len(), 1);

        let ts = nit.find_transport_stream(0x0022, 0x0001).unwrap();
        assert_eq!(
            ts.tune_params(),
            vec![TuneParams::Cable {
                frequency: 346_000_000,
                symbol_rate: 6_875_000,
                modulation: Modulation::Qam64,
            }]
        );
        let lcns = ts.logical_channels(descriptor_tag::LOGICAL_CHANNEL);
        assert_eq!(lcns.len(), 2);
        assert_eq!(lcns[0].lcn, 7);
        assert!(!lcns[1].visible);
        assert!(ts
            .logical_channels(descriptor_tag::HD_SIMULCAST_LOGICAL_CHANNEL)
            .is_empty());
    }

    #[test]
    fn test_bad_loop_length() {
        let mut body = nit_body();
        body[8] = 0x40;
        let raw = build_section(table_id::NIT_ACTUAL, 0x3001, 1, 0, 0, &body);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(NitSection::parse(&section).is_err());
    }
}
