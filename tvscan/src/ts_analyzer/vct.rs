//! ATSC TVCT/CVCT (Virtual Channel Table) parsing.

use super::descriptors::{find_descriptor, ServiceLocationDescriptor};
use super::psi::{PsiSection, SiError};
use super::{descriptor_tag, table_id};

/// One virtual channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VctChannel {
    pub short_name: String,
    pub major_channel_number: u16,
    pub minor_channel_number: u16,
    pub modulation_mode: u8,
    pub carrier_frequency: u32,
    pub channel_tsid: u16,
    pub program_number: u16,
    pub access_controlled: bool,
    pub hidden: bool,
    pub hide_guide: bool,
    pub service_type: u8,
    pub source_id: u16,
    /// Raw descriptor loop.
    pub descriptors: Vec<u8>,
}

impl VctChannel {
    pub fn service_location(&self) -> Option<ServiceLocationDescriptor> {
        find_descriptor(&self.descriptors, descriptor_tag::SERVICE_LOCATION)
            .and_then(|d| ServiceLocationDescriptor::parse(d).ok())
    }
}

/// One decoded VCT section (terrestrial or cable).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VctSection {
    pub table_id: u8,
    pub transport_stream_id: u16,
    pub version_number: u8,
    pub channels: Vec<VctChannel>,
}

const CHANNEL_FIXED_LEN: usize = 32;

impl VctSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        let tid = section.header.table_id;
        if tid != table_id::TVCT && tid != table_id::CVCT {
            return Err(SiError::UnexpectedTable(tid));
        }

        let data = section.data;
        if data.len() < 2 {
            return Err(SiError::TooShort("VCT"));
        }

        let count = data[1] as usize;
        let mut channels = Vec::with_capacity(count);
        let mut offset = 2;

        for _ in 0..count {
            if offset + CHANNEL_FIXED_LEN > data.len() {
                return Err(SiError::Malformed("VCT channel loop"));
            }
            let c = &data[offset..offset + CHANNEL_FIXED_LEN];
            let descriptors_length = ((c[30] as usize & 0x03) << 8) | c[31] as usize;
            let start = offset + CHANNEL_FIXED_LEN;
            if start + descriptors_length > data.len() {
                return Err(SiError::Malformed("VCT descriptors length"));
            }

            let name_units: Vec<u16> = c[0..14]
                .chunks_exact(2)
                .map(|u| ((u[0] as u16) << 8) | u[1] as u16)
                .take_while(|&u| u != 0)
                .collect();

            channels.push(VctChannel {
                short_name: String::from_utf16_lossy(&name_units).trim_end().to_string(),
                major_channel_number: ((c[14] as u16 & 0x0F) << 6) | (c[15] as u16 >> 2),
                minor_channel_number: ((c[15] as u16 & 0x03) << 8) | c[16] as u16,
                modulation_mode: c[17],
                carrier_frequency: u32::from_be_bytes([c[18], c[19], c[20], c[21]]),
                channel_tsid: ((c[22] as u16) << 8) | c[23] as u16,
                program_number: ((c[24] as u16) << 8) | c[25] as u16,
                access_controlled: c[26] & 0x20 != 0,
                hidden: c[26] & 0x10 != 0,
                hide_guide: c[26] & 0x02 != 0,
                service_type: c[27] & 0x3F,
                source_id: ((c[28] as u16) << 8) | c[29] as u16,
                descriptors: data[start..start + descriptors_length].to_vec(),
            });
            offset = start + descriptors_length;
        }

        Ok(VctSection {
            table_id: tid,
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            channels,
        })
    }

    /// Channels carried by the transport stream this VCT was received on.
    pub fn local_channels(&self) -> impl Iterator<Item = &VctChannel> {
        let tsid = self.transport_stream_id;
        self.channels.iter().filter(move |c| c.channel_tsid == tsid)
    }
}

#[cfg(test)]
pub(crate) fn vct_channel_bytes(
    name: &str,
    major: u16,
    minor: u16,
    tsid: u16,
    program: u16,
    service_type: u8,
    descriptors: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut units: Vec<u16> = name.encode_utf16().collect();
    units.resize(7, 0);
    for u in units {
        out.extend_from_slice(&u.to_be_bytes());
    }
    out.push(0xF0 | ((major >> 6) as u8 & 0x0F));
    out.push(((major as u8 & 0x3F) << 2) | ((minor >> 8) as u8 & 0x03));
    out.push(minor as u8);
    out.push(0x04);
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&tsid.to_be_bytes());
    out.extend_from_slice(&program.to_be_bytes());
    out.push(0x0D);
    out.push(0xC0 | service_type);
    out.extend_from_slice(&(program + 0x100).to_be_bytes());
    out.push(0xFC | ((descriptors.len() >> 8) as u8 & 0x03));
    out.push(descriptors.len() as u8);
    out.extend_from_slice(descriptors);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::build_section;

    #[test]
    fn test_parse_tvct() {
        let location = [
            0xA1, 0x09, 0xE0, 0x31, 0x01, 0x02, 0xE0, 0x31, 0x00, 0x00, 0x00,
        ];
        let mut body = vec![0x00, 0x02];
        body.extend(vct_channel_bytes("KQED", 9, 1, 0x0801, 3, 0x02, &location));
        body.extend(vct_channel_bytes("OTHER", 2, 1, 0x0999, 1, 0x02, &[]));
        body.extend_from_slice(&[0xFC, 0x00]);

        let raw = build_section(table_id::TVCT, 0x0801, 0, 0, 0, &body);
        let section = PsiSection::parse(&raw).unwrap();
        let vct = VctSection::parse(&section).unwrap();

        assert_eq!(vct.channels.len(), 2);
        let ch = &vct.channels[0];
        assert_eq!(ch.short_name, "KQED");
        assert_eq!(ch.major_channel_number, 9);
        assert_eq!(ch.minor_channel_number, 1);
        assert_eq!(ch.program_number, 3);
        assert_eq!(ch.service_type, 0x02);
        assert_eq!(ch.source_id, 0x103);
        assert_eq!(ch.service_location().unwrap().elements.len(), 1);

        let local: Vec<_> = vct.local_channels().map(|c| c.short_name.as_str()).collect();
        assert_eq!(local, vec!["KQED"]);
    }
}
