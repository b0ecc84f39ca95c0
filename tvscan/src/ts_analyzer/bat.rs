//! BAT (Bouquet Association Table) parsing.
//!
//! Shares PID 0x0011 with the SDT. One bouquet is one subtable, so a
//! complete BAT is usually several subtables with different bouquet ids.

use super::descriptors::{find_descriptor, parse_name_descriptor};
use super::nit::{parse_ts_loop, split_descriptor_loop, NitTransportStream};
use super::psi::{PsiSection, SiError};
use super::{descriptor_tag, table_id};

/// One decoded BAT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatSection {
    pub bouquet_id: u16,
    pub version_number: u8,
    pub bouquet_name: Option<String>,
    /// Raw bouquet descriptor loop.
    pub bouquet_descriptors: Vec<u8>,
    pub transport_streams: Vec<NitTransportStream>,
}

impl BatSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        if section.header.table_id != table_id::BAT {
            return Err(SiError::UnexpectedTable(section.header.table_id));
        }

        let (bouquet_descriptors, rest) =
            split_descriptor_loop(section.data, "bouquet descriptors")?;

        Ok(BatSection {
            bouquet_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            bouquet_name: find_descriptor(bouquet_descriptors, descriptor_tag::BOUQUET_NAME)
                .map(parse_name_descriptor),
            bouquet_descriptors: bouquet_descriptors.to_vec(),
            transport_streams: parse_ts_loop(rest)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::build_section;

    #[test]
    fn test_parse_bat() {
        let body = [
            0xF0, 0x05, 0x47, 0x03, b'S', b'K', b'Y',
            0xF0, 0x06,
            0x07, 0xD0, 0x00, 0x02, 0xF0, 0x00,
        ];
        let raw = build_section(table_id::BAT, 0x1000, 0, 0, 0, &body);
        let section = PsiSection::parse(&raw).unwrap();
        let bat = BatSection::parse(&section).unwrap();
        assert_eq!(bat.bouquet_id, 0x1000);
        assert_eq!(bat.bouquet_name.as_deref(), Some("SKY"));
        assert_eq!(bat.transport_streams[0].transport_stream_id, 0x07D0);
        assert_eq!(bat.transport_streams[0].original_network_id, 0x0002);
    }
}
