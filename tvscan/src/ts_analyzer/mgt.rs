//! ATSC MGT (Master Guide Table) parsing.

use super::psi::{PsiSection, SiError};
use super::table_id;

/// Table type values announced by the MGT.
pub mod table_type {
    pub const TVCT_CURRENT: u16 = 0x0000;
    pub const CVCT_CURRENT: u16 = 0x0002;
}

/// One entry of the MGT table loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MgtTable {
    pub table_type: u16,
    pub pid: u16,
    pub version_number: u8,
    pub number_bytes: u32,
}

/// One decoded MGT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MgtSection {
    pub version_number: u8,
    pub protocol_version: u8,
    pub tables: Vec<MgtTable>,
}

impl MgtSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        if section.header.table_id != table_id::MGT {
            return Err(SiError::UnexpectedTable(section.header.table_id));
        }

        let data = section.data;
        if data.len() < 3 {
            return Err(SiError::TooShort("MGT"));
        }

        let tables_defined = ((data[1] as usize) << 8) | data[2] as usize;
        let mut tables = Vec::with_capacity(tables_defined);
        let mut offset = 3;

        for _ in 0..tables_defined {
            if offset + 11 > data.len() {
                return Err(SiError::Malformed("MGT table loop"));
            }
            let entry = &data[offset..offset + 11];
            let descriptors_length = ((entry[9] as usize & 0x0F) << 8) | entry[10] as usize;
            tables.push(MgtTable {
                table_type: ((entry[0] as u16) << 8) | entry[1] as u16,
                pid: ((entry[2] as u16 & 0x1F) << 8) | entry[3] as u16,
                version_number: entry[4] & 0x1F,
                number_bytes: u32::from_be_bytes([entry[5], entry[6], entry[7], entry[8]]),
            });
            offset += 11 + descriptors_length;
        }

        Ok(MgtSection {
            version_number: section.header.version_number,
            protocol_version: data[0],
            tables,
        })
    }

    /// Returns true if the MGT announces a current TVCT or CVCT.
    pub fn has_vct(&self) -> bool {
        self.tables.iter().any(|t| {
            t.table_type == table_type::TVCT_CURRENT || t.table_type == table_type::CVCT_CURRENT
        })
    }

    /// Cable multiplexes announce a CVCT instead of a TVCT.
    pub fn is_cable(&self) -> bool {
        let has = |ty| self.tables.iter().any(|t| t.table_type == ty);
        has(table_type::CVCT_CURRENT) && !has(table_type::TVCT_CURRENT)
    }
}
