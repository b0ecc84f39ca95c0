//! CAT (Conditional Access Table) parsing.

use super::descriptors::{descriptors, CaDescriptor};
use super::psi::{PsiSection, SiError};
use super::{descriptor_tag, table_id};

/// One decoded CAT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatSection {
    pub version_number: u8,
    /// Raw descriptor loop.
    pub descriptors: Vec<u8>,
}

impl CatSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        if section.header.table_id != table_id::CAT {
            return Err(SiError::UnexpectedTable(section.header.table_id));
        }
        Ok(CatSection {
            version_number: section.header.version_number,
            descriptors: section.data.to_vec(),
        })
    }

    /// CA systems announced by the transport stream.
    pub fn ca_systems(&self) -> Vec<CaDescriptor> {
        descriptors(&self.descriptors)
            .filter(|(tag, _)| *tag == descriptor_tag::CA)
            .filter_map(|(_, body)| CaDescriptor::parse(body).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::build_section;

    #[test]
    fn test_parse_cat() {
        let raw = build_section(
            table_id::CAT,
            0xFFFF,
            2,
            0,
            0,
            &[0x09, 0x04, 0x01, 0x00, 0xE0, 0x40, 0x09, 0x04, 0x05, 0x00, 0xE0, 0x41],
        );
        let section = PsiSection::parse(&raw).unwrap();
        let cat = CatSection::parse(&section).unwrap();
        assert_eq!(cat.version_number, 2);
        let systems = cat.ca_systems();
        assert_eq!(systems.len(), 2);
        assert_eq!(systems[0].ca_system_id, 0x0100);
        assert_eq!(systems[1].ca_pid, 0x0041);
    }
}
