//! Raw section to decoded table dispatch.

use super::psi::{PsiSection, SiError};
use super::{
    table_id, BatSection, CatSection, MgtSection, NitSection, PatSection, PmtSection, SdtSection,
    VctSection,
};

/// A decoded SI section of any supported table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiTable {
    Pat(PatSection),
    Pmt(PmtSection),
    Cat(CatSection),
    Sdt(SdtSection),
    Nit(NitSection),
    Bat(BatSection),
    Mgt(MgtSection),
    Vct(VctSection),
}

impl SiTable {
    pub fn name(&self) -> &'static str {
        match self {
            SiTable::Pat(_) => "PAT",
            SiTable::Pmt(_) => "PMT",
            SiTable::Cat(_) => "CAT",
            SiTable::Sdt(_) => "SDT",
            SiTable::Nit(_) => "NIT",
            SiTable::Bat(_) => "BAT",
            SiTable::Mgt(_) => "MGT",
            SiTable::Vct(_) => "VCT",
        }
    }
}

/// Turns raw section bytes into a decoded table.
///
/// The scanner owns the returned value; dropping it releases it.
pub trait SectionDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<SiTable, SiError>;
}

/// Decoder for the tables in this module.
#[derive(Debug, Clone)]
pub struct SiDecoder {
    check_crc: bool,
}

impl Default for SiDecoder {
    fn default() -> Self {
        Self { check_crc: true }
    }
}

impl SiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip CRC verification, for sources whose demux already checked it.
    pub fn without_crc_check() -> Self {
        Self { check_crc: false }
    }
}

impl SectionDecoder for SiDecoder {
    fn decode(&self, raw: &[u8]) -> Result<SiTable, SiError> {
        let section = PsiSection::parse(raw)?;
        if self.check_crc {
            section.verify_crc(raw)?;
        }

        match section.header.table_id {
            table_id::PAT => PatSection::parse(&section).map(SiTable::Pat),
            table_id::CAT => CatSection::parse(&section).map(SiTable::Cat),
            table_id::PMT => PmtSection::parse(&section).map(SiTable::Pmt),
            table_id::NIT_ACTUAL | table_id::NIT_OTHER => {
                NitSection::parse(&section).map(SiTable::Nit)
            }
            table_id::SDT_ACTUAL | table_id::SDT_OTHER => {
                SdtSection::parse(&section).map(SiTable::Sdt)
            }
            table_id::BAT => BatSection::parse(&section).map(SiTable::Bat),
            table_id::MGT => MgtSection::parse(&section).map(SiTable::Mgt),
            table_id::TVCT | table_id::CVCT => VctSection::parse(&section).map(SiTable::Vct),
            other => Err(SiError::UnexpectedTable(other)),
        }
    }
}
