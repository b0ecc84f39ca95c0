//! MPEG-TS and SI table parsing.
//!
//! # Supported Tables
//! - PAT (Program Association Table) - PID 0x0000
//! - CAT (Conditional Access Table) - PID 0x0001
//! - PMT (Program Map Table) - PIDs from the PAT
//! - NIT (Network Information Table) - PID 0x0010
//! - SDT / BAT (Service Description / Bouquet Association) - PID 0x0011
//! - MGT / TVCT / CVCT (ATSC PSIP) - PID 0x1FFB
//!
//! Every parser works on a single section and returns an owned record, so
//! a table made of several sections is a list of records.

mod bat;
mod cat;
mod decoder;
pub mod descriptors;
mod mgt;
mod nit;
mod packet;
mod pat;
mod pmt;
mod psi;
mod sdt;
mod vct;

pub use bat::BatSection;
pub use cat::CatSection;
pub use decoder::{SectionDecoder, SiDecoder, SiTable};
pub use mgt::{MgtSection, MgtTable};
pub use nit::{NitSection, NitTransportStream};
pub use packet::{TsHeader, TsPacket, TsPacketIterator, SYNC_BYTE, TS_PACKET_SIZE};
pub use pat::{PatProgram, PatSection};
pub use pmt::{stream_type, PmtSection, PmtStream};
pub use psi::{crc32_mpeg2, PsiHeader, PsiSection, SectionCollector, SiError};
pub use sdt::{SdtSection, SdtService};
pub use vct::{VctChannel, VctSection};
#[cfg(test)]
pub(crate) use vct::vct_channel_bytes;

/// Well-known PIDs in MPEG-TS.
pub mod pid {
    pub const PAT: u16 = 0x0000;
    pub const CAT: u16 = 0x0001;
    /// Network Information Table PID.
    pub const NIT: u16 = 0x0010;
    /// SDT and BAT share this PID.
    pub const SDT: u16 = 0x0011;
    pub const BAT: u16 = 0x0011;
    /// ATSC PSIP base PID (MGT, VCT).
    pub const PSIP: u16 = 0x1FFB;
    /// Null packet PID (stuffing).
    pub const NULL: u16 = 0x1FFF;
}

/// Table IDs for PSI/SI tables.
pub mod table_id {
    pub const PAT: u8 = 0x00;
    pub const CAT: u8 = 0x01;
    pub const PMT: u8 = 0x02;
    /// Network Information Section - actual.
    pub const NIT_ACTUAL: u8 = 0x40;
    /// Network Information Section - other.
    pub const NIT_OTHER: u8 = 0x41;
    /// Service Description Section - actual.
    pub const SDT_ACTUAL: u8 = 0x42;
    /// Service Description Section - other.
    pub const SDT_OTHER: u8 = 0x46;
    /// Bouquet Association Section.
    pub const BAT: u8 = 0x4A;
    /// ATSC Master Guide Table.
    pub const MGT: u8 = 0xC7;
    /// ATSC Terrestrial Virtual Channel Table.
    pub const TVCT: u8 = 0xC8;
    /// ATSC Cable Virtual Channel Table.
    pub const CVCT: u8 = 0xC9;
}

/// Descriptor tags used in PSI/SI tables.
pub mod descriptor_tag {
    pub const CA: u8 = 0x09;
    pub const ISO_639_LANGUAGE: u8 = 0x0A;
    pub const NETWORK_NAME: u8 = 0x40;
    pub const SERVICE_LIST: u8 = 0x41;
    pub const SATELLITE_DELIVERY: u8 = 0x43;
    pub const CABLE_DELIVERY: u8 = 0x44;
    pub const BOUQUET_NAME: u8 = 0x47;
    pub const SERVICE: u8 = 0x48;
    pub const TELETEXT: u8 = 0x56;
    pub const SUBTITLING: u8 = 0x59;
    /// DVB-T terrestrial delivery system.
    pub const TERRESTRIAL_DELIVERY: u8 = 0x5A;
    pub const AC3: u8 = 0x6A;
    pub const ENHANCED_AC3: u8 = 0x7A;
    pub const DTS: u8 = 0x7B;
    /// Logical channel number (EACEM/NorDig private).
    pub const LOGICAL_CHANNEL: u8 = 0x83;
    /// HD simulcast logical channel number.
    pub const HD_SIMULCAST_LOGICAL_CHANNEL: u8 = 0x88;
    /// ATSC service location.
    pub const SERVICE_LOCATION: u8 = 0xA1;
    /// ISDB-T terrestrial delivery system.
    pub const ISDB_TERRESTRIAL_DELIVERY: u8 = 0xFA;
}

/// Build a long-form section with a valid CRC.
#[cfg(test)]
pub(crate) fn build_section(
    table_id: u8,
    extension: u16,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    body: &[u8],
) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut raw = vec![
        table_id,
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        section_length as u8,
        (extension >> 8) as u8,
        extension as u8,
        0xC1 | ((version & 0x1F) << 1),
        section_number,
        last_section_number,
    ];
    raw.extend_from_slice(body);
    let crc = crc32_mpeg2(&raw);
    raw.extend_from_slice(&crc.to_be_bytes());
    raw
}
