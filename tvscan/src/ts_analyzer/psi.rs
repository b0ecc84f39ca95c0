//! PSI section framing: header parsing, CRC validation and reassembly of
//! sections that span several TS packets.

use thiserror::Error;

/// Errors raised while decoding a section.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiError {
    /// Fewer bytes than the structure needs.
    #[error("{0} too short")]
    TooShort(&'static str),

    /// A length field points outside the section.
    #[error("Malformed {0}")]
    Malformed(&'static str),

    #[error("CRC mismatch: calculated 0x{calculated:08X}, carried 0x{carried:08X}")]
    CrcMismatch { calculated: u32, carried: u32 },

    /// The table id is not handled by this parser.
    #[error("Unexpected table id 0x{0:02X}")]
    UnexpectedTable(u8),
}

impl From<SiError> for tvscan_protocol::ScanError {
    fn from(err: SiError) -> Self {
        tvscan_protocol::ScanError::ParseError(err.to_string())
    }
}

/// PSI section header (common to all PSI tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    /// Section length (12 bits), counted after the length field.
    pub section_length: u16,
    /// Table ID extension (long sections only).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

impl PsiHeader {
    /// Parse only the header fields of a section.
    ///
    /// Short sections (syntax indicator unset) get zero extension, version
    /// and section numbers.
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 3 {
            return Err(SiError::TooShort("section header"));
        }

        let table_id = data[0];
        let section_syntax_indicator = data[1] & 0x80 != 0;
        let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;

        if !section_syntax_indicator {
            return Ok(PsiHeader {
                table_id,
                section_syntax_indicator,
                section_length,
                table_id_extension: 0,
                version_number: 0,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            });
        }

        if data.len() < 8 {
            return Err(SiError::TooShort("extended section header"));
        }

        Ok(PsiHeader {
            table_id,
            section_syntax_indicator,
            section_length,
            table_id_extension: ((data[3] as u16) << 8) | data[4] as u16,
            version_number: (data[5] >> 1) & 0x1F,
            current_next_indicator: data[5] & 0x01 != 0,
            section_number: data[6],
            last_section_number: data[7],
        })
    }

    /// Total section length including header and CRC.
    pub fn total_length(&self) -> usize {
        3 + self.section_length as usize
    }
}

/// A parsed PSI section borrowing its payload.
#[derive(Debug, Clone)]
pub struct PsiSection<'a> {
    pub header: PsiHeader,
    /// Section data (after header, before CRC).
    pub data: &'a [u8],
    pub crc32: u32,
}

impl<'a> PsiSection<'a> {
    /// Parse a long-form PSI section from raw bytes starting at the table id.
    pub fn parse(data: &'a [u8]) -> Result<Self, SiError> {
        let header = PsiHeader::parse(data)?;

        if header.section_length < 9 {
            return Err(SiError::Malformed("section length"));
        }

        let total_length = header.total_length();
        if data.len() < total_length {
            return Err(SiError::TooShort("section"));
        }

        let data_start = if header.section_syntax_indicator { 8 } else { 3 };
        let data_end = total_length - 4;

        let crc32 = u32::from_be_bytes([
            data[data_end],
            data[data_end + 1],
            data[data_end + 2],
            data[data_end + 3],
        ]);

        Ok(PsiSection {
            header,
            data: &data[data_start..data_end],
            crc32,
        })
    }

    /// Verify CRC32 of the section against the raw bytes it was parsed from.
    pub fn verify_crc(&self, full_data: &[u8]) -> Result<(), SiError> {
        let total_length = self.header.total_length();
        if full_data.len() < total_length {
            return Err(SiError::TooShort("section"));
        }

        let calculated = crc32_mpeg2(&full_data[..total_length - 4]);
        if calculated == self.crc32 {
            Ok(())
        } else {
            Err(SiError::CrcMismatch {
                calculated,
                carried: self.crc32,
            })
        }
    }
}

/// Reassembles sections from the TS packets of one PID.
///
/// A packet may finish one section and start the next, so each push can
/// yield several complete sections.
#[derive(Debug, Default)]
pub struct SectionCollector {
    buffer: Vec<u8>,
    last_cc: Option<u8>,
}

impl SectionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_cc = None;
    }

    /// Feed the payload of one TS packet and return every completed section.
    pub fn push(&mut self, payload: &[u8], cc: u8, payload_unit_start: bool) -> Vec<Vec<u8>> {
        let mut sections = Vec::new();

        if let Some(last) = self.last_cc {
            if cc == last {
                // Duplicate packet
                return sections;
            }
            if cc != (last + 1) & 0x0F {
                self.buffer.clear();
            }
        }
        self.last_cc = Some(cc);

        if payload.is_empty() {
            return sections;
        }

        if payload_unit_start {
            let pointer = payload[0] as usize;
            if 1 + pointer > payload.len() {
                self.buffer.clear();
                return sections;
            }
            if !self.buffer.is_empty() {
                self.buffer.extend_from_slice(&payload[1..1 + pointer]);
                self.drain(&mut sections);
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&payload[1 + pointer..]);
        } else if !self.buffer.is_empty() {
            self.buffer.extend_from_slice(payload);
        } else {
            return sections;
        }

        self.drain(&mut sections);
        sections
    }

    fn drain(&mut self, sections: &mut Vec<Vec<u8>>) {
        loop {
            // 0xFF table id marks stuffing up to the end of the packet
            if self.buffer.first().map_or(true, |&b| b == 0xFF) {
                self.buffer.clear();
                return;
            }
            if self.buffer.len() < 3 {
                return;
            }
            let length = 3 + (((self.buffer[1] as usize & 0x0F) << 8) | self.buffer[2] as usize);
            if self.buffer.len() < length {
                return;
            }
            let rest = self.buffer.split_off(length);
            sections.push(std::mem::replace(&mut self.buffer, rest));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Calculate CRC32 for MPEG-2 (polynomial 0x04C11DB7).
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    static CRC_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 0x8000_0000 != 0 {
                    (crc << 1) ^ 0x04C1_1DB7
                } else {
                    crc << 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    data.iter().fold(0xFFFF_FFFFu32, |crc, &byte| {
        (crc << 8) ^ CRC_TABLE[((crc >> 24) ^ byte as u32) as usize]
    })
}
