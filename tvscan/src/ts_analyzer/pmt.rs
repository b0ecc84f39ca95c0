//! PMT (Program Map Table) parsing.
//!
//! The PMT describes one program: its PCR PID, program-level descriptors
//! and the elementary streams with their own descriptor loops.

use tvscan_protocol::{AudioFormat, VideoFormat};

use super::descriptors::has_descriptor;
use super::psi::{PsiSection, SiError};
use super::{descriptor_tag, table_id};

/// Stream type constants.
pub mod stream_type {
    pub const MPEG1_VIDEO: u8 = 0x01;
    pub const MPEG2_VIDEO: u8 = 0x02;
    pub const MPEG1_AUDIO: u8 = 0x03;
    pub const MPEG2_AUDIO: u8 = 0x04;
    pub const PRIVATE_SECTIONS: u8 = 0x05;
    /// PES private data; the ES descriptors tell what it carries.
    pub const PES_PRIVATE_DATA: u8 = 0x06;
    /// AAC Audio (ADTS).
    pub const AAC_AUDIO: u8 = 0x0F;
    pub const MPEG4_VIDEO: u8 = 0x10;
    /// AAC Audio (LATM).
    pub const AAC_LATM: u8 = 0x11;
    pub const H264_VIDEO: u8 = 0x1B;
    pub const H265_VIDEO: u8 = 0x24;
    pub const LPCM_AUDIO: u8 = 0x80;
    /// ATSC AC-3.
    pub const AC3_AUDIO: u8 = 0x81;
    pub const DTS_AUDIO: u8 = 0x82;
    /// ATSC E-AC-3.
    pub const EAC3_AUDIO: u8 = 0x87;
}

/// A single elementary stream entry in the PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
    /// ES info descriptors (raw loop).
    pub descriptors: Vec<u8>,
}

impl PmtStream {
    pub fn video_format(&self) -> Option<VideoFormat> {
        match self.stream_type {
            stream_type::MPEG1_VIDEO => Some(VideoFormat::Mpeg1),
            stream_type::MPEG2_VIDEO => Some(VideoFormat::Mpeg2),
            stream_type::MPEG4_VIDEO => Some(VideoFormat::Mpeg4),
            stream_type::H264_VIDEO => Some(VideoFormat::H264),
            stream_type::H265_VIDEO => Some(VideoFormat::Hevc),
            _ => None,
        }
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        match self.stream_type {
            stream_type::MPEG1_AUDIO | stream_type::MPEG2_AUDIO => Some(AudioFormat::Mpeg),
            stream_type::AAC_AUDIO => Some(AudioFormat::Aac),
            stream_type::AAC_LATM => Some(AudioFormat::AacLatm),
            stream_type::LPCM_AUDIO => Some(AudioFormat::Lpcm),
            stream_type::AC3_AUDIO => Some(AudioFormat::Ac3),
            stream_type::DTS_AUDIO => Some(AudioFormat::Dts),
            stream_type::EAC3_AUDIO => Some(AudioFormat::Eac3),
            stream_type::PES_PRIVATE_DATA => {
                if has_descriptor(&self.descriptors, descriptor_tag::AC3) {
                    Some(AudioFormat::Ac3)
                } else if has_descriptor(&self.descriptors, descriptor_tag::ENHANCED_AC3) {
                    Some(AudioFormat::Eac3)
                } else if has_descriptor(&self.descriptors, descriptor_tag::DTS) {
                    Some(AudioFormat::Dts)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.video_format().is_some()
    }

    pub fn is_audio(&self) -> bool {
        self.audio_format().is_some()
    }
}

/// One decoded PMT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmtSection {
    /// Program number (service ID).
    pub program_number: u16,
    pub version_number: u8,
    pub pcr_pid: u16,
    /// Program info descriptors (raw loop).
    pub program_info: Vec<u8>,
    pub streams: Vec<PmtStream>,
}

impl PmtSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        if section.header.table_id != table_id::PMT {
            return Err(SiError::UnexpectedTable(section.header.table_id));
        }

        let data = section.data;
        if data.len() < 4 {
            return Err(SiError::TooShort("PMT"));
        }

        let pcr_pid = ((data[0] as u16 & 0x1F) << 8) | data[1] as u16;
        let program_info_length = ((data[2] as usize & 0x0F) << 8) | data[3] as usize;

        if data.len() < 4 + program_info_length {
            return Err(SiError::Malformed("PMT program info length"));
        }

        let mut pmt = PmtSection {
            program_number: section.header.table_id_extension,
            version_number: section.header.version_number,
            pcr_pid,
            program_info: data[4..4 + program_info_length].to_vec(),
            streams: Vec::new(),
        };

        let mut offset = 4 + program_info_length;
        while offset + 5 <= data.len() {
            let stream_type = data[offset];
            let elementary_pid = ((data[offset + 1] as u16 & 0x1F) << 8) | data[offset + 2] as u16;
            let es_info_length =
                ((data[offset + 3] as usize & 0x0F) << 8) | data[offset + 4] as usize;

            offset += 5;

            if offset + es_info_length > data.len() {
                return Err(SiError::Malformed("PMT ES info length"));
            }

            pmt.streams.push(PmtStream {
                stream_type,
                elementary_pid,
                descriptors: data[offset..offset + es_info_length].to_vec(),
            });
            offset += es_info_length;
        }

        Ok(pmt)
    }

    /// Returns true if a CA descriptor appears at program or stream level.
    pub fn is_scrambled(&self) -> bool {
        has_descriptor(&self.program_info, descriptor_tag::CA)
            || self
                .streams
                .iter()
                .any(|s| has_descriptor(&s.descriptors, descriptor_tag::CA))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::psi::PsiHeader;

    fn section(data: &[u8]) -> PsiSection<'_> {
        PsiSection {
            header: PsiHeader {
                table_id: table_id::PMT,
                section_syntax_indicator: true,
                section_length: (9 + data.len()) as u16,
                table_id_extension: 0x0065,
                version_number: 0,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            },
            data,
            crc32: 0,
        }
    }

    #[test]
    fn test_parse_pmt() {
        let data = [
            // PCR PID = 0x0100
            0xE1, 0x00,
            // Program info length = 0
            0xF0, 0x00,
            // Video H.264, PID=0x0100
            0x1B, 0xE1, 0x00, 0xF0, 0x00,
            // PES private with AC-3 descriptor, PID=0x0110
            0x06, 0xE1, 0x10, 0xF0, 0x02, 0x6A, 0x00,
        ];

        let pmt = PmtSection::parse(&section(&data)).unwrap();
        assert_eq!(pmt.program_number, 0x0065);
        assert_eq!(pmt.pcr_pid, 0x0100);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[0].video_format(), Some(VideoFormat::H264));
        assert_eq!(pmt.streams[1].audio_format(), Some(AudioFormat::Ac3));
        assert!(!pmt.is_scrambled());
    }

    #[test]
    fn test_ca_descriptor_in_es_loop() {
        let data = [
            0xE1, 0x00, 0xF0, 0x00,
            0x02, 0xE1, 0x00, 0xF0, 0x06, 0x09, 0x04, 0x0B, 0x00, 0xE1, 0x50,
        ];
        let pmt = PmtSection::parse(&section(&data)).unwrap();
        assert!(pmt.is_scrambled());
    }

    #[test]
    fn test_truncated_es_loop() {
        let data = [0xE1, 0x00, 0xF0, 0x00, 0x02, 0xE1, 0x00, 0xF0, 0x08, 0x09];
        assert!(PmtSection::parse(&section(&data)).is_err());
    }
}
