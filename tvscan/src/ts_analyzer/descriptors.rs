//! Descriptor parsing for PSI/SI tables.
//!
//! Only the descriptors channel assembly needs are decoded: delivery
//! systems (NIT), service names (SDT), CA presence, languages, subtitles,
//! teletext, logical channel numbers and the ATSC service location.

use encoding_rs::Encoding;

use super::psi::SiError;

/// Iterate over `(tag, body)` pairs of a descriptor loop.
///
/// A truncated trailing descriptor ends the iteration.
pub fn descriptors(data: &[u8]) -> DescriptorIter<'_> {
    DescriptorIter { data, offset: 0 }
}

pub struct DescriptorIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + 2 > self.data.len() {
            return None;
        }
        let tag = self.data[self.offset];
        let length = self.data[self.offset + 1] as usize;
        let start = self.offset + 2;
        if start + length > self.data.len() {
            self.offset = self.data.len();
            return None;
        }
        self.offset = start + length;
        Some((tag, &self.data[start..start + length]))
    }
}

/// Find the first descriptor with `tag` in a descriptor loop.
pub fn find_descriptor(data: &[u8], tag: u8) -> Option<&[u8]> {
    descriptors(data).find(|(t, _)| *t == tag).map(|(_, d)| d)
}

/// Returns true if the loop carries a descriptor with `tag`.
pub fn has_descriptor(data: &[u8], tag: u8) -> bool {
    descriptors(data).any(|(t, _)| t == tag)
}

/// Conditional access descriptor (0x09).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaDescriptor {
    pub ca_system_id: u16,
    pub ca_pid: u16,
}

impl CaDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 4 {
            return Err(SiError::TooShort("CA descriptor"));
        }
        Ok(CaDescriptor {
            ca_system_id: ((data[0] as u16) << 8) | data[1] as u16,
            ca_pid: ((data[2] as u16 & 0x1F) << 8) | data[3] as u16,
        })
    }
}

/// ISO 639 language descriptor (0x0A); returns the first language code.
pub fn parse_iso639_language(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    Some(language_code(&data[0..3]))
}

fn language_code(data: &[u8]) -> String {
    data.iter()
        .filter(|b| b.is_ascii_alphanumeric())
        .map(|&b| (b as char).to_ascii_lowercase())
        .collect()
}

/// Cable delivery system descriptor (0x44).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CableDeliveryDescriptor {
    /// Frequency in Hz.
    pub frequency: u32,
    pub fec_outer: u8,
    /// Raw modulation field (0x03 = 64-QAM).
    pub modulation: u8,
    /// Symbol rate in symbols/s.
    pub symbol_rate: u32,
    pub fec_inner: u8,
}

impl CableDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 11 {
            return Err(SiError::TooShort("cable delivery descriptor"));
        }
        Ok(CableDeliveryDescriptor {
            // 8 BCD digits, 100 Hz units
            frequency: bcd_to_u32(&data[0..4]).saturating_mul(100),
            fec_outer: data[5] & 0x0F,
            modulation: data[6],
            // 7 BCD digits, 100 symbol/s units
            symbol_rate: (bcd_to_u32(&data[7..11]) / 10).saturating_mul(100),
            fec_inner: data[10] & 0x0F,
        })
    }
}

/// DVB-T terrestrial delivery system descriptor (0x5A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrestrialDeliveryDescriptor {
    /// Centre frequency in Hz.
    pub centre_frequency: u32,
    /// Raw bandwidth field (0 = 8 MHz, 1 = 7 MHz, 2 = 6 MHz).
    pub bandwidth: u8,
}

impl TerrestrialDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 5 {
            return Err(SiError::TooShort("terrestrial delivery descriptor"));
        }
        let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        Ok(TerrestrialDeliveryDescriptor {
            centre_frequency: raw.saturating_mul(10),
            bandwidth: data[4] >> 5,
        })
    }
}

/// ISDB-T terrestrial delivery system descriptor (0xFA).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsdbTerrestrialDeliveryDescriptor {
    pub area_code: u16,
    pub guard_interval: u8,
    pub transmission_mode: u8,
    /// Frequencies in Hz.
    pub frequencies: Vec<u32>,
}

impl IsdbTerrestrialDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 2 {
            return Err(SiError::TooShort("ISDB-T delivery descriptor"));
        }

        let frequencies = data[2..]
            .chunks_exact(2)
            // 1/7 MHz units
            .map(|c| ((((c[0] as u64) << 8) | c[1] as u64) * 1_000_000 / 7) as u32)
            .collect();

        Ok(IsdbTerrestrialDeliveryDescriptor {
            area_code: ((data[0] as u16) << 4) | ((data[1] as u16) >> 4),
            guard_interval: (data[1] >> 2) & 0x03,
            transmission_mode: data[1] & 0x03,
            frequencies,
        })
    }
}

/// Satellite delivery system descriptor (0x43).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatelliteDeliveryDescriptor {
    /// Frequency in kHz.
    pub frequency: u32,
    /// Orbital position in 0.1 degree units.
    pub orbital_position: u16,
    pub west_east_flag: bool,
    /// 0 = linear horizontal, 1 = linear vertical.
    pub polarization: u8,
    pub modulation_system: u8,
    pub modulation_type: u8,
    /// Symbol rate in symbols/s.
    pub symbol_rate: u32,
    pub fec_inner: u8,
}

impl SatelliteDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 11 {
            return Err(SiError::TooShort("satellite delivery descriptor"));
        }

        Ok(SatelliteDeliveryDescriptor {
            // 8 BCD digits, 10 kHz units
            frequency: bcd_to_u32(&data[0..4]).saturating_mul(10),
            orbital_position: bcd_to_u32(&data[4..6]) as u16,
            west_east_flag: data[6] & 0x80 != 0,
            polarization: (data[6] >> 5) & 0x03,
            modulation_system: (data[6] >> 2) & 0x01,
            modulation_type: data[6] & 0x03,
            symbol_rate: (bcd_to_u32(&data[7..11]) / 10).saturating_mul(100),
            fec_inner: data[10] & 0x0F,
        })
    }
}

/// Service descriptor (0x48).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    pub provider_name: String,
    pub service_name: String,
}

impl ServiceDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 3 {
            return Err(SiError::TooShort("service descriptor"));
        }

        let service_type = data[0];
        let provider_name_length = data[1] as usize;

        if data.len() < 2 + provider_name_length + 1 {
            return Err(SiError::Malformed("service descriptor provider name"));
        }

        let provider_name = decode_dvb_string(&data[2..2 + provider_name_length]);

        let service_name_offset = 2 + provider_name_length;
        let service_name_length = data[service_name_offset] as usize;

        if data.len() < service_name_offset + 1 + service_name_length {
            return Err(SiError::Malformed("service descriptor service name"));
        }

        let service_name = decode_dvb_string(
            &data[service_name_offset + 1..service_name_offset + 1 + service_name_length],
        );

        Ok(ServiceDescriptor {
            service_type,
            provider_name,
            service_name,
        })
    }
}

/// Network name (0x40) and bouquet name (0x47) descriptors share this layout.
pub fn parse_name_descriptor(data: &[u8]) -> String {
    decode_dvb_string(data)
}

/// One entry of a subtitling descriptor (0x59).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitlingEntry {
    pub language: String,
    pub subtitling_type: u8,
    pub composition_page_id: u16,
    pub ancillary_page_id: u16,
}

pub fn parse_subtitling(data: &[u8]) -> Vec<SubtitlingEntry> {
    data.chunks_exact(8)
        .map(|c| SubtitlingEntry {
            language: language_code(&c[0..3]),
            subtitling_type: c[3],
            composition_page_id: ((c[4] as u16) << 8) | c[5] as u16,
            ancillary_page_id: ((c[6] as u16) << 8) | c[7] as u16,
        })
        .collect()
}

/// One entry of a teletext descriptor (0x56).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeletextEntry {
    pub language: String,
    pub teletext_type: u8,
    pub magazine_number: u8,
    pub page_number: u8,
}

pub fn parse_teletext(data: &[u8]) -> Vec<TeletextEntry> {
    data.chunks_exact(5)
        .map(|c| TeletextEntry {
            language: language_code(&c[0..3]),
            teletext_type: c[3] >> 3,
            magazine_number: c[3] & 0x07,
            page_number: c[4],
        })
        .collect()
}

/// One entry of a logical channel descriptor (0x83 SD, 0x88 HD simulcast).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcnEntry {
    pub service_id: u16,
    pub visible: bool,
    pub lcn: u16,
}

pub fn parse_logical_channels(data: &[u8]) -> Vec<LcnEntry> {
    data.chunks_exact(4)
        .map(|c| LcnEntry {
            service_id: ((c[0] as u16) << 8) | c[1] as u16,
            visible: c[2] & 0x80 != 0,
            lcn: ((c[2] as u16 & 0x03) << 8) | c[3] as u16,
        })
        .collect()
}

/// ATSC service location descriptor (0xA1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceLocationDescriptor {
    pub pcr_pid: u16,
    pub elements: Vec<ServiceLocationElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLocationElement {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub language: String,
}

impl ServiceLocationDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, SiError> {
        if data.len() < 3 {
            return Err(SiError::TooShort("service location descriptor"));
        }
        let count = data[2] as usize;
        if data.len() < 3 + count * 6 {
            return Err(SiError::Malformed("service location descriptor"));
        }
        let elements = data[3..3 + count * 6]
            .chunks_exact(6)
            .map(|c| ServiceLocationElement {
                stream_type: c[0],
                elementary_pid: ((c[1] as u16 & 0x1F) << 8) | c[2] as u16,
                language: language_code(&c[3..6]),
            })
            .collect();
        Ok(ServiceLocationDescriptor {
            pcr_pid: ((data[0] as u16 & 0x1F) << 8) | data[1] as u16,
            elements,
        })
    }
}

/// Decode a DVB text field (EN 300 468 annex A) to UTF-8.
///
/// The first byte may select a character table; without one the default
/// Latin table is assumed. Single-byte control codes 0x80..=0x9F are dropped.
pub fn decode_dvb_string(data: &[u8]) -> String {
    let Some(&first) = data.first() else {
        return String::new();
    };

    let (encoding, body): (&'static Encoding, &[u8]) = match first {
        0x01 => (encoding_rs::ISO_8859_5, &data[1..]),
        0x02 => (encoding_rs::ISO_8859_6, &data[1..]),
        0x03 => (encoding_rs::ISO_8859_7, &data[1..]),
        0x04 => (encoding_rs::ISO_8859_8, &data[1..]),
        0x05 => (encoding_rs::WINDOWS_1254, &data[1..]),
        0x06 => (encoding_rs::ISO_8859_10, &data[1..]),
        0x07 => (encoding_rs::WINDOWS_874, &data[1..]),
        0x09 => (encoding_rs::ISO_8859_13, &data[1..]),
        0x0A => (encoding_rs::ISO_8859_14, &data[1..]),
        0x0B => (encoding_rs::ISO_8859_15, &data[1..]),
        0x10 if data.len() >= 3 => (iso_8859_part(data[2]), &data[3..]),
        0x11 => (encoding_rs::UTF_16BE, &data[1..]),
        0x13 => (encoding_rs::GBK, &data[1..]),
        0x14 => (encoding_rs::BIG5, &data[1..]),
        0x15 => (encoding_rs::UTF_8, &data[1..]),
        0x00..=0x1F => (encoding_rs::WINDOWS_1252, &data[1..]),
        _ => (encoding_rs::WINDOWS_1252, data),
    };

    let text = if encoding == encoding_rs::UTF_16BE || encoding == encoding_rs::UTF_8 {
        encoding.decode_without_bom_handling(body).0.into_owned()
    } else {
        let filtered: Vec<u8> = body
            .iter()
            .copied()
            .filter(|b| !(0x80..=0x9F).contains(b))
            .collect();
        encoding.decode_without_bom_handling(&filtered).0.into_owned()
    };

    text.chars().filter(|c| !c.is_control()).collect()
}

fn iso_8859_part(part: u8) -> &'static Encoding {
    match part {
        0x02 => encoding_rs::ISO_8859_2,
        0x03 => encoding_rs::ISO_8859_3,
        0x04 => encoding_rs::ISO_8859_4,
        0x05 => encoding_rs::ISO_8859_5,
        0x06 => encoding_rs::ISO_8859_6,
        0x07 => encoding_rs::ISO_8859_7,
        0x08 => encoding_rs::ISO_8859_8,
        0x09 => encoding_rs::WINDOWS_1254,
        0x0A => encoding_rs::ISO_8859_10,
        0x0B => encoding_rs::WINDOWS_874,
        0x0D => encoding_rs::ISO_8859_13,
        0x0E => encoding_rs::ISO_8859_14,
        0x0F => encoding_rs::ISO_8859_15,
        0x10 => encoding_rs::ISO_8859_16,
        _ => encoding_rs::WINDOWS_1252,
    }
}

/// Convert BCD bytes to u32.
pub(crate) fn bcd_to_u32(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &byte| {
        acc.wrapping_mul(100) + (byte >> 4) as u32 * 10 + (byte & 0x0F) as u32
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_descriptor() {
        let data = [
            0x01, // service_type = Digital TV
            0x04, b'T', b'E', b'S', b'T',
            0x07, b'C', b'H', b' ', b'N', b'A', b'M', b'E',
        ];

        let desc = ServiceDescriptor::parse(&data).unwrap();
        assert_eq!(desc.service_type, 0x01);
        assert_eq!(desc.provider_name, "TEST");
        assert_eq!(desc.service_name, "CH NAME");
    }

    #[test]
    fn test_service_descriptor_bad_length() {
        let data = [0x01, 0x09, b'A'];
        assert!(ServiceDescriptor::parse(&data).is_err());
    }

    #[test]
    fn test_descriptor_loop() {
        let data = [
            0x48, 0x02, 0xAA, 0xBB,
            0x40, 0x03, 0xCC, 0xDD, 0xEE,
            0x09, 0x10, 0x00, // truncated
        ];

        let all: Vec<_> = descriptors(&data).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], (0x48, &[0xAA, 0xBB][..]));
        assert_eq!(find_descriptor(&data, 0x40), Some(&[0xCC, 0xDD, 0xEE][..]));
        assert!(find_descriptor(&data, 0x09).is_none());
        assert!(has_descriptor(&data, 0x48));
    }

    #[test]
    fn test_cable_delivery() {
        // 346.0000 MHz, 64-QAM, 6.8750 Msym/s
        let data = [
            0x03, 0x46, 0x00, 0x00, 0xFF, 0xF2, 0x03, 0x00, 0x68, 0x75, 0x05,
        ];
        let desc = CableDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.frequency, 346_000_000);
        assert_eq!(desc.modulation, 0x03);
        assert_eq!(desc.symbol_rate, 6_875_000);
    }

    #[test]
    fn test_terrestrial_delivery() {
        // 474 MHz in 10 Hz units = 47_400_000 = 0x02D3_4440
        let data = [0x02, 0xD3, 0x44, 0x40, 0x1F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let desc = TerrestrialDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.centre_frequency, 474_000_000);
        assert_eq!(desc.bandwidth, 0);
    }

    #[test]
    fn test_isdb_terrestrial_delivery() {
        // 3335 / 7 MHz = 476.428571 MHz
        let data = [0x00, 0x00, 0x0D, 0x07];
        let desc = IsdbTerrestrialDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.frequencies, vec![476_428_571]);
    }

    #[test]
    fn test_satellite_delivery() {
        // 11.72748 GHz, 19.2E, vertical, 27.5 Msym/s
        let data = [
            0x01, 0x17, 0x27, 0x48, 0x01, 0x92, 0xA1, 0x02, 0x75, 0x00, 0x03,
        ];
        let desc = SatelliteDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.frequency, 11_727_480);
        assert_eq!(desc.orbital_position, 192);
        assert!(desc.west_east_flag);
        assert_eq!(desc.polarization, 1);
        assert_eq!(desc.symbol_rate, 27_500_000);
    }

    #[test]
    fn test_logical_channels() {
        let data = [0x00, 0x65, 0xFC, 0x01, 0x00, 0x66, 0x7C, 0x02];
        let entries = parse_logical_channels(&data);
        assert_eq!(
            entries,
            vec![
                LcnEntry { service_id: 0x65, visible: true, lcn: 1 },
                LcnEntry { service_id: 0x66, visible: false, lcn: 2 },
            ]
        );
    }

    #[test]
    fn test_subtitling_and_teletext() {
        let sub = [b'e', b'n', b'g', 0x10, 0x00, 0x01, 0x00, 0x02];
        let entries = parse_subtitling(&sub);
        assert_eq!(entries[0].language, "eng");
        assert_eq!(entries[0].composition_page_id, 1);
        assert_eq!(entries[0].ancillary_page_id, 2);

        let ttx = [b'd', b'e', b'u', 0x09, 0x00];
        let entries = parse_teletext(&ttx);
        assert_eq!(entries[0].language, "deu");
        assert_eq!(entries[0].teletext_type, 1);
        assert_eq!(entries[0].magazine_number, 1);
    }

    #[test]
    fn test_service_location() {
        let data = [
            0xE0, 0x31, 0x02,
            0x02, 0xE0, 0x31, 0x00, 0x00, 0x00,
            0x81, 0xE0, 0x34, b'e', b'n', b'g',
        ];
        let desc = ServiceLocationDescriptor::parse(&data).unwrap();
        assert_eq!(desc.pcr_pid, 0x31);
        assert_eq!(desc.elements.len(), 2);
        assert_eq!(desc.elements[1].elementary_pid, 0x34);
        assert_eq!(desc.elements[1].language, "eng");
    }

    #[test]
    fn test_decode_dvb_string() {
        assert_eq!(decode_dvb_string(b"BBC ONE"), "BBC ONE");
        // emphasis control codes are dropped
        assert_eq!(decode_dvb_string(&[0x86, b'A', 0x87]), "A");
        // ISO 8859-5 Cyrillic
        assert_eq!(decode_dvb_string(&[0x01, 0xBF, 0xD5, 0xE0]), "Пер");
        // UTF-8 selector
        assert_eq!(decode_dvb_string(&[0x15, 0xC3, 0xA9]), "é");
        // UTF-16BE
        assert_eq!(decode_dvb_string(&[0x11, 0x00, 0x41, 0x00, 0x42]), "AB");
        assert_eq!(decode_dvb_string(&[]), "");
    }

    #[test]
    fn test_bcd_to_u32() {
        assert_eq!(bcd_to_u32(&[0x12, 0x34]), 1234);
        assert_eq!(bcd_to_u32(&[0x99, 0x99]), 9999);
    }
}
