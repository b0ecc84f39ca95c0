//! MPEG-TS packet parsing.
//!
//! Only what section reassembly needs: PID, payload unit start,
//! continuity counter and the payload after any adaptation field.

use super::psi::SiError;

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// Parsed TS packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// Transport error indicator. Such packets are skipped.
    pub transport_error: bool,
    /// Payload unit start indicator; a section starts in this packet.
    pub payload_unit_start: bool,
    /// Packet Identifier (13 bits).
    pub pid: u16,
    /// Transport scrambling control (2 bits).
    pub scrambling_control: u8,
    /// Adaptation field control (2 bits).
    pub adaptation_field_control: u8,
    /// Continuity counter (4 bits), checked by section reassembly.
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Check if the packet has an adaptation field.
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0x02 != 0
    }

    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }
}

/// A parsed TS packet.
#[derive(Debug, Clone)]
pub struct TsPacket<'a> {
    pub header: TsHeader,
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Parse a TS packet from at least 188 bytes.
    pub fn parse(data: &'a [u8]) -> Result<Self, SiError> {
        if data.len() < TS_PACKET_SIZE {
            return Err(SiError::TooShort("TS packet"));
        }
        if data[0] != SYNC_BYTE {
            return Err(SiError::Malformed("TS sync byte"));
        }

        let header = TsHeader {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            pid: ((data[1] as u16 & 0x1F) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_control: (data[3] >> 4) & 0x03,
            continuity_counter: data[3] & 0x0F,
        };

        let offset = if header.has_adaptation_field() {
            5 + data[4] as usize
        } else {
            4
        };

        let payload = if header.has_payload() && offset < TS_PACKET_SIZE {
            &data[offset..TS_PACKET_SIZE]
        } else {
            &[]
        };

        Ok(TsPacket { header, payload })
    }
}

/// Iterator over TS packets in a byte stream, resynchronising on garbage.
pub struct TsPacketIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TsPacketIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let offset = data
            .iter()
            .position(|&b| b == SYNC_BYTE)
            .unwrap_or(data.len());
        Self { data, offset }
    }

    fn resync(&mut self) {
        self.offset += 1;
        while self.offset < self.data.len() && self.data[self.offset] != SYNC_BYTE {
            self.offset += 1;
        }
    }
}

impl<'a> Iterator for TsPacketIterator<'a> {
    type Item = TsPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset + TS_PACKET_SIZE <= self.data.len() {
            match TsPacket::parse(&self.data[self.offset..]) {
                Ok(packet) => {
                    self.offset += TS_PACKET_SIZE;
                    return Some(packet);
                }
                Err(_) => self.resync(),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pid: u16, pusi: bool, cc: u8) -> [u8; TS_PACKET_SIZE] {
        let mut p = [0xFFu8; TS_PACKET_SIZE];
        p[0] = SYNC_BYTE;
        p[1] = (if pusi { 0x40 } else { 0 }) | (pid >> 8) as u8;
        p[2] = pid as u8;
        p[3] = 0x10 | cc;
        p
    }

    #[test]
    fn test_parse_header() {
        let p = packet(0x1FFB, true, 7);
        let parsed = TsPacket::parse(&p).unwrap();
        assert_eq!(parsed.header.pid, 0x1FFB);
        assert!(parsed.header.payload_unit_start);
        assert_eq!(parsed.header.continuity_counter, 7);
        assert_eq!(parsed.payload.len(), 184);
    }

    #[test]
    fn test_adaptation_field_skipped() {
        let mut p = packet(0x0011, false, 0);
        p[3] = 0x30;
        p[4] = 10;
        let parsed = TsPacket::parse(&p).unwrap();
        assert_eq!(parsed.payload.len(), 188 - 15);
    }

    #[test]
    fn test_invalid_sync_byte() {
        let mut p = packet(0, false, 0);
        p[0] = 0x00;
        assert!(TsPacket::parse(&p).is_err());
    }

    #[test]
    fn test_iterator_resyncs() {
        let mut stream = vec![0x00, 0x12, 0x34];
        stream.extend_from_slice(&packet(0x0000, true, 0));
        stream.push(0x99);
        stream.extend_from_slice(&packet(0x0010, true, 1));

        let pids: Vec<u16> = TsPacketIterator::new(&stream).map(|p| p.header.pid).collect();
        assert_eq!(pids, vec![0x0000, 0x0010]);
    }
}
