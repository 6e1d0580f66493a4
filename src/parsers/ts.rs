//! TS packet header parsing

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::constants::{PES_START_CODE, TS_HEADER_SIZE, TS_PACKET_SIZE, TS_SYNC_BYTE};

/// Fields of the 4-byte TS header the demultiplexer acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    pub transport_error: bool,
    pub pid: u16,
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
    /// Offset of the payload inside the packet, `None` when there is none
    pub payload_offset: Option<usize>,
}

impl TsHeader {
    /// Parses a 188-byte packet. Returns `None` on a bad sync byte or a
    /// short packet.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < TS_PACKET_SIZE || packet[0] != TS_SYNC_BYTE {
            return None;
        }

        let mut br = BitReader::endian(&packet[1..TS_HEADER_SIZE], BigEndian);
        let transport_error = br.read_bit().ok()?;
        br.skip(2).ok()?; // payload_unit_start, transport_priority
        let pid = br.read::<13, u16>().ok()?;
        br.skip(2).ok()?; // scrambling control
        let adaptation_field_control = br.read::<2, u8>().ok()?;
        let continuity_counter = br.read::<4, u8>().ok()?;

        let payload_offset = match adaptation_field_control {
            1 => Some(TS_HEADER_SIZE),
            3 => Some(TS_HEADER_SIZE + 1 + packet[TS_HEADER_SIZE] as usize)
                .filter(|&offset| offset < TS_PACKET_SIZE),
            _ => None, // adaptation only or reserved
        };

        Some(Self {
            transport_error,
            pid,
            adaptation_field_control,
            continuity_counter,
            payload_offset,
        })
    }

    pub fn has_payload(&self) -> bool {
        self.payload_offset.is_some()
    }

    /// Payload bytes of `packet` (which must be the parsed packet)
    pub fn payload<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        self.payload_offset
            .and_then(|offset| packet.get(offset..TS_PACKET_SIZE))
            .unwrap_or_default()
    }
}

/// True when the payload opens with a PES start code
pub fn is_pes_start(payload: &[u8]) -> bool {
    payload.starts_with(&PES_START_CODE)
}

/// Next continuity counter value after `cc`
pub fn next_continuity(cc: u8) -> u8 {
    cc.wrapping_add(1) & 0x0F
}
