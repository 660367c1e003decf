//! Mailbox region: three one-directional, length-prefixed message slots.
//!
//! Each slot occupies `base..=base+255` (length byte followed by a 255-byte
//! payload) plus a status byte at `base + 256`.

use serde::{Deserialize, Serialize};

use crate::error::{BusError, LayoutError};
use crate::memory::MemoryBus;

/// Maximum payload bytes a slot can hold (range of the length byte).
pub const PAYLOAD_CAPACITY: usize = 255;

/// Offset of the status byte from the slot base.
pub const STATUS_OFFSET: u16 = 256;

/// Maximum bytes per transmitted chunk.
pub const CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// AI answers, host to device.
    Inbound,
    /// User text, device to host.
    Outbound,
    /// Model reasoning, host to device.
    Reasoning,
}

impl Channel {
    pub fn all() -> [Channel; 3] {
        [Channel::Inbound, Channel::Outbound, Channel::Reasoning]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Inbound => "inbound",
            Channel::Outbound => "outbound",
            Channel::Reasoning => "reasoning",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Channel::Inbound => 0,
            Channel::Outbound => 1,
            Channel::Reasoning => 2,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a slot's status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Idle,
    MoreChunks,
    FinalChunk,
}

impl ChunkStatus {
    pub fn code(self) -> u8 {
        match self {
            ChunkStatus::Idle => 0,
            ChunkStatus::MoreChunks => 1,
            ChunkStatus::FinalChunk => 2,
        }
    }

    /// Unknown codes are treated as idle.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ChunkStatus::MoreChunks,
            2 => ChunkStatus::FinalChunk,
            _ => ChunkStatus::Idle,
        }
    }
}

/// Base addresses of the three slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxLayout {
    pub inbound: u16,
    pub outbound: u16,
    pub reasoning: u16,
}

impl Default for MailboxLayout {
    fn default() -> Self {
        Self {
            inbound: 0xC500,
            outbound: 0xC100,
            reasoning: 0xC300,
        }
    }
}

impl MailboxLayout {
    pub fn base(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Inbound => self.inbound,
            Channel::Outbound => self.outbound,
            Channel::Reasoning => self.reasoning,
        }
    }

    pub fn status_address(&self, channel: Channel) -> u16 {
        self.base(channel) + STATUS_OFFSET
    }

    pub fn payload_address(&self, channel: Channel) -> u16 {
        self.base(channel) + 1
    }

    /// Every slot must fit in memory and no two slots may share a byte.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for channel in Channel::all() {
            let base = self.base(channel);
            if base as usize + STATUS_OFFSET as usize > 0xFFFF {
                return Err(LayoutError::OutOfRange {
                    channel: channel.as_str(),
                    base,
                });
            }
        }

        let channels = Channel::all();
        for (i, first) in channels.iter().enumerate() {
            for second in &channels[i + 1..] {
                let a = self.base(*first) as u32;
                let b = self.base(*second) as u32;
                let span = STATUS_OFFSET as u32 + 1;
                if a < b + span && b < a + span {
                    return Err(LayoutError::Overlap {
                        first: first.as_str(),
                        first_base: self.base(*first),
                        second: second.as_str(),
                        second_base: self.base(*second),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Accessors for one channel's slot.
///
/// Holds no state of its own; all reads and writes go straight to the bus.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub channel: Channel,
    base: u16,
}

impl Slot {
    pub fn new(layout: &MailboxLayout, channel: Channel) -> Self {
        Self {
            channel,
            base: layout.base(channel),
        }
    }

    pub fn length<B: MemoryBus>(&self, bus: &mut B) -> Result<u8, BusError> {
        bus.read_byte(self.base)
    }

    pub fn set_length<B: MemoryBus>(&self, bus: &mut B, length: u8) -> Result<(), BusError> {
        bus.write_byte(self.base, length)
    }

    pub fn payload<B: MemoryBus>(&self, bus: &mut B, length: u8) -> Result<Vec<u8>, BusError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        bus.read_bytes(self.base + 1, length as usize)
    }

    pub fn set_payload<B: MemoryBus>(&self, bus: &mut B, payload: &[u8]) -> Result<(), BusError> {
        let payload = &payload[..payload.len().min(PAYLOAD_CAPACITY)];
        bus.write_bytes(self.base + 1, payload)
    }

    pub fn status<B: MemoryBus>(&self, bus: &mut B) -> Result<ChunkStatus, BusError> {
        bus.read_byte(self.base + STATUS_OFFSET)
            .map(ChunkStatus::from_code)
    }

    pub fn set_status<B: MemoryBus>(&self, bus: &mut B, status: ChunkStatus) -> Result<(), BusError> {
        bus.write_byte(self.base + STATUS_OFFSET, status.code())
    }

    /// Return the slot to Idle (length 0, status idle).
    pub fn clear<B: MemoryBus>(&self, bus: &mut B) -> Result<(), BusError> {
        self.set_status(bus, ChunkStatus::Idle)?;
        self.set_length(bus, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SharedMemory;

    #[test]
    fn test_default_layout_is_valid() {
        assert_eq!(MailboxLayout::default().validate(), Ok(()));
    }

    #[test]
    fn test_status_byte_inside_other_slot_is_overlap() {
        // $C000 + 256 is $C100, the first byte of the outbound slot.
        let layout = MailboxLayout {
            inbound: 0xC000,
            outbound: 0xC100,
            reasoning: 0xC300,
        };
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::Overlap {
                first: "inbound",
                second: "outbound",
                ..
            })
        ));
    }

    #[test]
    fn test_slot_near_top_of_memory_is_rejected() {
        let layout = MailboxLayout {
            inbound: 0xFF80,
            ..MailboxLayout::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::OutOfRange { channel: "inbound", .. })
        ));
    }

    #[test]
    fn test_slot_field_addresses() {
        let layout = MailboxLayout::default();
        let mut mem = SharedMemory::new();
        let slot = Slot::new(&layout, Channel::Outbound);

        slot.set_length(&mut mem, 3).unwrap();
        slot.set_payload(&mut mem, b"HEY").unwrap();
        slot.set_status(&mut mem, ChunkStatus::FinalChunk).unwrap();

        assert_eq!(mem.snapshot(0xC100, 4).unwrap(), vec![3, b'H', b'E', b'Y']);
        assert_eq!(mem.snapshot(0xC200, 1).unwrap(), vec![2]);

        slot.clear(&mut mem).unwrap();
        assert_eq!(slot.length(&mut mem).unwrap(), 0);
        assert_eq!(slot.status(&mut mem).unwrap(), ChunkStatus::Idle);
    }
}
