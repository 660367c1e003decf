//! Raw memory access to the device.
//!
//! Everything the bridge and the device know about each other goes through a
//! [`MemoryBus`]: a byte-addressable 64K address space that can be read and
//! written. [`SharedMemory`] is an in-process implementation used by the
//! simulator and tests; [`ViceMonitor`](crate::vice::ViceMonitor) talks to a
//! running emulator.

use std::sync::{Arc, Mutex};

use crate::error::BusError;

/// Size of the device address space.
pub const ADDRESS_SPACE: usize = 0x1_0000;

/// Byte-level access to the device's memory.
pub trait MemoryBus {
    fn read_bytes(&mut self, address: u16, length: usize) -> Result<Vec<u8>, BusError>;

    fn write_bytes(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError>;

    fn read_byte(&mut self, address: u16) -> Result<u8, BusError> {
        let bytes = self.read_bytes(address, 1)?;
        bytes
            .first()
            .copied()
            .ok_or_else(|| BusError::Malformed(format!("empty read at ${:04X}", address)))
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        self.write_bytes(address, &[value])
    }
}

/// Reject ranges that would wrap past $FFFF.
pub fn check_range(address: u16, length: usize) -> Result<(), BusError> {
    if address as usize + length > ADDRESS_SPACE {
        return Err(BusError::OutOfRange { address, length });
    }
    Ok(())
}

/// A 64K memory image shared between clones.
///
/// Cloning is cheap and every clone sees the same bytes, which is how the
/// simulated device and the in-process bridge talk to each other.
#[derive(Clone)]
pub struct SharedMemory {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0; ADDRESS_SPACE])),
        }
    }

    /// Copy of a region, for inspection in tests and the host console.
    pub fn snapshot(&self, address: u16, length: usize) -> Result<Vec<u8>, BusError> {
        check_range(address, length)?;
        let bytes = self.bytes.lock().map_err(|_| BusError::Poisoned)?;
        let start = address as usize;
        Ok(bytes[start..start + length].to_vec())
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for SharedMemory {
    fn read_bytes(&mut self, address: u16, length: usize) -> Result<Vec<u8>, BusError> {
        self.snapshot(address, length)
    }

    fn write_bytes(&mut self, address: u16, data: &[u8]) -> Result<(), BusError> {
        check_range(address, data.len())?;
        let mut bytes = self.bytes.lock().map_err(|_| BusError::Poisoned)?;
        let start = address as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}
