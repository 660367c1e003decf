use thiserror::Error;

/// Errors raised by a [`MemoryBus`](crate::memory::MemoryBus) implementation.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("I/O error while {operation} on {endpoint}: {source}")]
    Io {
        operation: &'static str,
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("address range ${address:04X}+{length} exceeds the 64K address space")]
    OutOfRange { address: u16, length: usize },

    #[error("monitor rejected command {command:#04x} with error code {code:#04x}")]
    Monitor { command: u8, code: u8 },

    #[error("malformed monitor response: {0}")]
    Malformed(String),

    #[error("shared memory lock was poisoned")]
    Poisoned,
}

impl BusError {
    #[must_use]
    pub fn io(operation: &'static str, endpoint: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            endpoint: endpoint.into(),
            source,
        }
    }
}

/// Errors raised when a mailbox layout is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{channel} slot at ${base:04X} does not fit below $FFFF")]
    OutOfRange { channel: &'static str, base: u16 },

    #[error("{first} slot at ${first_base:04X} overlaps {second} slot at ${second_base:04X}")]
    Overlap {
        first: &'static str,
        first_base: u16,
        second: &'static str,
        second_base: u16,
    },
}
