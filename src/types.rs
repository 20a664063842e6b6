//! Types shared by the scan loop, the decoders and the reader adapters

use thiserror::Error;

use crate::config::ConfigError;

/// A single tag observation produced by a timed read.
///
/// Records are recycled through [`RecordPool`](crate::RecordPool), so the
/// `epc` and `data` buffers keep their capacity between reads.
#[derive(Debug, Clone, Default)]
pub struct TagRead {
    pub epc: String,
    /// 1-based antenna index within the active read plan
    pub antenna: u8,
    /// Multiplexer position active when the tag was read
    pub shelf: u8,
    pub rssi: i32,
    pub frequency: u32,
    pub phase: i32,
    pub read_count: u32,
    /// Raw bytes returned by an embedded memory operation, if any
    pub data: Vec<u8>,
    /// Milliseconds since the UNIX epoch
    pub timestamp: u64,
}

impl TagRead {
    /// Clear every field while keeping the allocated buffers.
    pub(crate) fn reset(&mut self) {
        self.epc.clear();
        self.antenna = 0;
        self.shelf = 0;
        self.rssi = 0;
        self.frequency = 0;
        self.phase = 0;
        self.read_count = 0;
        self.data.clear();
        self.timestamp = 0;
    }
}

/// Classification of a tag by its EPC prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagClass {
    Normal,
    /// Tag carrying an on-chip temperature sensor
    Sensor,
}

/// Consolidated view of one EPC, rebuilt (never mutated) whenever a better read arrives.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InventoryEntry {
    pub epc: String,
    /// Transmit power in centi-dBm at the time of the read, `None` if the
    /// reader never accepted a power setting
    pub power: Option<i32>,
    /// Antenna index reported by the reader chip
    pub chip_antenna: u8,
    /// Physical antenna after applying the shelf multiplexer
    pub real_antenna: u32,
    pub created: u64,
    pub cycle: u64,
    pub rssi: i32,
    pub frequency: u32,
    pub phase: i32,
    pub read_count: u32,
    pub plan: usize,
    pub shelf: u8,
    pub class: TagClass,
}

impl InventoryEntry {
    /// Build an entry from a raw read and the sweep context it was taken in.
    pub fn from_read(
        read: &TagRead,
        real_antenna: u32,
        cycle: u64,
        power: Option<i32>,
        plan: usize,
        class: TagClass,
    ) -> Self {
        Self {
            epc: read.epc.clone(),
            power,
            chip_antenna: read.antenna,
            real_antenna,
            created: read.timestamp,
            cycle,
            rssi: read.rssi,
            frequency: read.frequency,
            phase: read.phase,
            read_count: read.read_count,
            plan,
            shelf: read.shelf,
            class,
        }
    }

    pub fn is_sensor(&self) -> bool {
        self.class == TagClass::Sensor
    }
}

/// Tag memory banks addressable by a Gen2 read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemoryBank {
    Reserved = 0x00,
    Epc = 0x01,
    Tid = 0x02,
    User = 0x03,
}

/// An addressed memory read on the tag matching `epc_filter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressedRead {
    pub bank: MemoryBank,
    pub word_address: u32,
    pub word_count: u8,
    /// EPC (hex) used as the Select filter
    pub epc_filter: String,
    /// Chip antenna the tag was last seen on
    pub antenna: u8,
}

/// Failure to decode raw sensor memory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },
    #[error("CRC mismatch: stored 0x{stored:04X}, computed 0x{computed:04X}")]
    CrcMismatch { stored: u16, computed: u16 },
}

/// A read rejected before consolidation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("EPC {epc:?} has length {length}, expected {expected}")]
    InvalidEpcLength {
        epc: String,
        length: usize,
        expected: usize,
    },
}

/// Errors that can occur while scanning
#[derive(Debug, Error)]
pub enum ScanError {
    /// Transport layer error (reader, serial link, etc.)
    #[error("transport error: {0}")]
    Transport(String),
    /// Invalid parameter passed to a function
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Invalid response received from the reader
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convert bytes to uppercase hex string
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Convert a hex string (either case) to bytes
pub(crate) fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, ScanError> {
    if hex.len() % 2 != 0 {
        return Err(ScanError::InvalidParameter(format!(
            "Hex string has odd length: {}",
            hex.len()
        )));
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ScanError::InvalidParameter(format!("Invalid hex string: {}", hex)))
        })
        .collect()
}
