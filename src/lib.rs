//! Multi-shelf UHF RFID inventory scanner.
//!
//! A single reader sweeps every shelf behind an antenna multiplexer, keeps the
//! strongest recent read of each EPC, and decodes the temperature of sensor
//! tags from their calibration memory.
//!
//! # Features
//!
//! - `serial` - Serial port link for desktop hosts using the serialport crate
//! - `serde` - Serialize configuration, inventory entries and temperature readings
//!
//! # Example
//!
//! ```ignore
//! use shelf_scan::{FrameReader, GpiosetMultiplexer, ScanConfig, Scanner, SerialLink, SwitchLine};
//!
//! let link = SerialLink::open("/dev/ttyUSB0", 115200)?;
//! let reader = FrameReader::new(link);
//! let mux = GpiosetMultiplexer::new(
//!     SwitchLine { chip: 0, line: 17 },
//!     SwitchLine { chip: 1, line: 5 },
//! );
//!
//! let handle = Scanner::spawn(reader, mux, ScanConfig::single_port())?;
//! for entry in handle.inventory().load().iter() {
//!     println!("{} on shelf {} ({} dBm)", entry.epc, entry.shelf, entry.rssi);
//! }
//! handle.stop().ok();
//! ```

mod bits;
mod cache;
mod config;
mod frame;
mod inventory;
mod link;
mod mux;
mod pool;
mod scanner;
mod scheduler;
mod snapshot;
mod temperature;
mod transport;
mod types;

#[cfg(feature = "serial")]
mod serial;

// Re-exports
pub use bits::{pack_bits, sensor_crc16, write_bits};
pub use cache::CycleScopedCache;
pub use config::{
    ConfigError, DutyCycle, EPC_LENGTH, Gen2Settings, MAX_SHELVES, QAlgorithm, RfidBand,
    SENSOR_PREFIX_LENGTH, ScanConfig, SensorPrefixes,
};
pub use frame::FrameReader;
pub use inventory::{Ingest, Inventory, InventoryConsolidator};
pub use link::ByteLink;
pub use mux::{GpiosetMultiplexer, Multiplexer, SwitchLine, switch_states};
pub use pool::RecordPool;
pub use scanner::{Scanner, ScannerHandle, connect_with_retry};
pub use scheduler::{CycleReport, ScanPhase, ScanScheduler, SensorReadings, StopToken};
pub use snapshot::Published;
pub use temperature::{
    CALIBRATION_WORD, CALIBRATION_WORD_COUNT, CalibrationData, TEMPERATURE_CODE_WORD,
    TemperatureDecoder, TemperatureReading, compute_celsius, decode_temperature_code,
};
pub use transport::{ParamKey, ParamValue, ReaderTransport};
pub use types::{
    AddressedRead, DecodeError, InventoryEntry, MemoryBank, ScanError, TagClass, TagRead,
    ValidationError,
};

#[cfg(feature = "serial")]
pub use serial::SerialLink;
