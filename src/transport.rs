use std::time::Duration;

use crate::config::QAlgorithm;
use crate::pool::RecordPool;
use crate::types::{AddressedRead, TagRead};

/// Reader parameters the scanner reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Region,
    LicenseKey,
    /// Read power in centi-dBm
    ReadPower,
    /// Command timeout in milliseconds
    CommandTimeout,
    /// Transport timeout in milliseconds
    TransportTimeout,
    UniqueByAntenna,
    RecordHighestRssi,
    ReadFiltering,
    Gen2Tari,
    Gen2LinkFrequency,
    Gen2TagEncoding,
    Gen2Q,
    Gen2Session,
    Gen2Target,
    VersionHardware,
    VersionSerial,
    VersionModel,
    VersionSoftware,
}

/// Value stored under a [`ParamKey`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Q(QAlgorithm),
}

/// Trait for RFID reader backends driven by the scanner.
/// Implement this trait for each vendor reader or protocol.
pub trait ReaderTransport {
    /// Error type for reader operations
    type Error: std::fmt::Debug;

    /// Open the connection to the reader
    fn connect(&mut self) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;

    fn set_parameter(&mut self, key: ParamKey, value: ParamValue) -> Result<(), Self::Error>;

    fn get_parameter(&mut self, key: ParamKey) -> Result<ParamValue, Self::Error>;

    /// Register a read plan over the given 1-based antennas and return its index
    fn create_read_plan(&mut self, antennas: &[u8]) -> Result<usize, Self::Error>;

    fn set_active_read_plan(&mut self, index: usize) -> Result<(), Self::Error>;

    /// Run a timed inventory on the active plan.
    ///
    /// Records must be taken from `pool` and appended to `out`.
    fn read(
        &mut self,
        duration: Duration,
        pool: &mut RecordPool,
        out: &mut Vec<TagRead>,
    ) -> Result<(), Self::Error>;

    /// Read tag memory on the single tag selected by `op.epc_filter`
    fn execute_addressed_op(&mut self, op: &AddressedRead) -> Result<Vec<u8>, Self::Error>;
}
