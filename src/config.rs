//! Scanner configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::types::TagClass;

/// Number of shelves the antenna multiplexer can select
pub const MAX_SHELVES: u8 = 4;
/// Length of a 96-bit EPC in hex digits
pub const EPC_LENGTH: usize = 24;
/// Length of a sensor-tag EPC prefix in hex digits
pub const SENSOR_PREFIX_LENGTH: usize = 8;

/// Rejected configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("shelf count must be 1..={max}, got {0}", max = MAX_SHELVES)]
    ShelfCount(u8),
    #[error("antenna counts must be non-zero with real >= chip, got chip={chip} real={real}")]
    AntennaCount { chip: u8, real: u32 },
    #[error("read duration must be non-zero")]
    ReadDuration,
    #[error("EPC length must be non-zero")]
    EpcLength,
    #[error("sensor prefix {0:?} is not {len} hex digits", len = SENSOR_PREFIX_LENGTH)]
    SensorPrefix(String),
    #[error("read power {power} exceeds maximum {max}")]
    ReadPower { power: i32, max: i32 },
    #[error("invalid Q algorithm {0:?}, expected \"dynamic\" or \"static:<N>\"")]
    QAlgorithm(String),
}

/// Regulatory band the reader operates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RfidBand {
    /// North America, 902-928 MHz
    #[default]
    Us902,
    /// Europe, 865-868 MHz
    Eu865,
}

impl RfidBand {
    /// Region code understood by the reader
    pub fn region_code(&self) -> &'static str {
        match self {
            RfidBand::Us902 => "NA",
            RfidBand::Eu865 => "EU3",
        }
    }
}

/// Gen2 Q algorithm, written as `"dynamic"` or `"static:<N>"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QAlgorithm {
    #[default]
    Dynamic,
    Static(u8),
}

impl FromStr for QAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "dynamic" {
            return Ok(QAlgorithm::Dynamic);
        }

        s.strip_prefix("static:")
            .and_then(|initial| initial.parse::<u8>().ok())
            .filter(|q| *q <= 15)
            .map(QAlgorithm::Static)
            .ok_or_else(|| ConfigError::QAlgorithm(s.to_string()))
    }
}

impl fmt::Display for QAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QAlgorithm::Dynamic => write!(f, "dynamic"),
            QAlgorithm::Static(q) => write!(f, "static:{}", q),
        }
    }
}

/// Load profile of the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DutyCycle {
    Full,
    /// Longer gap between antennas, roughly half the RF load
    #[default]
    Half,
}

impl DutyCycle {
    /// Gap between two plan reads when sleeping after reads is enabled
    pub fn antenna_gap(&self) -> Duration {
        match self {
            DutyCycle::Full => Duration::from_millis(60),
            DutyCycle::Half => Duration::from_millis(500),
        }
    }
}

/// Gen2 air-interface preferences, passed to the reader as-is
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Gen2Settings {
    pub tari: String,
    pub link_frequency: String,
    pub tag_encoding: String,
    pub q: QAlgorithm,
    pub session: String,
    pub target: String,
}

impl Default for Gen2Settings {
    fn default() -> Self {
        Self {
            tari: "TARI_25US".into(),
            link_frequency: "LINK250KHZ".into(),
            tag_encoding: "M4".into(),
            q: QAlgorithm::Dynamic,
            session: "S0".into(),
            target: "A".into(),
        }
    }
}

/// Closed set of EPC prefixes that mark sensor tags
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SensorPrefixes(Vec<String>);

impl SensorPrefixes {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(prefixes.into_iter().map(Into::into).collect())
    }

    pub fn classify(&self, epc: &str) -> TagClass {
        if self.0.iter().any(|prefix| epc.starts_with(prefix.as_str())) {
            TagClass::Sensor
        } else {
            TagClass::Normal
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for SensorPrefixes {
    fn default() -> Self {
        Self::new(["00000000", "00004716", "00004717"])
    }
}

/// Everything the scanner needs at start
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScanConfig {
    /// Hex license key, only sent when present
    pub license_key: Option<String>,
    pub band: RfidBand,
    /// Maximum read power in centi-dBm
    pub max_read_power: i32,
    /// Read power in centi-dBm
    pub read_power: i32,
    pub shelf_count: u8,
    /// Antennas on the reader chip, one read plan each
    pub chip_antenna_count: u8,
    /// Physical antennas behind the multiplexer
    pub real_antenna_count: u32,
    pub read_duration: Duration,
    pub duty_cycle: DutyCycle,
    /// Sleep for the duty-cycle gap after every plan read
    pub sleep_after_read: bool,
    pub epc_length: usize,
    pub sensor_prefixes: SensorPrefixes,
    pub gen2: Gen2Settings,
    pub command_timeout: Duration,
    pub transport_timeout: Duration,
    pub reconnect_interval: Duration,
    /// Idle records kept by the record pool
    pub idle_pool_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            license_key: None,
            band: RfidBand::Us902,
            max_read_power: 3000,
            read_power: 3000,
            shelf_count: MAX_SHELVES,
            chip_antenna_count: 2,
            real_antenna_count: 8,
            read_duration: Duration::from_millis(500),
            duty_cycle: DutyCycle::Half,
            sleep_after_read: false,
            epc_length: EPC_LENGTH,
            sensor_prefixes: SensorPrefixes::default(),
            gen2: Gen2Settings::default(),
            command_timeout: Duration::from_millis(2000),
            transport_timeout: Duration::from_millis(7000),
            reconnect_interval: Duration::from_secs(8),
            idle_pool_capacity: 256,
        }
    }
}

impl ScanConfig {
    /// Defaults for readers with one antenna port and a 26 dBm ceiling,
    /// such as [`FrameReader`](crate::FrameReader): one plan, one antenna per shelf.
    pub fn single_port() -> Self {
        Self {
            max_read_power: 2600,
            read_power: 2600,
            chip_antenna_count: 1,
            real_antenna_count: u32::from(MAX_SHELVES),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shelf_count == 0 || self.shelf_count > MAX_SHELVES {
            return Err(ConfigError::ShelfCount(self.shelf_count));
        }

        if self.chip_antenna_count == 0
            || self.real_antenna_count < u32::from(self.chip_antenna_count)
        {
            return Err(ConfigError::AntennaCount {
                chip: self.chip_antenna_count,
                real: self.real_antenna_count,
            });
        }

        if self.read_duration.is_zero() {
            return Err(ConfigError::ReadDuration);
        }

        if self.epc_length == 0 {
            return Err(ConfigError::EpcLength);
        }

        if let Some(prefix) = self.sensor_prefixes.iter().find(|p| {
            p.len() != SENSOR_PREFIX_LENGTH || !p.chars().all(|c| c.is_ascii_hexdigit())
        }) {
            return Err(ConfigError::SensorPrefix(prefix.to_string()));
        }

        if self.read_power > self.max_read_power {
            return Err(ConfigError::ReadPower {
                power: self.read_power,
                max: self.max_read_power,
            });
        }

        Ok(())
    }

    /// Antennas behind each chip antenna
    pub fn antennas_per_chip_antenna(&self) -> u32 {
        self.real_antenna_count / u32::from(self.chip_antenna_count)
    }

    /// Physical antenna for a chip antenna on the given shelf
    pub fn real_antenna(&self, chip_antenna: u8, shelf: u8) -> u32 {
        u32::from(chip_antenna.saturating_sub(1)) * self.antennas_per_chip_antenna()
            + u32::from(shelf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(ScanConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_single_port_config() {
        let config = ScanConfig::single_port();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.chip_antenna_count, 1);
        assert_eq!(config.real_antenna(1, 3), 3);
        assert_eq!(config.max_read_power, 2600);
    }

    #[test]
    fn test_q_algorithm_parse() {
        assert_eq!("dynamic".parse::<QAlgorithm>(), Ok(QAlgorithm::Dynamic));
        assert_eq!("static:4".parse::<QAlgorithm>(), Ok(QAlgorithm::Static(4)));
        assert!("static:16".parse::<QAlgorithm>().is_err());
        assert!("static".parse::<QAlgorithm>().is_err());
        assert_eq!(QAlgorithm::Static(7).to_string(), "static:7");
    }

    #[test]
    fn test_classify_prefixes() {
        let prefixes = SensorPrefixes::default();
        assert_eq!(prefixes.classify("000000000000000000001263"), TagClass::Sensor);
        assert_eq!(prefixes.classify("000047170000000000001285"), TagClass::Sensor);
        assert_eq!(prefixes.classify("E20068160000006012345678"), TagClass::Normal);
    }

    #[test]
    fn test_real_antenna_mapping() {
        let config = ScanConfig::default();
        assert_eq!(config.real_antenna(1, 1), 1);
        assert_eq!(config.real_antenna(1, 4), 4);
        assert_eq!(config.real_antenna(2, 1), 5);
        assert_eq!(config.real_antenna(2, 4), 8);
    }

    #[test]
    fn test_invalid_configs() {
        let config = ScanConfig {
            shelf_count: 5,
            ..ScanConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ShelfCount(5)));

        let config = ScanConfig {
            sensor_prefixes: SensorPrefixes::new(["0000471"]),
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SensorPrefix(_))));

        let config = ScanConfig {
            read_power: 3100,
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ReadPower { .. })));
    }
}
