//! Sensor-tag temperature decoding
//!
//! Sensor tags store two factory calibration points in user memory words
//! 8h..Bh: word 8h holds a CRC over the following three words, which pack
//! `code1`, `temp1`, `code2` and `temp2`. The live temperature code lives in
//! reserved memory word Eh. Temperatures in the calibration block are stored
//! as `celsius * 10 + 800`.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::bits::{pack_bits, sensor_crc16, write_bits};
use crate::transport::ReaderTransport;
use crate::types::{AddressedRead, DecodeError, MemoryBank, ScanError, TagRead};

/// Size of the stored CRC in front of the calibration words
const CRC_SIZE: usize = 2;
/// Size of the three packed calibration words
const CALIBRATION_SIZE: usize = 6;
/// Calibration words together with their CRC
const CALIBRATION_WITH_CRC_SIZE: usize = CRC_SIZE + CALIBRATION_SIZE;
const TEMPERATURE_CODE_SIZE: usize = 2;
/// The temperature code occupies the low 12 bits of its word
const TEMPERATURE_CODE_MASK: u16 = 0x0FFF;

const TEMPERATURE_SHIFT: f64 = 800.0;
const TEMPERATURE_DIVIDER: f64 = 10.0;

/// Reserved bank word holding the live temperature code
pub const TEMPERATURE_CODE_WORD: u32 = 0x0E;
/// User bank word where the CRC + calibration block starts
pub const CALIBRATION_WORD: u32 = 0x08;
/// CRC word plus three calibration words
pub const CALIBRATION_WORD_COUNT: u8 = 4;

// Bit layout of the 48-bit calibration field, offsets from the MSB
const CODE1_FIELD: (usize, usize) = (0, 12);
const TEMP1_FIELD: (usize, usize) = (12, 11);
const CODE2_FIELD: (usize, usize) = (23, 12);
const TEMP2_FIELD: (usize, usize) = (35, 11);

/// Two factory calibration points of a sensor tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationData {
    /// Temperature code measured at the first calibration point
    pub code1: u16,
    /// First calibration temperature, `celsius * 10 + 800`
    pub temp1: u16,
    /// Temperature code measured at the second calibration point
    pub code2: u16,
    /// Second calibration temperature, `celsius * 10 + 800`
    pub temp2: u16,
}

impl CalibrationData {
    /// Unpack the three calibration words (without CRC).
    pub fn from_bytes(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() != CALIBRATION_SIZE {
            return Err(DecodeError::BadLength {
                expected: CALIBRATION_SIZE,
                actual: raw.len(),
            });
        }

        let field = |(offset, length): (usize, usize)| {
            // Width and offset are fixed and always inside the 48-bit buffer
            pack_bits(raw, offset, length).unwrap_or_default() as u16
        };

        Ok(Self {
            code1: field(CODE1_FIELD),
            temp1: field(TEMP1_FIELD),
            code2: field(CODE2_FIELD),
            temp2: field(TEMP2_FIELD),
        })
    }

    /// Pack into the three calibration words, reserved bits cleared.
    pub fn to_bytes(&self) -> [u8; CALIBRATION_SIZE] {
        let mut raw = [0u8; CALIBRATION_SIZE];
        for ((offset, length), value) in [
            (CODE1_FIELD, self.code1),
            (TEMP1_FIELD, self.temp1),
            (CODE2_FIELD, self.code2),
            (TEMP2_FIELD, self.temp2),
        ] {
            write_bits(&mut raw, offset, length, u64::from(value));
        }
        raw
    }

    /// Pack and prefix with the CRC word, as stored on the tag.
    pub fn to_bytes_with_crc(&self) -> [u8; CALIBRATION_WITH_CRC_SIZE] {
        let calibration = self.to_bytes();
        let crc = calibration_crc(&calibration);

        let mut raw = [0u8; CALIBRATION_WITH_CRC_SIZE];
        raw[..CRC_SIZE].copy_from_slice(&crc.to_be_bytes());
        raw[CRC_SIZE..].copy_from_slice(&calibration);
        raw
    }
}

/// A calibrated temperature for one sensor tag in one reading cycle
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemperatureReading {
    pub epc: String,
    pub celsius: f64,
    pub temperature_code: u16,
    pub cycle: u64,
    pub shelf: u8,
    pub antenna: u8,
}

/// CRC of the calibration words as the tag computes it
fn calibration_crc(calibration: &[u8]) -> u16 {
    let mut reversed = calibration.to_vec();
    reversed.reverse();
    sensor_crc16(&reversed)
}

/// Decode the live temperature code word.
///
/// Only the low 12 bits carry the code; the upper bits are masked, not rejected.
pub fn decode_temperature_code(raw: &[u8]) -> Result<u16, DecodeError> {
    match raw {
        [msb, lsb] => Ok(u16::from_be_bytes([*msb, *lsb]) & TEMPERATURE_CODE_MASK),
        _ => Err(DecodeError::BadLength {
            expected: TEMPERATURE_CODE_SIZE,
            actual: raw.len(),
        }),
    }
}

/// Linear interpolation between the two calibration points.
///
/// Codes outside the calibrated range are extrapolated without clamping.
pub fn compute_celsius(temperature_code: u16, calibration: &CalibrationData) -> f64 {
    let temp_span = f64::from(i32::from(calibration.temp2) - i32::from(calibration.temp1));
    let code_offset = f64::from(i32::from(temperature_code) - i32::from(calibration.code1));
    let code_span = f64::from(i32::from(calibration.code2) - i32::from(calibration.code1));

    (temp_span * code_offset / code_span + f64::from(calibration.temp1) - TEMPERATURE_SHIFT)
        / TEMPERATURE_DIVIDER
}

/// Turns raw sensor memory into Celsius, caching calibration per EPC.
///
/// Calibration is fixed by the manufacturer, so once a block passes its CRC
/// it is kept for the lifetime of the decoder and never read again.
#[derive(Debug, Default)]
pub struct TemperatureDecoder {
    calibrations: HashMap<String, CalibrationData>,
}

impl TemperatureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached calibration for `epc`, if a valid block was decoded before
    pub fn calibration(&self, epc: &str) -> Option<&CalibrationData> {
        self.calibrations.get(epc)
    }

    /// Number of EPCs with cached calibration
    pub fn cached_count(&self) -> usize {
        self.calibrations.len()
    }

    /// Validate and decode a CRC word + calibration block, caching it on success.
    ///
    /// Nothing is cached on a length or CRC failure, so the block is read
    /// again the next time the tag is resolved.
    pub fn decode_calibration(
        &mut self,
        epc: &str,
        raw_with_crc: &[u8],
    ) -> Result<CalibrationData, DecodeError> {
        trace!("Calibration raw data with CRC for {}: {:02X?}", epc, raw_with_crc);

        if raw_with_crc.len() != CALIBRATION_WITH_CRC_SIZE {
            return Err(DecodeError::BadLength {
                expected: CALIBRATION_WITH_CRC_SIZE,
                actual: raw_with_crc.len(),
            });
        }

        let (crc_bytes, calibration_bytes) = raw_with_crc.split_at(CRC_SIZE);
        let stored = u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]);
        let computed = calibration_crc(calibration_bytes);

        if stored != computed {
            warn!(
                "CRC check failed for {}. Stored: 0x{:04X}, computed: 0x{:04X}",
                epc, stored, computed
            );
            return Err(DecodeError::CrcMismatch { stored, computed });
        }

        let calibration = CalibrationData::from_bytes(calibration_bytes)?;
        debug!(
            "Calibration data for {}: code1={}, temp1={}, code2={}, temp2={}",
            epc, calibration.code1, calibration.temp1, calibration.code2, calibration.temp2
        );
        self.calibrations.insert(epc.to_string(), calibration);
        Ok(calibration)
    }

    /// Read and decode the temperature of one sensor tag.
    ///
    /// Issues one addressed read for the temperature code and, only when no
    /// calibration is cached for the EPC, a second one for the calibration block.
    pub fn resolve<R: ReaderTransport>(
        &mut self,
        reader: &mut R,
        tag: &TagRead,
        cycle: u64,
    ) -> Result<TemperatureReading, ScanError> {
        let code_op = AddressedRead {
            bank: MemoryBank::Reserved,
            word_address: TEMPERATURE_CODE_WORD,
            word_count: 1,
            epc_filter: tag.epc.clone(),
            antenna: tag.antenna,
        };
        let raw_code = reader
            .execute_addressed_op(&code_op)
            .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;
        let temperature_code = decode_temperature_code(&raw_code)?;
        debug!("Temperature code for {} is {}", tag.epc, temperature_code);

        let calibration = match self.calibrations.get(&tag.epc) {
            Some(calibration) => *calibration,
            None => {
                debug!("Read calibration data for epc {}", tag.epc);
                let calibration_op = AddressedRead {
                    bank: MemoryBank::User,
                    word_address: CALIBRATION_WORD,
                    word_count: CALIBRATION_WORD_COUNT,
                    ..code_op
                };
                let raw = reader
                    .execute_addressed_op(&calibration_op)
                    .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;
                self.decode_calibration(&tag.epc, &raw)?
            }
        };

        let celsius = compute_celsius(temperature_code, &calibration);
        if !celsius.is_finite() {
            return Err(ScanError::InvalidResponse(format!(
                "Degenerate calibration for {}: code1 == code2 == {}",
                tag.epc, calibration.code1
            )));
        }

        Ok(TemperatureReading {
            epc: tag.epc.clone(),
            celsius,
            temperature_code,
            cycle,
            shelf: tag.shelf,
            antenna: tag.antenna,
        })
    }
}
