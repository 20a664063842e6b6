//! Reader adapter for serial UHF modules speaking the `BB .. 7E` frame protocol
//!
//! These modules expose one antenna port, so every read plan must select
//! antenna 1; shelves are switched by the external multiplexer.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, trace, warn};

use crate::config::QAlgorithm;
use crate::link::ByteLink;
use crate::pool::RecordPool;
use crate::transport::{ParamKey, ParamValue, ReaderTransport};
use crate::types::{AddressedRead, MemoryBank, ScanError, TagRead, bytes_to_hex, hex_to_bytes};

/// Gen2 Query parameters of the module, sent as one 16-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueryParams {
    dr: bool,
    /// Miller subcarrier: 0 = FM0, 1 = M2, 2 = M4, 3 = M8
    encoding: u8,
    trext: bool,
    sel: u8,
    session: u8,
    target: u8,
    q: u8,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            dr: false,
            encoding: 0,
            trext: true,
            sel: 0,
            session: 0,
            target: 0,
            q: 4,
        }
    }
}

impl QueryParams {
    fn to_bytes(self) -> [u8; 2] {
        let word = (u16::from(self.dr) << 15)
            | (u16::from(self.encoding & 0x03) << 13)
            | (u16::from(self.trext) << 12)
            | (u16::from(self.sel & 0x03) << 10)
            | (u16::from(self.session & 0x03) << 8)
            | (u16::from(self.target & 0x01) << 7)
            | (u16::from(self.q & 0x0F) << 3);
        word.to_be_bytes()
    }
}

/// A tag frame received while polling
#[derive(Debug, Clone, PartialEq)]
struct PolledTag {
    epc: String,
    rssi: i32,
}

/// Result of scanning the receive buffer for the next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameScan {
    /// More bytes are needed
    Incomplete,
    /// Noise in front of the next header
    Skip(usize),
    /// Bad length, checksum or terminator at the front
    Corrupt,
    /// A complete frame of this many bytes
    Frame(usize),
}

/// Reader adapter for the single-port serial modules.
///
/// Only plans over antenna 1 and powers of 18-26 dBm are accepted; drive it
/// with [`ScanConfig::single_port`](crate::ScanConfig::single_port).
pub struct FrameReader<L: ByteLink> {
    link: L,
    connected: bool,
    plans: Vec<Vec<u8>>,
    active_plan: Option<usize>,
    query: QueryParams,
    select_mode_set: bool,
    response_timeout_ms: u32,
    record_highest_rssi: bool,
}

impl<L: ByteLink> FrameReader<L> {
    // Protocol constants
    const HEADER: u8 = 0xBB;
    const END: u8 = 0x7E;
    const CMD_TYPE: u8 = 0x00;
    const RESP_TYPE_NOTIFICATION: u8 = 0x01;
    const RESP_TYPE_TAG: u8 = 0x02;
    const RESP_ERROR: u8 = 0xFF;
    const ERROR_NO_TAG: u8 = 0x15;

    // Command codes
    const GET_FIRMWARE: u8 = 0x03;
    const MULTIPLE_POLL: u8 = 0x27;
    const STOP_MULTIPLE_POLL: u8 = 0x28;
    const SET_SELECT_PARAM: u8 = 0x0C;
    const SET_SELECT_MODE: u8 = 0x12;
    const GET_TX_POWER: u8 = 0xB7;
    const SET_TX_POWER: u8 = 0xB6;
    const SET_REGION: u8 = 0x07;
    const GET_REGION: u8 = 0x08;
    const SET_QUERY_PARAM: u8 = 0x0E;
    const READ_TAG_DATA: u8 = 0x39;

    // Firmware info selectors
    const INFO_HARDWARE: u8 = 0x00;
    const INFO_SOFTWARE: u8 = 0x01;
    const INFO_MANUFACTURER: u8 = 0x02;

    /// Transmit power limits in centi-dBm
    const MIN_POWER: i64 = 1800;
    const MAX_POWER: i64 = 2600;

    /// Select mode: send Select only before memory operations, not while polling
    const SELECT_NON_POLLING: u8 = 0x02;
    /// Bit pointer of the EPC behind StoredCRC and PC
    const EPC_BIT_POINTER: u32 = 0x20;

    /// Longest parameter block accepted while polling
    const MAX_FRAME_PARAMS: usize = 255;

    const RESPONSE_DELAY: Duration = Duration::from_millis(200);

    /// Create a new reader adapter over the given link
    pub fn new(link: L) -> Self {
        Self {
            link,
            connected: false,
            plans: Vec::new(),
            active_plan: None,
            query: QueryParams::default(),
            select_mode_set: false,
            response_timeout_ms: 500,
            record_highest_rssi: true,
        }
    }

    /// Firmware information string (hardware, software or manufacturer)
    fn firmware_info(&mut self, selector: u8) -> Result<String, ScanError> {
        self.exec(&Self::create_command(Self::GET_FIRMWARE, &[selector]))
            .and_then(|response| Self::parse_firmware_version(&response))
    }

    /// Get current transmit power in centi-dBm
    fn get_tx_power(&mut self) -> Result<i64, ScanError> {
        let response = self.exec(&Self::create_command(Self::GET_TX_POWER, &[]))?;

        if response.len() >= 8
            && response[0] == Self::HEADER
            && response[1] == Self::RESP_TYPE_NOTIFICATION
            && response[2] == Self::GET_TX_POWER
            && response[3] == 0x00
            && response[4] == 0x02
        {
            Ok(i64::from(u16::from_be_bytes([response[5], response[6]])))
        } else {
            Err(ScanError::InvalidResponse("Failed to get transmit power".into()))
        }
    }

    /// Set transmit power in centi-dBm (1800-2600)
    fn set_tx_power(&mut self, power: i64) -> Result<(), ScanError> {
        if !(Self::MIN_POWER..=Self::MAX_POWER).contains(&power) {
            return Err(ScanError::InvalidParameter(format!(
                "Transmit power {} outside {}..={} centi-dBm",
                power,
                Self::MIN_POWER,
                Self::MAX_POWER
            )));
        }

        let bytes = (power as u16).to_be_bytes();
        let response = self.exec(&Self::create_command(Self::SET_TX_POWER, &bytes))?;
        Self::expect_ok(&response, Self::SET_TX_POWER, "set transmit power")
    }

    fn get_region(&mut self) -> Result<String, ScanError> {
        let response = self.exec(&Self::create_command(Self::GET_REGION, &[]))?;

        if response.len() >= 8
            && response[0] == Self::HEADER
            && response[1] == Self::RESP_TYPE_NOTIFICATION
            && response[2] == Self::GET_REGION
            && response[3] == 0x00
            && response[4] == 0x01
        {
            Self::region_name(response[5]).map(String::from).ok_or_else(|| {
                ScanError::InvalidResponse(format!("Unknown region code: 0x{:02X}", response[5]))
            })
        } else {
            Err(ScanError::InvalidResponse("Failed to get region".into()))
        }
    }

    fn set_region(&mut self, code: &str) -> Result<(), ScanError> {
        let region = Self::region_byte(code)
            .ok_or_else(|| ScanError::InvalidParameter(format!("Unknown region: {}", code)))?;
        let response = self.exec(&Self::create_command(Self::SET_REGION, &[region]))?;
        Self::expect_ok(&response, Self::SET_REGION, "set region")
    }

    fn region_byte(code: &str) -> Option<u8> {
        match code {
            "PRC" | "CN" => Some(0x01),
            "NA" | "US" => Some(0x02),
            "EU" | "EU3" => Some(0x03),
            "PRC2" => Some(0x04),
            "KR" => Some(0x06),
            _ => None,
        }
    }

    fn region_name(code: u8) -> Option<&'static str> {
        match code {
            0x01 => Some("PRC"),
            0x02 => Some("NA"),
            0x03 => Some("EU3"),
            0x04 => Some("PRC2"),
            0x06 => Some("KR"),
            _ => None,
        }
    }

    fn set_query_param(&mut self, query: QueryParams) -> Result<(), ScanError> {
        let response = self.exec(&Self::create_command(Self::SET_QUERY_PARAM, &query.to_bytes()))?;
        Self::expect_ok(&response, Self::SET_QUERY_PARAM, "set query parameters")?;
        self.query = query;
        Ok(())
    }

    /// Update one field of the Query word and push it to the module
    fn update_query(&mut self, key: ParamKey, value: &ParamValue) -> Result<(), ScanError> {
        let mut query = self.query;

        match (key, value) {
            (ParamKey::Gen2Session, ParamValue::Text(session)) => {
                query.session = match session.as_str() {
                    "S0" => 0,
                    "S1" => 1,
                    "S2" => 2,
                    "S3" => 3,
                    _ => return Err(Self::bad_value(key, value)),
                };
            }
            (ParamKey::Gen2Target, ParamValue::Text(target)) => {
                query.target = match target.as_str() {
                    "A" => 0,
                    "B" => 1,
                    _ => return Err(Self::bad_value(key, value)),
                };
            }
            (ParamKey::Gen2TagEncoding, ParamValue::Text(encoding)) => {
                query.encoding = match encoding.as_str() {
                    "FM0" => 0,
                    "M2" => 1,
                    "M4" => 2,
                    "M8" => 3,
                    _ => return Err(Self::bad_value(key, value)),
                };
            }
            // The module adapts Q on its own; only a static start value is sent
            (ParamKey::Gen2Q, ParamValue::Q(QAlgorithm::Dynamic)) => {}
            (ParamKey::Gen2Q, ParamValue::Q(QAlgorithm::Static(q))) => query.q = *q,
            _ => return Err(Self::bad_value(key, value)),
        }

        if query == self.query {
            return Ok(());
        }
        self.set_query_param(query)
    }

    fn bad_value(key: ParamKey, value: &ParamValue) -> ScanError {
        ScanError::InvalidParameter(format!("Unsupported value for {:?}: {:?}", key, value))
    }

    /// Restrict memory operations to the tag with this EPC
    fn select_epc(&mut self, epc: &str) -> Result<(), ScanError> {
        let mask = hex_to_bytes(epc)?;
        if mask.is_empty() || mask.len() > 31 {
            return Err(ScanError::InvalidParameter(format!(
                "EPC mask must be 1-31 bytes, got {}",
                mask.len()
            )));
        }

        // SelParam: Target S0 (3 bits) | Action 0 (3 bits) | MemBank EPC (2 bits)
        let sel_param = MemoryBank::Epc as u8;

        let mut params = Vec::with_capacity(7 + mask.len());
        params.push(sel_param);
        params.extend_from_slice(&Self::EPC_BIT_POINTER.to_be_bytes());
        params.push((mask.len() * 8) as u8);
        params.push(0x00); // no truncation
        params.extend_from_slice(&mask);

        let response = self.exec(&Self::create_command(Self::SET_SELECT_PARAM, &params))?;
        Self::expect_ok(&response, Self::SET_SELECT_PARAM, "set select parameters")?;

        if !self.select_mode_set {
            let response = self.exec(&Self::create_command(
                Self::SET_SELECT_MODE,
                &[Self::SELECT_NON_POLLING],
            ))?;

            // Response uses command 0x0C (SET_SELECT_PARAM)
            if response.len() >= 7
                && response[0] == Self::HEADER
                && response[1] == Self::RESP_TYPE_NOTIFICATION
                && response[5] == 0x00
            {
                self.select_mode_set = true;
            } else {
                return Err(ScanError::InvalidResponse("Failed to set select mode".into()));
            }
        }

        Ok(())
    }

    /// Read words from the memory bank of the selected tag
    ///
    /// # Returns
    /// The raw bytes read from the tag memory, without the PC + EPC prefix
    fn read_tag_data(
        &mut self,
        mem_bank: MemoryBank,
        word_ptr: u16,
        word_count: u16,
    ) -> Result<Vec<u8>, ScanError> {
        if word_count == 0 {
            return Err(ScanError::InvalidParameter(
                "Word count must be at least 1".into(),
            ));
        }

        let mut params = Vec::with_capacity(9);
        params.extend_from_slice(&[0x00; 4]); // access password
        params.push(mem_bank as u8);
        params.extend_from_slice(&word_ptr.to_be_bytes());
        params.extend_from_slice(&word_count.to_be_bytes());

        let response = self.exec(&Self::create_command(Self::READ_TAG_DATA, &params))?;

        // Success: BB 01 39 LL LL UL [PC + EPC] [data...] checksum 7E
        // Error:   BB 01 FF 00 01 EE checksum 7E
        if response.len() < 8 || response[0] != Self::HEADER {
            return Err(ScanError::InvalidResponse("Invalid read response".into()));
        }

        if response[2] == Self::RESP_ERROR {
            return Err(ScanError::InvalidResponse(format!(
                "Read failed with error code: 0x{:02X}",
                response[5]
            )));
        }
        if response[2] != Self::READ_TAG_DATA {
            return Err(ScanError::InvalidResponse("Unexpected response type".into()));
        }

        let payload_len = usize::from(u16::from_be_bytes([response[3], response[4]]));
        let pc_epc_len = usize::from(response[5]);
        let data_start = 6 + pc_epc_len;
        let data_end = 5 + payload_len;

        if data_end < data_start || response.len() < data_end + 2 {
            return Err(ScanError::InvalidResponse("Response too short for data".into()));
        }
        Ok(response[data_start..data_end].to_vec())
    }

    /// Poll continuously for `timeout`, calling `on_tag` for every tag frame
    ///
    /// This starts continuous polling (0xFFFF rounds), restarts it whenever
    /// the module reports the end of a round, and stops polling afterwards.
    fn poll_for_duration<F>(&mut self, timeout: Duration, mut on_tag: F) -> Result<usize, ScanError>
    where
        F: FnMut(PolledTag),
    {
        let poll_command = Self::create_command(Self::MULTIPLE_POLL, &[0x22, 0xFF, 0xFF]);
        self.link
            .clear_input()
            .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;
        self.link
            .write(&poll_command)
            .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;

        let mut tag_count = 0;
        let start = Instant::now();
        let mut buffer = Vec::new();

        while start.elapsed() < timeout {
            let mut temp_buf = [0u8; 256];

            match self.link.read(&mut temp_buf, 50) {
                Ok(bytes_read) if bytes_read > 0 => {
                    buffer.extend_from_slice(&temp_buf[..bytes_read]);

                    loop {
                        let frame_len = match Self::next_frame(&buffer) {
                            FrameScan::Incomplete => break,
                            FrameScan::Skip(count) => {
                                trace!("Discarding {} bytes before frame header", count);
                                buffer.drain(..count);
                                continue;
                            }
                            FrameScan::Corrupt => {
                                warn!("Dropping corrupt frame: {:02X?}", buffer);
                                buffer.drain(..1);
                                continue;
                            }
                            FrameScan::Frame(len) => len,
                        };
                        let frame: Vec<u8> = buffer.drain(..frame_len).collect();

                        if Self::is_end_of_round(&frame) {
                            if start.elapsed() < timeout {
                                let _ = self.link.write(&poll_command);
                            }
                            continue;
                        }

                        match Self::parse_tag(&frame) {
                            Ok(Some(tag)) => {
                                on_tag(tag);
                                tag_count += 1;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!("Failed to parse frame: {:?}", e);
                            }
                        }
                    }
                }
                Ok(_) | Err(_) => {
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        // Stop polling
        let _ = self.link.write(&Self::create_command(Self::STOP_MULTIPLE_POLL, &[]));

        // Drain any remaining responses
        std::thread::sleep(Duration::from_millis(100));
        let mut drain_buf = [0u8; 256];
        while self.link.read(&mut drain_buf, 50).unwrap_or(0) > 0 {}

        Ok(tag_count)
    }

    /// Locate the frame at the front of `buffer` from its length field.
    ///
    /// Payload bytes may equal `HEADER` or `END`, so boundaries are never
    /// searched for; a frame is `HEADER type cmd len(2) params checksum END`.
    fn next_frame(buffer: &[u8]) -> FrameScan {
        match buffer.iter().position(|&b| b == Self::HEADER) {
            None if buffer.is_empty() => return FrameScan::Incomplete,
            None => return FrameScan::Skip(buffer.len()),
            Some(0) => {}
            Some(offset) => return FrameScan::Skip(offset),
        }

        if buffer.len() < 5 {
            return FrameScan::Incomplete;
        }

        let param_len = usize::from(u16::from_be_bytes([buffer[3], buffer[4]]));
        if param_len > Self::MAX_FRAME_PARAMS {
            return FrameScan::Corrupt;
        }

        let frame_len = param_len + 7;
        if buffer.len() < frame_len {
            return FrameScan::Incomplete;
        }

        let checksum = buffer[1..frame_len - 2]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        if buffer[frame_len - 2] != checksum || buffer[frame_len - 1] != Self::END {
            return FrameScan::Corrupt;
        }

        FrameScan::Frame(frame_len)
    }

    fn is_end_of_round(frame: &[u8]) -> bool {
        frame.len() >= 8
            && frame[1] == Self::RESP_TYPE_NOTIFICATION
            && frame[2] == Self::RESP_ERROR
            && frame[5] == Self::ERROR_NO_TAG
    }

    fn active_antenna(&self) -> u8 {
        self.active_plan
            .and_then(|index| self.plans.get(index))
            .and_then(|antennas| antennas.first().copied())
            .unwrap_or(1)
    }

    fn expect_ok(response: &[u8], command: u8, what: &str) -> Result<(), ScanError> {
        if response.len() >= 7
            && response[0] == Self::HEADER
            && response[1] == Self::RESP_TYPE_NOTIFICATION
            && response[2] == command
            && response[5] == 0x00
        {
            Ok(())
        } else if response.len() >= 6 && response[2] == Self::RESP_ERROR {
            Err(ScanError::InvalidResponse(format!(
                "Failed to {}: error code 0x{:02X}",
                what, response[5]
            )))
        } else {
            Err(ScanError::InvalidResponse(format!("Failed to {}", what)))
        }
    }

    fn parse_tag(response: &[u8]) -> Result<Option<PolledTag>, ScanError> {
        if response.len() < 12 {
            return Ok(None);
        }

        if response[0] == Self::HEADER && response[1] == Self::RESP_TYPE_TAG {
            let data_length = response[4] as usize;
            // RSSI is reported in dBm as a signed byte
            let rssi = i32::from(response[5] as i8);

            let epc_start = 8;
            let epc_end = epc_start + data_length.saturating_sub(5);

            if epc_end > response.len() {
                return Err(ScanError::InvalidResponse(format!(
                    "Invalid tag response: length {} exceeds the {} bytes received",
                    data_length,
                    response.len()
                )));
            }

            Ok(Some(PolledTag {
                epc: bytes_to_hex(&response[epc_start..epc_end]),
                rssi,
            }))
        } else if response[0] == Self::HEADER {
            Ok(None)
        } else {
            Err(ScanError::InvalidResponse(format!(
                "Invalid response header: {:02X?}",
                response
            )))
        }
    }

    fn parse_firmware_version(response: &[u8]) -> Result<String, ScanError> {
        if response.len() > 7
            && response[0] == Self::HEADER
            && response[1] == Self::RESP_TYPE_NOTIFICATION
            && response[2] == Self::GET_FIRMWARE
        {
            let version_bytes = &response[6..response.len() - 2];
            Ok(String::from_utf8_lossy(version_bytes).trim_end_matches('\0').to_string())
        } else {
            Err(ScanError::InvalidResponse("Invalid firmware response".into()))
        }
    }

    fn exec(&mut self, cmd: &[u8]) -> Result<Vec<u8>, ScanError> {
        self.link
            .clear_input()
            .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;
        debug!("Sending command: {:02X?}", cmd);
        let written = self
            .link
            .write(cmd)
            .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;
        trace!("Wrote {} bytes", written);
        std::thread::sleep(Self::RESPONSE_DELAY);

        let mut response = vec![0u8; 256];
        match self.link.read(&mut response, self.response_timeout_ms) {
            Ok(bytes_read) => {
                response.truncate(bytes_read);
                debug!("Received {} bytes: {:02X?}", bytes_read, response);
                Ok(response)
            }
            Err(e) => {
                error!("Read error: {:?}", e);
                Err(ScanError::Transport(format!("{:?}", e)))
            }
        }
    }

    pub(crate) fn create_command(command: u8, params: &[u8]) -> Vec<u8> {
        let param_len = params.len() as u16;
        let msb = (param_len >> 8) as u8;
        let lsb = (param_len & 0xFF) as u8;

        let checksum = [Self::CMD_TYPE, command, msb, lsb]
            .iter()
            .chain(params.iter())
            .fold(0u8, |acc, &b| acc.wrapping_add(b));

        let mut cmd = vec![Self::HEADER, Self::CMD_TYPE, command, msb, lsb];
        cmd.extend_from_slice(params);
        cmd.push(checksum);
        cmd.push(Self::END);
        cmd
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

impl<L: ByteLink> ReaderTransport for FrameReader<L> {
    type Error = ScanError;

    fn connect(&mut self) -> Result<(), ScanError> {
        match self.firmware_info(Self::INFO_SOFTWARE) {
            Ok(version) => {
                info!("Connected to module, firmware {}", version);
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                self.connected = false;
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_parameter(&mut self, key: ParamKey, value: ParamValue) -> Result<(), ScanError> {
        match (key, &value) {
            (ParamKey::Region, ParamValue::Text(code)) => self.set_region(code),
            (ParamKey::ReadPower, ParamValue::Int(power)) => self.set_tx_power(*power),
            (ParamKey::CommandTimeout, ParamValue::Int(ms)) => {
                self.response_timeout_ms =
                    u32::try_from(*ms).map_err(|_| Self::bad_value(key, &value))?;
                Ok(())
            }
            (ParamKey::RecordHighestRssi, ParamValue::Bool(enabled)) => {
                self.record_highest_rssi = *enabled;
                Ok(())
            }
            // Single port and per-read dedup make these no-ops
            (ParamKey::UniqueByAntenna, ParamValue::Bool(_))
            | (ParamKey::ReadFiltering, ParamValue::Bool(true))
            | (ParamKey::TransportTimeout, ParamValue::Int(_)) => Ok(()),
            (
                ParamKey::Gen2Session
                | ParamKey::Gen2Target
                | ParamKey::Gen2TagEncoding
                | ParamKey::Gen2Q,
                _,
            ) => self.update_query(key, &value),
            _ => Err(Self::bad_value(key, &value)),
        }
    }

    fn get_parameter(&mut self, key: ParamKey) -> Result<ParamValue, ScanError> {
        match key {
            ParamKey::Region => self.get_region().map(ParamValue::Text),
            ParamKey::ReadPower => self.get_tx_power().map(ParamValue::Int),
            ParamKey::VersionHardware => {
                self.firmware_info(Self::INFO_HARDWARE).map(ParamValue::Text)
            }
            ParamKey::VersionSoftware => {
                self.firmware_info(Self::INFO_SOFTWARE).map(ParamValue::Text)
            }
            ParamKey::VersionModel => {
                self.firmware_info(Self::INFO_MANUFACTURER).map(ParamValue::Text)
            }
            ParamKey::CommandTimeout => Ok(ParamValue::Int(i64::from(self.response_timeout_ms))),
            ParamKey::RecordHighestRssi => Ok(ParamValue::Bool(self.record_highest_rssi)),
            ParamKey::Gen2Q => Ok(ParamValue::Q(QAlgorithm::Static(self.query.q))),
            _ => Err(ScanError::InvalidParameter(format!("Unsupported parameter {:?}", key))),
        }
    }

    fn create_read_plan(&mut self, antennas: &[u8]) -> Result<usize, ScanError> {
        if antennas != [1] {
            return Err(ScanError::InvalidParameter(format!(
                "Module has a single antenna port, cannot plan antennas {:?}",
                antennas
            )));
        }
        self.plans.push(antennas.to_vec());
        Ok(self.plans.len() - 1)
    }

    fn set_active_read_plan(&mut self, index: usize) -> Result<(), ScanError> {
        if index >= self.plans.len() {
            return Err(ScanError::InvalidParameter(format!(
                "No read plan {} ({} defined)",
                index,
                self.plans.len()
            )));
        }
        self.active_plan = Some(index);
        Ok(())
    }

    fn read(
        &mut self,
        duration: Duration,
        pool: &mut RecordPool,
        out: &mut Vec<TagRead>,
    ) -> Result<(), ScanError> {
        let antenna = self.active_antenna();
        let keep_highest = self.record_highest_rssi;
        let first = out.len();

        self.poll_for_duration(duration, |tag| {
            if let Some(existing) = out[first..].iter_mut().find(|read| read.epc == tag.epc) {
                existing.read_count += 1;
                if keep_highest && tag.rssi > existing.rssi {
                    existing.rssi = tag.rssi;
                    existing.timestamp = now_millis();
                }
                return;
            }

            let mut read = pool.acquire();
            read.epc.push_str(&tag.epc);
            read.antenna = antenna;
            read.rssi = tag.rssi;
            read.read_count = 1;
            read.timestamp = now_millis();
            out.push(read);
        })?;

        Ok(())
    }

    fn execute_addressed_op(&mut self, op: &AddressedRead) -> Result<Vec<u8>, ScanError> {
        let word_ptr = u16::try_from(op.word_address).map_err(|_| {
            ScanError::InvalidParameter(format!(
                "Word address 0x{:X} out of range",
                op.word_address
            ))
        })?;

        self.select_epc(&op.epc_filter)?;
        self.read_tag_data(op.bank, word_ptr, u16::from(op.word_count))
    }
}
