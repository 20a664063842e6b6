//! The shelf × read-plan sweep loop

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error, info, trace, warn};

use crate::cache::CycleScopedCache;
use crate::config::{ConfigError, DutyCycle, ScanConfig};
use crate::inventory::{Ingest, Inventory, InventoryConsolidator};
use crate::mux::Multiplexer;
use crate::pool::RecordPool;
use crate::snapshot::Published;
use crate::temperature::{TemperatureDecoder, TemperatureReading};
use crate::transport::{ParamKey, ParamValue, ReaderTransport};
use crate::types::{InventoryEntry, ScanError, TagClass, TagRead, hex_to_bytes};

/// Cooperative stop request shared with the scan thread.
///
/// The scheduler polls it once per shelf; a cycle interrupted this way is
/// discarded rather than published.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Temperatures resolved during the last completed cycle
#[derive(Debug, Clone, Default)]
pub struct SensorReadings {
    readings: HashMap<String, TemperatureReading>,
    cycle: u64,
}

impl SensorReadings {
    pub fn get(&self, epc: &str) -> Option<&TemperatureReading> {
        self.readings.get(epc)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemperatureReading> {
        self.readings.values()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// Where the scheduler is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Sweeping { shelf: u8, plan: usize },
    CycleComplete { cycle: u64 },
}

/// Summary of one completed reading cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub cycle: u64,
    /// Tag reads returned by the reader over the whole sweep
    pub reads: usize,
    /// Reads discarded before consolidation
    pub rejected: usize,
    /// Entries in the published inventory
    pub inventory_size: usize,
    /// Sensor tags whose temperature was resolved
    pub temperatures: usize,
}

/// Drives the reader over every shelf and read plan, forever.
///
/// Each cycle builds a fresh working copy of the inventory, publishes it in
/// one store when the sweep is done, then resolves the temperature of every
/// sensor tag seen during that sweep. Failures are logged and skipped; no
/// single read, shelf or tag stops the loop.
pub struct ScanScheduler<R: ReaderTransport, M: Multiplexer> {
    reader: R,
    mux: M,
    config: ScanConfig,
    pool: RecordPool,
    cache: CycleScopedCache,
    decoder: TemperatureDecoder,
    inventory: Published<Inventory>,
    temperatures: Published<SensorReadings>,
    reading_cycle: u64,
    read_power: Option<i32>,
    plan_count: usize,
    phase: ScanPhase,
    batch: Vec<TagRead>,
}

impl<R: ReaderTransport, M: Multiplexer> ScanScheduler<R, M> {
    pub fn new(reader: R, mux: M, config: ScanConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            reader,
            mux,
            pool: RecordPool::new(config.idle_pool_capacity),
            cache: CycleScopedCache::new(config.sensor_prefixes.clone()),
            decoder: TemperatureDecoder::new(),
            inventory: Published::default(),
            temperatures: Published::default(),
            reading_cycle: 0,
            read_power: None,
            plan_count: 0,
            phase: ScanPhase::Idle,
            batch: Vec::new(),
            config,
        })
    }

    /// Handle to the consolidated inventory, readable from any thread
    pub fn inventory(&self) -> Published<Inventory> {
        self.inventory.clone()
    }

    /// Handle to the latest temperature readings
    pub fn temperatures(&self) -> Published<SensorReadings> {
        self.temperatures.clone()
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Read power last accepted by the reader
    pub fn read_power(&self) -> Option<i32> {
        self.read_power
    }

    pub fn reading_cycle(&self) -> u64 {
        self.reading_cycle
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn decoder(&self) -> &TemperatureDecoder {
        &self.decoder
    }

    pub fn pool(&self) -> &RecordPool {
        &self.pool
    }

    pub(crate) fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Prepare a freshly connected reader.
    ///
    /// Read plans are required; every other parameter is best effort and
    /// only logged when the reader refuses it.
    pub fn configure(&mut self) -> Result<(), ScanError> {
        self.create_read_plans()?;

        let region = self.config.band.region_code();
        self.apply(ParamKey::Region, ParamValue::Text(region.into()));

        if let Some(key) = self.config.license_key.clone() {
            self.apply(ParamKey::LicenseKey, ParamValue::Bytes(hex_to_bytes(&key)?));
        }

        self.set_duty_cycle(self.config.duty_cycle);
        self.log_reader_info();

        let command_timeout = self.config.command_timeout.as_millis() as i64;
        let transport_timeout = self.config.transport_timeout.as_millis() as i64;
        self.apply(ParamKey::UniqueByAntenna, ParamValue::Bool(false));
        self.apply(ParamKey::RecordHighestRssi, ParamValue::Bool(true));
        self.apply(ParamKey::ReadFiltering, ParamValue::Bool(true));
        self.apply(ParamKey::CommandTimeout, ParamValue::Int(command_timeout));
        self.apply(ParamKey::TransportTimeout, ParamValue::Int(transport_timeout));

        let gen2 = self.config.gen2.clone();
        self.apply(ParamKey::Gen2Tari, ParamValue::Text(gen2.tari));
        self.apply(ParamKey::Gen2LinkFrequency, ParamValue::Text(gen2.link_frequency));
        self.apply(ParamKey::Gen2TagEncoding, ParamValue::Text(gen2.tag_encoding));
        self.apply(ParamKey::Gen2Q, ParamValue::Q(gen2.q));
        self.apply(ParamKey::Gen2Session, ParamValue::Text(gen2.session));
        self.apply(ParamKey::Gen2Target, ParamValue::Text(gen2.target));

        info!(
            "Reader configured: {} shelves, {} plans, {} real antennas",
            self.config.shelf_count, self.plan_count, self.config.real_antenna_count
        );
        Ok(())
    }

    fn create_read_plans(&mut self) -> Result<(), ScanError> {
        self.plan_count = 0;
        for antenna in 1..=self.config.chip_antenna_count {
            let index = self
                .reader
                .create_read_plan(&[antenna])
                .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;
            debug!("Read plan {} uses antenna {}", index, antenna);
            self.plan_count += 1;
        }
        Ok(())
    }

    fn apply(&mut self, key: ParamKey, value: ParamValue) -> bool {
        trace!("Setting {:?} to {:?}", key, value);
        match self.reader.set_parameter(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to set {:?}: {:?}", key, e);
                false
            }
        }
    }

    fn log_reader_info(&mut self) {
        for key in [
            ParamKey::Region,
            ParamKey::VersionHardware,
            ParamKey::VersionSerial,
            ParamKey::VersionModel,
            ParamKey::VersionSoftware,
            ParamKey::CommandTimeout,
            ParamKey::TransportTimeout,
        ] {
            match self.reader.get_parameter(key) {
                Ok(value) => debug!("{:?}: {:?}", key, value),
                Err(e) => debug!("{:?} unavailable: {:?}", key, e),
            }
        }
    }

    /// Change the read power, skipping the reader when it is already set.
    pub fn set_read_power(&mut self, power: i32) {
        if self.read_power == Some(power) {
            return;
        }
        if self.apply(ParamKey::ReadPower, ParamValue::Int(i64::from(power))) {
            self.read_power = Some(power);
            info!("Read power changed to {}", power);
        }
    }

    /// Switch load profile; the half duty cycle also restores maximum power.
    pub fn set_duty_cycle(&mut self, duty_cycle: DutyCycle) {
        self.config.duty_cycle = duty_cycle;
        let power = match duty_cycle {
            DutyCycle::Half => self.config.max_read_power,
            DutyCycle::Full => self.config.read_power,
        };
        self.set_read_power(power);
        debug!(
            "Durations changed: antenna gap={:?}, read duration={:?}",
            duty_cycle.antenna_gap(),
            self.config.read_duration
        );
    }

    /// Loop over reading cycles until `stop` is requested.
    pub fn run(&mut self, stop: &StopToken) {
        info!("Started reading");
        while !stop.is_stopped() {
            self.run_cycle(stop);
        }
        self.phase = ScanPhase::Idle;
        info!("Stopped reading after cycle {}", self.reading_cycle);
    }

    /// Sweep every shelf and plan once, publish the result and resolve temperatures.
    ///
    /// Returns `None` if `stop` was requested before the sweep finished; the
    /// partial sweep is dropped in that case.
    pub fn run_cycle(&mut self, stop: &StopToken) -> Option<CycleReport> {
        let cycle = self.reading_cycle + 1;
        debug!("Starting reading cycle {}", cycle);

        let evicted = self.cache.advance_cycle(cycle);
        self.pool.release_all(evicted);

        let mut working =
            InventoryConsolidator::from_snapshot(&self.inventory.load(), self.config.epc_length);
        let mut report = CycleReport {
            cycle,
            ..CycleReport::default()
        };

        for shelf in 1..=self.config.shelf_count {
            if stop.is_stopped() {
                info!("Stop requested, dropping reading cycle {}", cycle);
                return None;
            }

            if let Err(e) = self.sweep_shelf(shelf, cycle, &mut working, &mut report) {
                error!("Sweep of shelf {} failed: {}", shelf, e);
            }
        }

        self.reading_cycle = cycle;
        report.inventory_size = working.len();
        self.inventory.publish(working.into_inventory(cycle));
        self.phase = ScanPhase::CycleComplete { cycle };

        report.temperatures = self.resolve_temperatures(cycle);
        debug!("Reading cycle {} done: {:?}", cycle, report);
        Some(report)
    }

    fn sweep_shelf(
        &mut self,
        shelf: u8,
        cycle: u64,
        working: &mut InventoryConsolidator,
        report: &mut CycleReport,
    ) -> Result<(), ScanError> {
        self.mux.select_shelf(shelf);

        for plan in 0..self.plan_count {
            self.phase = ScanPhase::Sweeping { shelf, plan };
            self.reader
                .set_active_read_plan(plan)
                .map_err(|e| ScanError::Transport(format!("{:?}", e)))?;

            let mut batch = std::mem::take(&mut self.batch);
            let started = Instant::now();
            match self.reader.read(self.config.read_duration, &mut self.pool, &mut batch) {
                Ok(()) => {
                    debug!(
                        "Done with read - shelf: {}, plan: {}, tags read: {}, read time: {:?}",
                        shelf,
                        plan,
                        batch.len(),
                        started.elapsed()
                    );
                    if let Some(min_rssi) = batch.iter().map(|read| read.rssi).min() {
                        trace!("Min RSSI of the tags read: {}", min_rssi);
                    }
                    report.reads += batch.len();
                    for read in batch.drain(..) {
                        if !self.absorb(read, shelf, plan, cycle, working) {
                            report.rejected += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Read failed on shelf {} plan {}: {:?}", shelf, plan, e);
                    self.pool.release_all(batch.drain(..));
                }
            }
            self.batch = batch;

            if self.config.sleep_after_read {
                std::thread::sleep(self.config.duty_cycle.antenna_gap());
            }
        }

        Ok(())
    }

    /// Consolidate one read; returns `false` if it was rejected.
    fn absorb(
        &mut self,
        mut read: TagRead,
        shelf: u8,
        plan: usize,
        cycle: u64,
        working: &mut InventoryConsolidator,
    ) -> bool {
        read.shelf = shelf;
        let class = self.config.sensor_prefixes.classify(&read.epc);
        let real_antenna = self.config.real_antenna(read.antenna, shelf);
        let power = self.read_power;

        let accepted = match working.ingest(&read.epc, read.rssi, cycle, || {
            InventoryEntry::from_read(&read, real_antenna, cycle, power, plan, class)
        }) {
            Ok(outcome) => {
                if outcome != Ingest::Kept {
                    trace!("{:?} {} rssi={}", outcome, read.epc, read.rssi);
                }
                true
            }
            Err(e) => {
                debug!("EPC ignored: {}", e);
                false
            }
        };

        if class == TagClass::Sensor {
            debug!(
                "Found sensor tag {} [antenna: {} shelf: {} rssi: {}]",
                read.epc, read.antenna, shelf, read.rssi
            );
            if let Some(dropped) = self.cache.observe(read) {
                self.pool.release(dropped);
            }
        } else {
            self.pool.release(read);
        }

        accepted
    }

    /// Resolve every sensor tag cached during `cycle` and publish the readings.
    fn resolve_temperatures(&mut self, cycle: u64) -> usize {
        let targets: Vec<TagRead> = self.cache.sensor_tag_reads().into_iter().cloned().collect();

        if targets.is_empty() {
            trace!("No sensor tags in reading cycle {}", cycle);
            self.temperatures.publish(SensorReadings {
                readings: HashMap::new(),
                cycle,
            });
            return 0;
        }

        let mut readings = HashMap::with_capacity(targets.len());
        for tag in &targets {
            if tag.shelf == 0 || tag.shelf > self.config.shelf_count {
                warn!("Sensor tag {} has no valid shelf ({})", tag.epc, tag.shelf);
                continue;
            }

            debug!(
                "Read tag temperature [epc: {} antenna: {} shelf: {} rssi: {}]",
                tag.epc, tag.antenna, tag.shelf, tag.rssi
            );
            self.mux.select_shelf(tag.shelf);

            match self.decoder.resolve(&mut self.reader, tag, cycle) {
                Ok(reading) => {
                    info!("Temperature of {}: {:.1} C", reading.epc, reading.celsius);
                    readings.insert(reading.epc.clone(), reading);
                }
                Err(e) => warn!("Can't read temperature of {}: {}", tag.epc, e),
            }
        }

        let resolved = readings.len();
        self.temperatures.publish(SensorReadings { readings, cycle });
        resolved
    }
}
