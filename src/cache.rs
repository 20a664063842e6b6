//! Per-cycle cache of sensor-tag reads

use crate::config::SensorPrefixes;
use crate::types::{TagClass, TagRead};

/// Strongest read of each sensor tag seen during the current reading cycle.
///
/// The cache only ever holds one sweep: moving to another cycle number
/// drops everything collected so far.
#[derive(Debug)]
pub struct CycleScopedCache {
    reads: Vec<TagRead>,
    cycle: u64,
    prefixes: SensorPrefixes,
}

impl CycleScopedCache {
    pub fn new(prefixes: SensorPrefixes) -> Self {
        Self {
            reads: Vec::new(),
            cycle: 0,
            prefixes,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// Switch to `cycle`, returning the evicted reads if the number changed.
    pub fn advance_cycle(&mut self, cycle: u64) -> Vec<TagRead> {
        if self.cycle == cycle {
            return Vec::new();
        }
        self.cycle = cycle;
        std::mem::take(&mut self.reads)
    }

    /// Record a read, keeping only the strongest one per EPC.
    ///
    /// Returns the read that was not kept: the newcomer if it is not strictly
    /// stronger, the replaced one otherwise, `None` when it was appended.
    pub fn observe(&mut self, read: TagRead) -> Option<TagRead> {
        match self.reads.iter_mut().find(|cached| cached.epc == read.epc) {
            Some(cached) if read.rssi > cached.rssi => Some(std::mem::replace(cached, read)),
            Some(_) => Some(read),
            None => {
                self.reads.push(read);
                None
            }
        }
    }

    /// Cached reads of sensor tags, in insertion order
    pub fn sensor_tag_reads(&self) -> Vec<&TagRead> {
        self.reads
            .iter()
            .filter(|read| self.prefixes.classify(&read.epc) == TagClass::Sensor)
            .collect()
    }
}
