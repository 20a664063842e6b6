//! Consolidation of raw reads into one entry per EPC

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::types::{InventoryEntry, ValidationError};

/// Immutable inventory published at the end of a reading cycle
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    entries: HashMap<String, InventoryEntry>,
    cycle: u64,
}

impl Inventory {
    pub fn get(&self, epc: &str) -> Option<&InventoryEntry> {
        self.entries.get(epc)
    }

    pub fn contains(&self, epc: &str) -> bool {
        self.entries.contains_key(epc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.values()
    }

    /// Reading cycle that produced this snapshot, 0 before the first sweep
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// What [`InventoryConsolidator::ingest`] did with a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Inserted,
    Replaced,
    /// The stored entry is newer or at least as strong
    Kept,
}

/// Working copy of the inventory for one sweep.
///
/// A candidate replaces the stored entry for its EPC when there is none, when
/// it comes from a later cycle, or when its RSSI is strictly higher. The last
/// clause holds across cycles too, so a strong old read survives a weaker one
/// only within the same cycle.
#[derive(Debug, Clone)]
pub struct InventoryConsolidator {
    entries: HashMap<String, InventoryEntry>,
    epc_length: usize,
}

impl InventoryConsolidator {
    pub fn new(epc_length: usize) -> Self {
        Self {
            entries: HashMap::new(),
            epc_length,
        }
    }

    /// Start a sweep from a copy of the published inventory.
    pub fn from_snapshot(snapshot: &Inventory, epc_length: usize) -> Self {
        Self {
            entries: snapshot.entries.clone(),
            epc_length,
        }
    }

    /// Offer a read for `epc`; `build_entry` only runs if the read wins.
    pub fn ingest<F>(
        &mut self,
        epc: &str,
        rssi: i32,
        cycle: u64,
        build_entry: F,
    ) -> Result<Ingest, ValidationError>
    where
        F: FnOnce() -> InventoryEntry,
    {
        if epc.len() != self.epc_length {
            return Err(ValidationError::InvalidEpcLength {
                epc: epc.to_string(),
                length: epc.len(),
                expected: self.epc_length,
            });
        }

        match self.entries.entry(epc.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(build_entry());
                Ok(Ingest::Inserted)
            }
            Entry::Occupied(mut slot) => {
                let stored = slot.get();
                if cycle > stored.cycle || rssi > stored.rssi {
                    slot.insert(build_entry());
                    Ok(Ingest::Replaced)
                } else {
                    Ok(Ingest::Kept)
                }
            }
        }
    }

    pub fn get(&self, epc: &str) -> Option<&InventoryEntry> {
        self.entries.get(epc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the working copy into a snapshot for `cycle`.
    pub fn into_inventory(self, cycle: u64) -> Inventory {
        Inventory {
            entries: self.entries,
            cycle,
        }
    }
}
