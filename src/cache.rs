use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::trace;
use spill_common::StepSnapshot;

use crate::error::CacheError;
use crate::spill_container::SpillContainerPair;

/// Per-step snapshots of every population, kept so output can be produced
/// after the fact. Disabling it never changes simulation results.
#[derive(Debug, Default)]
pub struct ElementCache {
    enabled: bool,
    steps: BTreeMap<u32, StepSnapshot>,
}

impl ElementCache {
    pub fn new(enabled: bool) -> Self {
        ElementCache {
            enabled,
            steps: BTreeMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Stored snapshots survive a toggle but cannot be loaded while disabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn rewind(&mut self) {
        self.steps.clear();
    }

    /// Stores a copy of every active population under `step`. No-op when disabled.
    pub fn save_timestep(&mut self, step: u32, model_time: NaiveDateTime, spills: &SpillContainerPair) {
        if !self.enabled {
            return;
        }
        let snapshot = StepSnapshot {
            step,
            model_time,
            populations: spills.snapshots(),
        };
        trace!("Caching {} elements for step {}.", snapshot.total_element_count(), step);
        self.steps.insert(step, snapshot);
    }

    /// Fails with `NotAvailable` when the cache is disabled or `step` was never stored.
    pub fn load_timestep(&self, step: u32) -> Result<&StepSnapshot, CacheError> {
        if !self.enabled {
            return Err(CacheError::NotAvailable { step });
        }
        self.steps.get(&step).ok_or(CacheError::NotAvailable { step })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Cached step indices in order.
    pub fn steps(&self) -> impl Iterator<Item = u32> + '_ {
        self.steps.keys().copied()
    }

    /// Cached snapshots in step order.
    pub fn iter(&self) -> impl Iterator<Item = &StepSnapshot> {
        self.steps.values()
    }
}
