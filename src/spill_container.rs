use chrono::NaiveDateTime;
use log::debug;
use rand::prelude::*;
use spill_common::{ElementSnapshot, ElementStatus, Vec3};

use crate::clock::duration_seconds;
use crate::error::{ModelError, ModelResult};

/// A point source that releases its elements at one instant, or linearly over a window.
#[derive(Debug, Clone)]
pub struct PointRelease {
    pub name: String,
    pub num_elements: u32,
    pub start_position: Vec3,
    pub release_time: NaiveDateTime,
    pub end_release_time: Option<NaiveDateTime>,
    /// Fraction of the wind speed an element drifts with, drawn uniformly per element.
    pub windage_range: (f64, f64),
    seed: u64,
    num_released: u32,
    rng: StdRng,
}

impl PointRelease {
    pub fn new(name: impl Into<String>, num_elements: u32, start_position: Vec3, release_time: NaiveDateTime) -> Self {
        PointRelease {
            name: name.into(),
            num_elements,
            start_position,
            release_time,
            end_release_time: None,
            windage_range: (0.01, 0.04),
            seed: 0,
            num_released: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_end_release_time(mut self, end_release_time: NaiveDateTime) -> Self {
        self.end_release_time = Some(end_release_time);
        self
    }

    pub fn with_windage_range(mut self, low: f64, high: f64) -> Self {
        self.windage_range = (low, high);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn num_released(&self) -> u32 {
        self.num_released
    }

    /// Total number of elements that should exist by `model_time`.
    pub fn num_due(&self, model_time: NaiveDateTime) -> u32 {
        if model_time < self.release_time {
            return 0;
        }
        match self.end_release_time {
            Some(end) if model_time < end => {
                let span = duration_seconds(end - self.release_time);
                let elapsed = duration_seconds(model_time - self.release_time);
                ((self.num_elements as f64 * elapsed / span).floor() as u32).min(self.num_elements)
            }
            _ => self.num_elements,
        }
    }

    fn draw_windage(&mut self) -> f64 {
        let (low, high) = self.windage_range;
        if high > low {
            self.rng.random_range(low..high)
        } else {
            low
        }
    }

    fn rewind(&mut self) {
        self.num_released = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

/// One population of elements, stored as parallel arrays.
#[derive(Debug, Clone, Default)]
pub struct SpillContainer {
    uncertain: bool,
    spills: Vec<PointRelease>,

    // Current positions, and the buffer movers accumulate into during a step.
    pub positions: Vec<Vec3>,
    pub next_positions: Vec<Vec3>,
    /// Last position known to be in the water, used when beaching and refloating.
    pub last_water_positions: Vec<Vec3>,
    pub status_codes: Vec<ElementStatus>,
    pub windages: Vec<f64>,
    pub spill_num: Vec<u16>,
    pub element_id: Vec<u32>,
}

impl SpillContainer {
    pub fn new(uncertain: bool) -> Self {
        SpillContainer {
            uncertain,
            ..Default::default()
        }
    }

    pub fn uncertain(&self) -> bool {
        self.uncertain
    }

    pub fn num_elements(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn spills(&self) -> &[PointRelease] {
        &self.spills
    }

    /// Elements record their spill as a `u16`, which bounds how many spills fit.
    pub fn add_spill(&mut self, spill: PointRelease) -> ModelResult<()> {
        if u16::try_from(self.spills.len()).is_err() {
            return Err(ModelError::Configuration(format!(
                "a population holds at most {} spills",
                u16::MAX as usize + 1
            )));
        }
        self.spills.push(spill);
        Ok(())
    }

    /// Drops all elements and release progress.
    pub fn rewind(&mut self) {
        self.positions.clear();
        self.next_positions.clear();
        self.last_water_positions.clear();
        self.status_codes.clear();
        self.windages.clear();
        self.spill_num.clear();
        self.element_id.clear();
        self.spills.iter_mut().for_each(PointRelease::rewind);
    }

    /// Adds the elements each spill has due by `model_time`.
    pub fn release_elements(&mut self, model_time: NaiveDateTime, _time_step: f64) {
        for (idx, spill_num) in (0..self.spills.len()).zip(0u16..=u16::MAX) {
            let due = self.spills[idx].num_due(model_time);
            let num_new = due.saturating_sub(self.spills[idx].num_released);
            if num_new == 0 {
                continue;
            }
            let start = self.spills[idx].start_position;
            let windages: Vec<f64> = (0..num_new).map(|_| self.spills[idx].draw_windage()).collect();
            self.spills[idx].num_released = due;

            self.ensure_capacity(self.num_elements() + num_new as usize);
            for windage in windages {
                self.add_element(start, windage, spill_num);
            }
            debug!(
                "Released {} elements from '{}' at {} ({} in population).",
                num_new,
                self.spills[idx].name,
                model_time,
                self.num_elements()
            );
        }
    }

    /// Copies the element arrays out.
    pub fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot {
            uncertain: self.uncertain,
            positions: self.positions.clone(),
            status_codes: self.status_codes.clone(),
            windages: self.windages.clone(),
            spill_num: self.spill_num.clone(),
            element_id: self.element_id.clone(),
        }
    }

    fn ensure_capacity(&mut self, required: usize) {
        let additional = required.saturating_sub(self.positions.len());
        self.positions.reserve(additional);
        self.next_positions.reserve(additional);
        self.last_water_positions.reserve(additional);
        self.status_codes.reserve(additional);
        self.windages.reserve(additional);
        self.spill_num.reserve(additional);
        self.element_id.reserve(additional);
    }

    fn add_element(&mut self, position: Vec3, windage: f64, spill_num: u16) {
        let id = self.element_id.len() as u32;
        self.positions.push(position);
        self.next_positions.push(position);
        self.last_water_positions.push(position);
        self.status_codes.push(ElementStatus::InWater);
        self.windages.push(windage);
        self.spill_num.push(spill_num);
        self.element_id.push(id);
    }
}

/// The certain population and its uncertainty twin.
#[derive(Debug, Clone)]
pub struct SpillContainerPair {
    certain: SpillContainer,
    uncertain_sc: SpillContainer,
    uncertain: bool,
}

impl SpillContainerPair {
    pub fn new(uncertain: bool) -> Self {
        SpillContainerPair {
            certain: SpillContainer::new(false),
            uncertain_sc: SpillContainer::new(true),
            uncertain,
        }
    }

    pub fn uncertain(&self) -> bool {
        self.uncertain
    }

    /// Returns whether the flag changed.
    pub fn set_uncertain(&mut self, uncertain: bool) -> bool {
        let changed = self.uncertain != uncertain;
        self.uncertain = uncertain;
        changed
    }

    /// Adds the spill to the certain population and a copy to the uncertain one.
    pub fn add_spill(&mut self, spill: PointRelease) -> ModelResult<()> {
        self.uncertain_sc.add_spill(spill.clone())?;
        self.certain.add_spill(spill)
    }

    pub fn certain(&self) -> &SpillContainer {
        &self.certain
    }

    pub fn uncertain_container(&self) -> Option<&SpillContainer> {
        self.uncertain.then_some(&self.uncertain_sc)
    }

    /// Number of active populations.
    pub fn len(&self) -> usize {
        if self.uncertain { 2 } else { 1 }
    }

    pub fn items(&self) -> impl Iterator<Item = &SpillContainer> {
        let n = self.len();
        std::iter::once(&self.certain).chain(std::iter::once(&self.uncertain_sc)).take(n)
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut SpillContainer> {
        let n = self.len();
        std::iter::once(&mut self.certain).chain(std::iter::once(&mut self.uncertain_sc)).take(n)
    }

    /// Rewinds both populations, active or not.
    pub fn rewind(&mut self) {
        self.certain.rewind();
        self.uncertain_sc.rewind();
    }

    pub fn snapshots(&self) -> Vec<ElementSnapshot> {
        self.items().map(SpillContainer::snapshot).collect()
    }
}
