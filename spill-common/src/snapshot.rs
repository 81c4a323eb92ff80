use crate::status::ElementStatus;
use crate::vecmath::Vec3;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The element arrays of one population, captured after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Whether this is the uncertainty population.
    pub uncertain: bool,
    pub positions: Vec<Vec3>,
    pub status_codes: Vec<ElementStatus>,
    pub windages: Vec<f64>,
    /// Index of the spill each element was released by.
    pub spill_num: Vec<u16>,
    pub element_id: Vec<u32>,
}

impl ElementSnapshot {
    pub fn num_elements(&self) -> usize {
        self.positions.len()
    }
}

/// All populations at a given step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Index of the step the snapshot was taken at.
    pub step: u32,
    /// Model time of that step.
    pub model_time: NaiveDateTime,
    pub populations: Vec<ElementSnapshot>,
}

impl StepSnapshot {
    pub fn total_element_count(&self) -> usize {
        self.populations.iter().map(|p| p.num_elements()).sum()
    }
}
