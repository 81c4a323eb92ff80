//! Motion models. Each mover computes a displacement per element from the
//! pre-step positions; the model sums the contributions of all movers.

use anyhow::Result;
use chrono::NaiveDateTime;
use spill_common::Vec3;

use crate::spill_container::SpillContainer;

mod random;
mod simple;
mod wind;

pub use random::RandomMover;
pub use simple::SimpleMover;
pub use wind::{WindMover, WindSeries};

/// Hooks a motion model exposes to the model, called in this order during a run:
/// `prepare_for_model_run` once, then per step `prepare_for_model_step` for every
/// population, `get_move` for every non-empty population, and `model_step_is_done`.
pub trait Mover: Send {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    fn prepare_for_model_run(&mut self) -> Result<()> {
        Ok(())
    }

    fn prepare_for_model_step(&mut self, _sc: &SpillContainer, _time_step: f64, _model_time: NaiveDateTime) -> Result<()> {
        Ok(())
    }

    /// Displacement (degrees lon/lat, meters depth) for every element of `sc`.
    /// Must not depend on anything but its inputs and the state set up by the prepare hooks.
    fn get_move(&self, sc: &SpillContainer, time_step: f64, model_time: NaiveDateTime) -> Result<Vec<Vec3>>;

    fn model_step_is_done(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Seed for per-element random draws, stable for a given (seed, element, time).
#[inline(always)]
pub(crate) fn element_seed(seed: u64, element_id: u32, model_time: NaiveDateTime, uncertain: bool) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(element_id as u64)
        .wrapping_add((model_time.and_utc().timestamp() as u64).wrapping_mul(0x0000_0100_0000_01B3))
        .wrapping_add((uncertain as u64) << 40)
}
