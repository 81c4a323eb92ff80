use anyhow::Result;
use chrono::NaiveDateTime;
use rand::prelude::*;
use rand_distr::Uniform;
use rayon::prelude::*;
use spill_common::{meters_to_lonlat, Vec3};

use super::{element_seed, Mover};
use crate::spill_container::SpillContainer;

/// Horizontal random walk standing in for turbulent diffusion.
#[derive(Debug, Clone)]
pub struct RandomMover {
    name: String,
    /// cm^2/s
    pub diffusion_coef: f64,
    /// Multiplies the diffusion coefficient for the uncertain population.
    pub uncertain_factor: f64,
    seed: u64,
}

impl RandomMover {
    pub fn new(diffusion_coef: f64) -> Self {
        RandomMover {
            name: "random".to_string(),
            diffusion_coef,
            uncertain_factor: 2.0,
            seed: 0,
        }
    }

    pub fn with_uncertain_factor(mut self, factor: f64) -> Self {
        self.uncertain_factor = factor;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Largest per-axis step, in meters, over `time_step` seconds.
    pub fn max_step_meters(&self, time_step: f64, uncertain: bool) -> f64 {
        let coef = if uncertain { self.diffusion_coef * self.uncertain_factor } else { self.diffusion_coef };
        // cm^2/s -> m^2/s
        (6.0 * coef / 10_000.0 * time_step).sqrt()
    }
}

impl Default for RandomMover {
    fn default() -> Self {
        RandomMover::new(100_000.0)
    }
}

impl Mover for RandomMover {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_move(&self, sc: &SpillContainer, time_step: f64, model_time: NaiveDateTime) -> Result<Vec<Vec3>> {
        let amplitude = self.max_step_meters(time_step, sc.uncertain());
        let unit = Uniform::new_inclusive(-1.0f64, 1.0f64)?;
        let uncertain = sc.uncertain();

        let delta = sc
            .positions
            .par_iter()
            .zip(sc.status_codes.par_iter())
            .zip(sc.element_id.par_iter())
            .map(|((pos, status), &id)| {
                if !status.is_mobile() {
                    return Vec3::zero();
                }
                let mut rng = StdRng::seed_from_u64(element_seed(self.seed, id, model_time, uncertain));
                let east = rng.sample(unit) * amplitude;
                let north = rng.sample(unit) * amplitude;
                meters_to_lonlat(east, north, pos.y)
            })
            .collect();
        Ok(delta)
    }
}
