use anyhow::Result;
use chrono::NaiveDateTime;
use rand::prelude::*;
use spill_common::{meters_to_lonlat, Vec3};

use super::{element_seed, Mover};
use crate::spill_container::SpillContainer;

/// A spatially and temporally constant current.
#[derive(Debug, Clone)]
pub struct SimpleMover {
    name: String,
    /// m/s, (east, north, up)
    pub velocity: Vec3,
    /// Uncertain elements get the velocity scaled by `1 + U(-scale, scale)`.
    pub uncertainty_scale: f64,
}

impl SimpleMover {
    pub fn new(velocity: Vec3) -> Self {
        SimpleMover {
            name: "simple".to_string(),
            velocity,
            uncertainty_scale: 0.0,
        }
    }

    pub fn with_uncertainty_scale(mut self, scale: f64) -> Self {
        self.uncertainty_scale = scale;
        self
    }
}

impl Mover for SimpleMover {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_move(&self, sc: &SpillContainer, time_step: f64, model_time: NaiveDateTime) -> Result<Vec<Vec3>> {
        let perturb = sc.uncertain() && self.uncertainty_scale > 0.0;
        let delta = sc
            .positions
            .iter()
            .zip(&sc.status_codes)
            .zip(&sc.element_id)
            .map(|((pos, status), &id)| {
                if !status.is_mobile() {
                    return Vec3::zero();
                }
                let factor = if perturb {
                    let mut rng = StdRng::seed_from_u64(element_seed(0, id, model_time, true));
                    1.0 + rng.random_range(-self.uncertainty_scale..=self.uncertainty_scale)
                } else {
                    1.0
                };
                let v = self.velocity.scale(factor * time_step);
                let mut d = meters_to_lonlat(v.x, v.y, pos.y);
                d.z = v.z;
                d
            })
            .collect();
        Ok(delta)
    }
}
