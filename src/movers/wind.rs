use anyhow::Result;
use chrono::NaiveDateTime;
use log::debug;
use rand::prelude::*;
use rand_distr::Uniform;
use rayon::prelude::*;
use spill_common::{meters_to_lonlat, Vec3};
use std::f64::consts::PI;
use std::sync::Arc;

use super::{element_seed, Mover};
use crate::clock::duration_seconds;
use crate::spill_container::SpillContainer;

/// Eddy diffusion used for low-wind uncertainty, cm^2/s.
const EDDY_DIFFUSION: f64 = 1_000_000.0;
/// Redraws allowed when an uncertainty term exceeds the angle limit.
const MAX_REDRAWS: usize = 10;

/// Converts a speed and the direction the wind blows *from* (degrees) into (east, north) components.
pub fn wind_components(speed: f64, direction_from_deg: f64) -> (f64, f64) {
    let theta = direction_from_deg.to_radians();
    (-speed * theta.sin(), -speed * theta.cos())
}

/// Wind velocity over time, linearly interpolated between records and held
/// constant outside them.
#[derive(Debug, Clone)]
pub struct WindSeries {
    records: Vec<(NaiveDateTime, f64, f64)>,
}

impl WindSeries {
    pub fn constant(speed: f64, direction_from_deg: f64) -> Self {
        let (u, v) = wind_components(speed, direction_from_deg);
        WindSeries {
            records: vec![(NaiveDateTime::MIN, u, v)],
        }
    }

    /// Records are (time, speed m/s, direction-from degrees), strictly increasing in time.
    pub fn new(records: &[(NaiveDateTime, f64, f64)]) -> Result<Self> {
        if records.is_empty() {
            anyhow::bail!("wind series needs at least one record");
        }
        if records.windows(2).any(|w| w[1].0 <= w[0].0) {
            anyhow::bail!("wind series times must be strictly increasing");
        }
        let records = records
            .iter()
            .map(|&(time, speed, dir)| {
                let (u, v) = wind_components(speed, dir);
                (time, u, v)
            })
            .collect();
        Ok(WindSeries { records })
    }

    /// (east, north) velocity in m/s at `time`.
    pub fn velocity_at(&self, time: NaiveDateTime) -> (f64, f64) {
        let idx = self.records.partition_point(|r| r.0 <= time);
        if idx == 0 {
            let (_, u, v) = self.records[0];
            return (u, v);
        }
        if idx == self.records.len() {
            let (_, u, v) = self.records[idx - 1];
            return (u, v);
        }
        let (t_a, u_a, v_a) = self.records[idx - 1];
        let (t_b, u_b, v_b) = self.records[idx];
        let frac = duration_seconds(time - t_a) / duration_seconds(t_b - t_a);
        (u_a + (u_b - u_a) * frac, v_a + (v_b - v_a) * frac)
    }
}

/// Per-element speed and angle perturbation terms for the uncertain population.
#[derive(Debug, Clone)]
struct WindUncertainty {
    terms: Vec<(f64, f64)>,
    /// Elapsed run time (s) at which the terms were last drawn.
    time_set: f64,
}

/// Moves elements with a fraction (their windage) of the wind.
#[derive(Debug, Clone)]
pub struct WindMover {
    name: String,
    series: Arc<WindSeries>,
    seed: u64,
    /// Seconds an uncertainty draw persists before it is redrawn.
    pub uncertain_duration: f64,
    pub speed_scale: f64,
    pub angle_scale: f64,
    /// Degrees.
    pub max_angle: f64,

    current_value: (f64, f64),
    is_first_step: bool,
    model_start_time: Option<NaiveDateTime>,
    uncertainty: Option<WindUncertainty>,
    sigma2: f64,
    sigma_theta: f64,
    uncertainty_diffusion: f64,
    rng: StdRng,
}

impl WindMover {
    /// Takes its own series, or an `Arc` shared with the model's winds.
    pub fn new(series: impl Into<Arc<WindSeries>>) -> Self {
        WindMover {
            name: "wind".to_string(),
            series: series.into(),
            seed: 0,
            uncertain_duration: 3.0 * 3600.0,
            speed_scale: 2.0,
            angle_scale: 0.4,
            max_angle: 60.0,
            current_value: (0.0, 0.0),
            is_first_step: false,
            model_start_time: None,
            uncertainty: None,
            sigma2: 0.0,
            sigma_theta: 0.0,
            uncertainty_diffusion: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn series(&self) -> &Arc<WindSeries> {
        &self.series
    }

    /// Wind velocity sampled in the last `prepare_for_model_step`.
    pub fn current_value(&self) -> (f64, f64) {
        self.current_value
    }

    /// Box-Muller pair, redrawn while the angle term exceeds `max_angle`.
    fn draw_term(&mut self) -> (f64, f64) {
        let mut term = self.box_muller();
        for _ in 0..MAX_REDRAWS {
            if (self.sigma_theta * term.1).abs() <= self.max_angle {
                break;
            }
            term = self.box_muller();
        }
        term
    }

    fn box_muller(&mut self) -> (f64, f64) {
        let cos_arg = 2.0 * PI * self.rng.random::<f64>();
        let srt = (-2.0 * self.rng.random_range(0.001..0.999f64).ln()).sqrt();
        (srt * cos_arg.cos(), srt * cos_arg.sin())
    }

    fn update_uncertainty(&mut self, elapsed: f64, num_elements: usize) {
        self.sigma2 = (self.speed_scale * 0.315 * elapsed.powf(0.147)).powi(2) / 2.0;
        self.sigma_theta = self.angle_scale * 2.73 * elapsed.sqrt().sqrt();

        let reinit = match &self.uncertainty {
            None => true,
            // Time went backwards without a run reset, or elements disappeared.
            Some(u) => elapsed < u.time_set || num_elements < u.terms.len(),
        };

        if reinit {
            let terms = (0..num_elements).map(|_| self.draw_term()).collect();
            self.uncertainty = Some(WindUncertainty { terms, time_set: elapsed });
            return;
        }

        let (have, time_set) = match &self.uncertainty {
            Some(u) => (u.terms.len(), u.time_set),
            None => return,
        };
        if elapsed >= time_set + self.uncertain_duration {
            let terms = (0..num_elements).map(|_| self.draw_term()).collect();
            self.uncertainty = Some(WindUncertainty { terms, time_set: elapsed });
            debug!("Redrew wind uncertainty for {} elements at +{} s.", num_elements, elapsed);
        } else if num_elements > have {
            let extra: Vec<(f64, f64)> = (have..num_elements).map(|_| self.draw_term()).collect();
            if let Some(u) = self.uncertainty.as_mut() {
                u.terms.extend(extra);
            }
        }
    }

    /// Perturbs a wind vector for uncertain element `idx`.
    fn add_uncertainty(&self, idx: usize, u: f64, v: f64, rng: &mut StdRng) -> (f64, f64) {
        let Some(uncertainty) = &self.uncertainty else {
            return (u, v);
        };
        let norm = (u * u + v * v).sqrt();
        if norm < 1.0 {
            // Too little wind to scale; diffuse a little instead.
            let unit = Uniform::new_inclusive(-1.0f64, 1.0f64).map(|d| (rng.sample(d), rng.sample(d)));
            return match unit {
                Ok((r1, r2)) => (u + self.uncertainty_diffusion * r1, v + self.uncertainty_diffusion * r2),
                Err(_) => (u, v),
            };
        }
        let Some(&(rand_cos, rand_sin)) = uncertainty.terms.get(idx) else {
            return (u, v);
        };

        let w = norm;
        let s = w * w - self.sigma2;
        let (sqs, m) = if s > 0.0 {
            let sqs = s.sqrt();
            (sqs, sqs.sqrt())
        } else {
            (0.0, 0.0)
        };
        let x = rand_cos * (w - sqs).sqrt() + m;
        let dtheta = rand_sin * self.sigma_theta * PI / 180.0;
        let (sin_t, cos_t) = dtheta.sin_cos();
        // Compensate for projecting the rotated vector.
        let w = x * x / cos_t.max(0.001);

        let t = w / norm;
        let (u, v) = (u * t, v * t);
        (u * cos_t - v * sin_t, v * cos_t + u * sin_t)
    }
}

impl Mover for WindMover {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare_for_model_run(&mut self) -> Result<()> {
        self.is_first_step = true;
        self.model_start_time = None;
        self.uncertainty = None;
        self.rng = StdRng::seed_from_u64(self.seed);
        Ok(())
    }

    fn prepare_for_model_step(&mut self, sc: &SpillContainer, time_step: f64, model_time: NaiveDateTime) -> Result<()> {
        if self.is_first_step || self.model_start_time.is_none() {
            self.model_start_time = Some(model_time);
        }
        if sc.uncertain() {
            let start = self.model_start_time.unwrap_or(model_time);
            let elapsed = duration_seconds(model_time - start).max(0.0);
            self.update_uncertainty(elapsed, sc.num_elements());
            // m/s; divided by the step because it is multiplied by it again in get_move.
            self.uncertainty_diffusion = (6.0 * (EDDY_DIFFUSION / 10_000.0) / time_step).sqrt();
        }
        self.current_value = self.series.velocity_at(model_time);
        Ok(())
    }

    fn get_move(&self, sc: &SpillContainer, time_step: f64, model_time: NaiveDateTime) -> Result<Vec<Vec3>> {
        let (u0, v0) = self.current_value;
        let uncertain = sc.uncertain();

        let delta = sc
            .positions
            .par_iter()
            .enumerate()
            .map(|(idx, pos)| {
                if !sc.status_codes[idx].is_mobile() {
                    return Vec3::zero();
                }
                let (mut u, mut v) = (u0, v0);
                if uncertain {
                    let mut rng = StdRng::seed_from_u64(element_seed(self.seed, sc.element_id[idx], model_time, true));
                    (u, v) = self.add_uncertainty(idx, u, v, &mut rng);
                }
                let windage = sc.windages[idx];
                meters_to_lonlat(u * windage * time_step, v * windage * time_step, pos.y)
            })
            .collect();
        Ok(delta)
    }

    fn model_step_is_done(&mut self) -> Result<()> {
        self.is_first_step = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spill_container::PointRelease;
    use chrono::{Duration, NaiveDate};
    use spill_common::METERS_PER_DEGREE_LAT;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 2, 13).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn population(uncertain: bool, n: u32) -> SpillContainer {
        let mut sc = SpillContainer::new(uncertain);
        sc.add_spill(PointRelease::new("w", n, Vec3::zero(), t0()).with_windage_range(0.02, 0.02)).unwrap();
        sc.release_elements(t0(), 900.0);
        sc
    }

    #[test]
    fn movers_sharing_a_series_see_the_same_wind() {
        let series = Arc::new(WindSeries::constant(7.0, 90.0));
        let sc = population(false, 2);
        let mut a = WindMover::new(Arc::clone(&series));
        let mut b = WindMover::new(Arc::clone(&series)).with_seed(5);
        assert!(Arc::ptr_eq(a.series(), b.series()));
        for mover in [&mut a, &mut b] {
            mover.prepare_for_model_run().unwrap();
            mover.prepare_for_model_step(&sc, 900.0, t0()).unwrap();
        }
        assert_eq!(a.current_value(), b.current_value());
        assert_eq!(Arc::strong_count(&series), 3);
    }

    #[test]
    fn westerly_wind_pushes_east_by_windage() {
        let sc = population(false, 5);
        let mut mover = WindMover::new(WindSeries::constant(10.0, 270.0));
        mover.prepare_for_model_run().unwrap();
        mover.prepare_for_model_step(&sc, 900.0, t0()).unwrap();
        let delta = mover.get_move(&sc, 900.0, t0()).unwrap();
        let expected = 10.0 * 0.02 * 900.0 / METERS_PER_DEGREE_LAT;
        for d in delta {
            assert!((d.x - expected).abs() < 1e-12);
            assert!(d.y.abs() < 1e-12);
        }
    }

    #[test]
    fn series_interpolates_between_records() {
        let series = WindSeries::new(&[(t0(), 0.0, 0.0), (t0() + Duration::hours(2), 10.0, 180.0)]).unwrap();
        let (u, v) = series.velocity_at(t0() + Duration::hours(1));
        assert!(u.abs() < 1e-12);
        assert!((v - 5.0).abs() < 1e-12);
        // Held constant past the last record.
        let (_, v_late) = series.velocity_at(t0() + Duration::hours(5));
        assert!((v_late - 10.0).abs() < 1e-12);
    }

    #[test]
    fn series_rejects_unordered_records() {
        assert!(WindSeries::new(&[(t0(), 1.0, 0.0), (t0(), 2.0, 0.0)]).is_err());
        assert!(WindSeries::new(&[]).is_err());
    }

    #[test]
    fn uncertain_population_is_perturbed_deterministically() {
        let certain = population(false, 50);
        let uncertain = population(true, 50);
        let later = t0() + Duration::hours(6);

        let run = |seed: u64| {
            let mut mover = WindMover::new(WindSeries::constant(10.0, 270.0)).with_seed(seed);
            mover.prepare_for_model_run().unwrap();
            mover.prepare_for_model_step(&certain, 900.0, t0()).unwrap();
            mover.prepare_for_model_step(&uncertain, 900.0, t0()).unwrap();
            mover.model_step_is_done().unwrap();
            mover.prepare_for_model_step(&certain, 900.0, later).unwrap();
            mover.prepare_for_model_step(&uncertain, 900.0, later).unwrap();
            (
                mover.get_move(&certain, 900.0, later).unwrap(),
                mover.get_move(&uncertain, 900.0, later).unwrap(),
            )
        };

        let (certain_a, uncertain_a) = run(5);
        let (_, uncertain_b) = run(5);
        assert_eq!(uncertain_a, uncertain_b);
        assert_ne!(certain_a, uncertain_a);
        assert!(uncertain_a.iter().all(|d| d.x.is_finite() && d.y.is_finite()));
    }

    #[test]
    fn uncertainty_terms_grow_with_the_population() {
        let mut mover = WindMover::new(WindSeries::constant(10.0, 0.0)).with_seed(1);
        mover.prepare_for_model_run().unwrap();
        mover.update_uncertainty(0.0, 10);
        mover.update_uncertainty(900.0, 25);
        assert_eq!(mover.uncertainty.as_ref().map(|u| u.terms.len()), Some(25));
        mover.update_uncertainty(1800.0, 5);
        assert_eq!(mover.uncertainty.as_ref().map(|u| u.time_set), Some(1800.0));
    }
}
