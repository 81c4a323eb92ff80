use anyhow::Result;
use log::trace;
use rand::prelude::*;
use spill_common::{ElementStatus, Vec3};

use crate::spill_container::SpillContainer;

/// ((min_lon, min_lat), (max_lon, max_lat))
pub type BoundingBox = ((f64, f64), (f64, f64));

/// Samples taken along an element's path when looking for the coastline.
const PATH_SAMPLES: usize = 16;

/// The land/water boundary the model moves elements against.
pub trait LandWaterMap: Send {
    fn bounds(&self) -> BoundingBox;

    /// Land polygons as (lon, lat) rings, for drawing.
    fn land_polygons(&self) -> &[Vec<(f64, f64)>] {
        &[]
    }

    fn on_map(&self, p: Vec3) -> bool {
        let ((min_lon, min_lat), (max_lon, max_lat)) = self.bounds();
        p.x >= min_lon && p.x <= max_lon && p.y >= min_lat && p.y <= max_lat
    }

    fn on_land(&self, p: Vec3) -> bool;

    /// Called once when a run starts.
    fn prepare_for_model_run(&mut self) {}

    /// Returns beached elements to the water where conditions allow.
    fn refloat_elements(&mut self, sc: &mut SpillContainer, time_step: f64) -> Result<()>;

    /// Checks every in-water element's path from `positions` to `next_positions`,
    /// adjusting `next_positions` and `status_codes` for elements that hit land or
    /// leave the map.
    fn beach_elements(&mut self, sc: &mut SpillContainer) -> Result<()>;
}

/// Open water everywhere; elements leaving the bounds are flagged off the map.
#[derive(Debug, Clone)]
pub struct WaterWorld {
    bounds: BoundingBox,
}

impl WaterWorld {
    pub fn new(bounds: BoundingBox) -> Self {
        WaterWorld { bounds }
    }
}

impl Default for WaterWorld {
    fn default() -> Self {
        WaterWorld::new(((-180.0, -90.0), (180.0, 90.0)))
    }
}

impl LandWaterMap for WaterWorld {
    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn on_land(&self, _p: Vec3) -> bool {
        false
    }

    fn refloat_elements(&mut self, _sc: &mut SpillContainer, _time_step: f64) -> Result<()> {
        Ok(())
    }

    fn beach_elements(&mut self, sc: &mut SpillContainer) -> Result<()> {
        for i in 0..sc.num_elements() {
            if sc.status_codes[i] == ElementStatus::InWater && !self.on_map(sc.next_positions[i]) {
                sc.status_codes[i] = ElementStatus::OffMaps;
            }
        }
        Ok(())
    }
}

/// Land described by polygons, with probabilistic refloating of beached elements.
#[derive(Debug, Clone)]
pub struct PolygonMap {
    bounds: BoundingBox,
    polygons: Vec<Vec<(f64, f64)>>,
    /// Seconds; 0 refloats everything every step, infinity never refloats.
    refloat_halflife: f64,
    seed: u64,
    rng: StdRng,
}

impl PolygonMap {
    pub fn new(bounds: BoundingBox, polygons: Vec<Vec<(f64, f64)>>) -> Self {
        PolygonMap {
            bounds,
            polygons,
            refloat_halflife: 3600.0,
            seed: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_refloat_halflife(mut self, seconds: f64) -> Self {
        self.refloat_halflife = seconds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Chance a beached element refloats during a step of `time_step` seconds.
    pub fn refloat_probability(&self, time_step: f64) -> f64 {
        if self.refloat_halflife <= 0.0 {
            1.0
        } else if self.refloat_halflife.is_infinite() {
            0.0
        } else {
            1.0 - 0.5f64.powf(time_step / self.refloat_halflife)
        }
    }

    /// Last water point along the path, if the path touches land.
    fn last_water_point(&self, from: Vec3, to: Vec3) -> Option<Vec3> {
        let mut last_water = from;
        for k in 1..=PATH_SAMPLES {
            let p = from.lerp(to, k as f64 / PATH_SAMPLES as f64);
            if self.on_land(p) {
                return Some(last_water);
            }
            last_water = p;
        }
        None
    }
}

impl LandWaterMap for PolygonMap {
    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn land_polygons(&self) -> &[Vec<(f64, f64)>] {
        &self.polygons
    }

    fn on_land(&self, p: Vec3) -> bool {
        self.polygons.iter().any(|poly| point_in_polygon((p.x, p.y), poly))
    }

    fn prepare_for_model_run(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn refloat_elements(&mut self, sc: &mut SpillContainer, time_step: f64) -> Result<()> {
        let probability = self.refloat_probability(time_step);
        if probability <= 0.0 {
            return Ok(());
        }
        let mut refloated = 0;
        for i in 0..sc.num_elements() {
            if sc.status_codes[i] == ElementStatus::OnLand && self.rng.random::<f64>() < probability {
                sc.status_codes[i] = ElementStatus::InWater;
                sc.positions[i] = sc.last_water_positions[i];
                refloated += 1;
            }
        }
        trace!("Refloated {} elements.", refloated);
        Ok(())
    }

    fn beach_elements(&mut self, sc: &mut SpillContainer) -> Result<()> {
        for i in 0..sc.num_elements() {
            if sc.status_codes[i] != ElementStatus::InWater {
                continue;
            }
            let (from, to) = (sc.positions[i], sc.next_positions[i]);
            if !self.on_map(to) {
                sc.status_codes[i] = ElementStatus::OffMaps;
                continue;
            }
            match self.last_water_point(from, to) {
                Some(water) => {
                    sc.next_positions[i] = water;
                    sc.last_water_positions[i] = water;
                    sc.status_codes[i] = ElementStatus::OnLand;
                }
                None => sc.last_water_positions[i] = to,
            }
        }
        Ok(())
    }
}

/// Even-odd ray casting test.
pub fn point_in_polygon(point: (f64, f64), polygon: &[(f64, f64)]) -> bool {
    let (px, py) = point;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
