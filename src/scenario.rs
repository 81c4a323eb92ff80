//! Builds a ready-to-run [`Model`] from a [`ModelConfig`].

use std::sync::Arc;

use chrono::Duration;
use log::{debug, info};
use spill_common::{MapConfig, ModelConfig, MoverConfig, SpillConfig, Vec3, WindRecordConfig};

use crate::error::{ModelError, ModelResult};
use crate::map::{LandWaterMap, PolygonMap, WaterWorld};
use crate::model::Model;
use crate::movers::{Mover, RandomMover, SimpleMover, WindMover, WindSeries};
use crate::spill_container::PointRelease;

impl Model {
    pub fn from_config(config: &ModelConfig) -> ModelResult<Model> {
        build_model(config)
    }
}

pub fn build_model(config: &ModelConfig) -> ModelResult<Model> {
    config
        .validate()
        .map_err(|e| ModelError::Configuration(format!("{:#}", e)))?;

    let duration = Duration::milliseconds((config.timing.duration_seconds() * 1000.0).round() as i64);
    let mut model = Model::with_clock(config.timing.start_time, config.timing.time_step_seconds, duration)?;
    model.set_uncertain(config.model.uncertain);
    model.set_cache_enabled(config.model.cache_enabled);
    model.set_map(build_map(&config.map));

    for spill in &config.spills {
        model.add_spill(build_spill(spill))?;
    }
    for wind in &config.winds {
        model.add_wind(wind.name.clone(), build_series(&wind.timeseries)?)?;
    }
    for mover in &config.movers {
        let mover = build_mover(mover, &model)?;
        model.add_boxed_mover(mover);
    }

    info!(
        "Built model: {} spills, {} winds, {} movers, {} land polygons.",
        config.spills.len(),
        config.winds.len(),
        config.movers.len(),
        config.map.land_polygons.len()
    );
    Ok(model)
}

fn build_map(config: &MapConfig) -> Box<dyn LandWaterMap> {
    let [[min_lon, min_lat], [max_lon, max_lat]] = config.bounds;
    let bounds = ((min_lon, min_lat), (max_lon, max_lat));
    if config.land_polygons.is_empty() {
        debug!("No land polygons; using open water.");
        return Box::new(WaterWorld::new(bounds));
    }
    let polygons = config
        .land_polygons
        .iter()
        .map(|poly| poly.iter().map(|&[lon, lat]| (lon, lat)).collect())
        .collect();
    Box::new(
        PolygonMap::new(bounds, polygons)
            .with_refloat_halflife(config.refloat_halflife_hours * 3600.0)
            .with_seed(config.seed),
    )
}

fn build_spill(config: &SpillConfig) -> PointRelease {
    let [lon, lat, depth] = config.start_position;
    let [low, high] = config.windage_range;
    let mut spill = PointRelease::new(config.name.clone(), config.num_elements, Vec3::new(lon, lat, depth), config.release_time)
        .with_windage_range(low, high)
        .with_seed(config.seed);
    if let Some(end) = config.end_release_time {
        spill = spill.with_end_release_time(end);
    }
    spill
}

fn build_series(timeseries: &[WindRecordConfig]) -> ModelResult<WindSeries> {
    let records: Vec<_> = timeseries.iter().map(|r| (r.time, r.speed, r.direction)).collect();
    WindSeries::new(&records).map_err(|e| ModelError::Configuration(format!("{:#}", e)))
}

fn build_mover(config: &MoverConfig, model: &Model) -> ModelResult<Box<dyn Mover>> {
    let mover: Box<dyn Mover> = match config {
        MoverConfig::Random {
            diffusion_coef,
            uncertain_factor,
            seed,
        } => Box::new(
            RandomMover::new(*diffusion_coef)
                .with_uncertain_factor(*uncertain_factor)
                .with_seed(*seed),
        ),
        MoverConfig::Wind {
            wind,
            timeseries,
            uncertain_duration_hours,
            speed_scale,
            angle_scale,
            max_angle,
            seed,
        } => {
            let series = match wind {
                Some(name) => model
                    .wind(name)
                    .cloned()
                    .ok_or_else(|| ModelError::Configuration(format!("no wind named '{}'", name)))?,
                None => Arc::new(build_series(timeseries)?),
            };
            let mut wind = WindMover::new(series).with_seed(*seed);
            wind.uncertain_duration = uncertain_duration_hours * 3600.0;
            wind.speed_scale = *speed_scale;
            wind.angle_scale = *angle_scale;
            wind.max_angle = *max_angle;
            Box::new(wind)
        }
        MoverConfig::Simple {
            velocity,
            uncertainty_scale,
        } => {
            let [u, v, w] = *velocity;
            Box::new(SimpleMover::new(Vec3::new(u, v, w)).with_uncertainty_scale(*uncertainty_scale))
        }
    };
    Ok(mover)
}
