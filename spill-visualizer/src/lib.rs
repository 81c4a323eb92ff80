//! Map rendering for spill runs: a land/water background drawn once and a
//! transparent foreground of element positions per step.

pub mod io;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use log::debug;
use spill_common::{lon_to_lat_ratio, ElementStatus, ModelConfig, StepRenderer, StepSnapshot, Vec3};
use std::path::Path;

pub const BACKGROUND_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const LAND_COLOR: Rgba<u8> = Rgba([255, 204, 153, 255]);
pub const MAP_BOUNDS_COLOR: Rgba<u8> = Rgba([175, 175, 175, 255]);
pub const CERTAIN_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const UNCERTAIN_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Equirectangular projection with longitude scaled by the cosine of the
/// center latitude, fitted to the image while keeping the aspect ratio.
#[derive(Debug, Clone, Copy)]
pub struct FlatEarthProjection {
    center: (f64, f64),
    lon_ratio: f64,
    pixels_per_degree: f64,
    width: u32,
    height: u32,
}

impl FlatEarthProjection {
    pub fn new(bounds: ((f64, f64), (f64, f64)), width: u32, height: u32) -> Self {
        let ((min_lon, min_lat), (max_lon, max_lat)) = bounds;
        let center = ((min_lon + max_lon) / 2.0, (min_lat + max_lat) / 2.0);
        let lon_ratio = lon_to_lat_ratio(center.1);
        let span_x = ((max_lon - min_lon) * lon_ratio).max(f64::EPSILON);
        let span_y = (max_lat - min_lat).max(f64::EPSILON);
        let pixels_per_degree = (width as f64 / span_x).min(height as f64 / span_y);
        FlatEarthProjection {
            center,
            lon_ratio,
            pixels_per_degree,
            width,
            height,
        }
    }

    /// Pixel coordinates of (lon, lat); y grows downward.
    #[inline(always)]
    pub fn to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = (lon - self.center.0) * self.lon_ratio * self.pixels_per_degree + self.width as f64 / 2.0;
        let y = self.height as f64 / 2.0 - (lat - self.center.1) * self.pixels_per_degree;
        (x, y)
    }
}

/// Renders a map and its elements to PNG images.
#[derive(Debug, Clone)]
pub struct MapCanvas {
    bounds: ((f64, f64), (f64, f64)),
    land_polygons: Vec<Vec<(f64, f64)>>,
    projection: FlatEarthProjection,
    background: RgbaImage,
    foreground: RgbaImage,
}

impl MapCanvas {
    pub fn new(image_size: (u32, u32), bounds: ((f64, f64), (f64, f64)), land_polygons: Vec<Vec<(f64, f64)>>) -> Self {
        let (width, height) = image_size;
        MapCanvas {
            bounds,
            land_polygons,
            projection: FlatEarthProjection::new(bounds, width, height),
            background: RgbaImage::from_pixel(width, height, BACKGROUND_COLOR),
            foreground: RgbaImage::from_pixel(width, height, TRANSPARENT),
        }
    }

    /// Canvas for the map and image size of a run configuration.
    pub fn from_config(config: &ModelConfig) -> Self {
        let [[min_lon, min_lat], [max_lon, max_lat]] = config.map.bounds;
        let polygons = config
            .map
            .land_polygons
            .iter()
            .map(|poly| poly.iter().map(|&[lon, lat]| (lon, lat)).collect())
            .collect();
        let [width, height] = config.output.image_size;
        MapCanvas::new((width, height), ((min_lon, min_lat), (max_lon, max_lat)), polygons)
    }

    pub fn width(&self) -> u32 {
        self.background.width()
    }

    pub fn height(&self) -> u32 {
        self.background.height()
    }

    pub fn projection(&self) -> &FlatEarthProjection {
        &self.projection
    }

    pub fn background(&self) -> &RgbaImage {
        &self.background
    }

    pub fn foreground(&self) -> &RgbaImage {
        &self.foreground
    }

    /// Background with every population of `snapshot` drawn over it.
    pub fn compose(&self, snapshot: &StepSnapshot) -> RgbaImage {
        let mut image = self.background.clone();
        for population in &snapshot.populations {
            draw_population(
                &mut image,
                &self.projection,
                population.uncertain,
                &population.positions,
                &population.status_codes,
            );
        }
        image
    }

    fn draw_land(&mut self) {
        for polygon in &self.land_polygons {
            let mut points: Vec<Point<i32>> = polygon
                .iter()
                .map(|&(lon, lat)| {
                    let (x, y) = self.projection.to_pixel(lon, lat);
                    Point::new(x.round() as i32, y.round() as i32)
                })
                .collect();
            points.dedup();
            // draw_polygon_mut panics when the ring is explicitly closed.
            while points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            if points.len() < 3 {
                debug!("Skipping land polygon that collapses to {} pixels.", points.len());
                continue;
            }
            draw_polygon_mut(&mut self.background, &points, LAND_COLOR);
        }
    }

    fn draw_bounds(&mut self) {
        let ((min_lon, min_lat), (max_lon, max_lat)) = self.bounds;
        let corners = [(min_lon, min_lat), (max_lon, min_lat), (max_lon, max_lat), (min_lon, max_lat)];
        for i in 0..corners.len() {
            let (a_lon, a_lat) = corners[i];
            let (b_lon, b_lat) = corners[(i + 1) % corners.len()];
            let (ax, ay) = self.projection.to_pixel(a_lon, a_lat);
            let (bx, by) = self.projection.to_pixel(b_lon, b_lat);
            draw_line_segment_mut(
                &mut self.background,
                (ax as f32, ay as f32),
                (bx as f32, by as f32),
                MAP_BOUNDS_COLOR,
            );
        }
    }
}

impl StepRenderer for MapCanvas {
    fn draw_background(&mut self) -> Result<()> {
        self.background = RgbaImage::from_pixel(self.width(), self.height(), BACKGROUND_COLOR);
        self.draw_land();
        self.draw_bounds();
        Ok(())
    }

    fn save_background(&self, path: &Path) -> Result<()> {
        self.background
            .save(path)
            .with_context(|| format!("Failed to write background image '{}'", path.display()))
    }

    fn create_foreground_image(&mut self) {
        self.foreground = RgbaImage::from_pixel(self.width(), self.height(), TRANSPARENT);
    }

    fn draw_elements(&mut self, uncertain: bool, positions: &[Vec3], status_codes: &[ElementStatus]) {
        draw_population(&mut self.foreground, &self.projection, uncertain, positions, status_codes);
    }

    fn save_foreground(&self, path: &Path) -> Result<()> {
        self.foreground
            .save(path)
            .with_context(|| format!("Failed to write foreground image '{}'", path.display()))
    }
}

/// Beached elements are drawn as a small X, floating ones as a 2x2 block.
/// Elements that are off the map, or within a pixel of its edge, are skipped.
pub fn draw_population(
    image: &mut RgbaImage,
    projection: &FlatEarthProjection,
    uncertain: bool,
    positions: &[Vec3],
    status_codes: &[ElementStatus],
) {
    let color = if uncertain { UNCERTAIN_COLOR } else { CERTAIN_COLOR };
    let (width, height) = (image.width() as i64, image.height() as i64);
    for (pos, status) in positions.iter().zip(status_codes) {
        let (fx, fy) = projection.to_pixel(pos.x, pos.y);
        let (x, y) = (fx.floor() as i64, fy.floor() as i64);
        if x < 1 || y < 1 || x >= width - 1 || y >= height - 1 {
            continue;
        }
        match status {
            ElementStatus::OnLand => {
                for d in -2..=2 {
                    put(image, x + d, y + d, color);
                    put(image, x + d, y - d, color);
                }
            }
            ElementStatus::InWater => {
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    put(image, x + dx, y + dy, color);
                }
            }
            _ => {}
        }
    }
}

#[inline(always)]
fn put(image: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, color);
    }
}
