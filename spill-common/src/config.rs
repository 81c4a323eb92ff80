use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Configuration for the simulation clock
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub start_time: NaiveDateTime,
    #[serde(default = "default_time_step_seconds")]
    pub time_step_seconds: f64,
    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
}

impl TimingConfig {
    pub fn duration_seconds(&self) -> f64 {
        self.duration_hours * 3600.0
    }
}

// Run-wide switches
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ModelSection {
    #[serde(default)]
    pub uncertain: bool,
    #[serde(default)]
    pub cache_enabled: bool,
}

// Land/water map. No polygons means open water everywhere.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MapConfig {
    /// ((min_lon, min_lat), (max_lon, max_lat))
    #[serde(default = "default_bounds")]
    pub bounds: [[f64; 2]; 2],
    #[serde(default)]
    pub land_polygons: Vec<Vec<[f64; 2]>>,
    #[serde(default = "default_refloat_halflife_hours")]
    pub refloat_halflife_hours: f64,
    #[serde(default)]
    pub seed: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            bounds: default_bounds(),
            land_polygons: Vec::new(),
            refloat_halflife_hours: default_refloat_halflife_hours(),
            seed: 0,
        }
    }
}

// A point-source release of elements
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SpillConfig {
    pub name: String,
    pub num_elements: u32,
    /// [lon, lat, depth]
    pub start_position: [f64; 3],
    pub release_time: NaiveDateTime,
    /// Elements are released linearly between `release_time` and this time, if set.
    #[serde(default)]
    pub end_release_time: Option<NaiveDateTime>,
    #[serde(default = "default_windage_range")]
    pub windage_range: [f64; 2],
    #[serde(default)]
    pub seed: u64,
}

// One record of a wind time series. Direction is where the wind blows from, in degrees.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WindRecordConfig {
    pub time: NaiveDateTime,
    pub speed: f64,
    pub direction: f64,
}

// A named wind series that any number of wind movers can share.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WindConfig {
    pub name: String,
    pub timeseries: Vec<WindRecordConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoverConfig {
    Random {
        /// cm^2/s
        #[serde(default = "default_diffusion_coef")]
        diffusion_coef: f64,
        #[serde(default = "default_uncertain_factor")]
        uncertain_factor: f64,
        #[serde(default)]
        seed: u64,
    },
    Wind {
        /// Name of an entry in `[[winds]]`; mutually exclusive with `timeseries`.
        #[serde(default)]
        wind: Option<String>,
        #[serde(default)]
        timeseries: Vec<WindRecordConfig>,
        #[serde(default = "default_uncertain_duration_hours")]
        uncertain_duration_hours: f64,
        #[serde(default = "default_speed_scale")]
        speed_scale: f64,
        #[serde(default = "default_angle_scale")]
        angle_scale: f64,
        #[serde(default = "default_max_angle")]
        max_angle: f64,
        #[serde(default)]
        seed: u64,
    },
    Simple {
        /// m/s, [east, north, up]
        velocity: [f64; 3],
        #[serde(default)]
        uncertainty_scale: f64,
    },
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    /// Per-step images are written here if set.
    #[serde(default)]
    pub images_dir: Option<PathBuf>,
    #[serde(default = "default_image_size")]
    pub image_size: [u32; 2],
    #[serde(default)]
    pub save_positions: bool,
    #[serde(default)]
    pub save_snapshots: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "spill_run".to_string(),
            images_dir: None,
            image_size: default_image_size(),
            save_positions: false,
            save_snapshots: false,
            format: None,
        }
    }
}

// Main model configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelConfig {
    pub timing: TimingConfig,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub spills: Vec<SpillConfig>,
    #[serde(default)]
    pub winds: Vec<WindConfig>,
    #[serde(default)]
    pub movers: Vec<MoverConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ModelConfig {
    /// Loads the model configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: ModelConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Looks up a shared wind by name.
    pub fn wind(&self, name: &str) -> Option<&WindConfig> {
        self.winds.iter().find(|w| w.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        let dt = self.timing.time_step_seconds;
        if !(dt.is_finite() && dt > 0.0) {
            anyhow::bail!("time_step_seconds must be positive, got {}", dt);
        }
        if (self.timing.duration_seconds() / dt).floor() < 1.0 {
            anyhow::bail!(
                "duration ({} h) must cover at least one time step ({} s).",
                self.timing.duration_hours,
                dt
            );
        }

        let [[min_lon, min_lat], [max_lon, max_lat]] = self.map.bounds;
        if min_lon >= max_lon || min_lat >= max_lat {
            anyhow::bail!("map bounds must be ((min_lon, min_lat), (max_lon, max_lat)).");
        }
        if self.map.refloat_halflife_hours < 0.0 {
            anyhow::bail!("refloat_halflife_hours must not be negative.");
        }
        if let Some(poly) = self.map.land_polygons.iter().find(|p| p.len() < 3) {
            anyhow::bail!("land polygon has {} vertices, at least 3 are required.", poly.len());
        }

        for spill in &self.spills {
            if spill.num_elements == 0 {
                anyhow::bail!("spill '{}': num_elements must be greater than 0.", spill.name);
            }
            let [lo, hi] = spill.windage_range;
            if lo < 0.0 || lo > hi {
                anyhow::bail!("spill '{}': invalid windage_range [{}, {}].", spill.name, lo, hi);
            }
            if let Some(end) = spill.end_release_time {
                if end < spill.release_time {
                    anyhow::bail!("spill '{}': end_release_time is before release_time.", spill.name);
                }
            }
        }

        for (i, wind) in self.winds.iter().enumerate() {
            if self.winds[..i].iter().any(|w| w.name == wind.name) {
                anyhow::bail!("wind '{}' is defined twice.", wind.name);
            }
            validate_timeseries(&format!("wind '{}'", wind.name), &wind.timeseries)?;
        }

        for mover in &self.movers {
            match mover {
                MoverConfig::Random { diffusion_coef, uncertain_factor, .. } => {
                    if *diffusion_coef < 0.0 || *uncertain_factor < 0.0 {
                        anyhow::bail!("random mover: diffusion_coef and uncertain_factor must not be negative.");
                    }
                }
                MoverConfig::Wind { wind, timeseries, uncertain_duration_hours, .. } => {
                    match wind {
                        Some(name) => {
                            if !timeseries.is_empty() {
                                anyhow::bail!("wind mover: give either `wind` or `timeseries`, not both.");
                            }
                            if self.wind(name).is_none() {
                                anyhow::bail!("wind mover: no wind named '{}'.", name);
                            }
                        }
                        None => validate_timeseries("wind mover", timeseries)?,
                    }
                    if *uncertain_duration_hours <= 0.0 {
                        anyhow::bail!("wind mover: uncertain_duration_hours must be positive.");
                    }
                }
                MoverConfig::Simple { .. } => {}
            }
        }

        let [width, height] = self.output.image_size;
        if width < 4 || height < 4 {
            anyhow::bail!("output image_size must be at least 4x4 pixels.");
        }

        Ok(())
    }
}

fn validate_timeseries(label: &str, timeseries: &[WindRecordConfig]) -> Result<()> {
    if timeseries.is_empty() {
        anyhow::bail!("{}: timeseries must contain at least one record.", label);
    }
    if timeseries.windows(2).any(|w| w[1].time <= w[0].time) {
        anyhow::bail!("{}: timeseries must be strictly increasing in time.", label);
    }
    if timeseries.iter().any(|r| r.speed < 0.0) {
        anyhow::bail!("{}: wind speed must not be negative.", label);
    }
    Ok(())
}

fn default_time_step_seconds() -> f64 {
    900.0 // 15 minutes
}

fn default_duration_hours() -> f64 {
    24.0
}

fn default_bounds() -> [[f64; 2]; 2] {
    [[-180.0, -90.0], [180.0, 90.0]]
}

fn default_refloat_halflife_hours() -> f64 {
    1.0
}

fn default_windage_range() -> [f64; 2] {
    [0.01, 0.04]
}

fn default_diffusion_coef() -> f64 {
    100_000.0
}

fn default_uncertain_factor() -> f64 {
    2.0
}

fn default_uncertain_duration_hours() -> f64 {
    3.0
}

fn default_speed_scale() -> f64 {
    2.0
}

fn default_angle_scale() -> f64 {
    0.4
}

fn default_max_angle() -> f64 {
    60.0 // degrees
}

fn default_image_size() -> [u32; 2] {
    [800, 600]
}
