pub mod config;
pub mod render;
pub mod snapshot;
pub mod status;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    MapConfig, ModelConfig, ModelSection, MoverConfig, OutputConfig, SpillConfig, TimingConfig,
    WindConfig, WindRecordConfig,
};
pub use render::StepRenderer;
pub use snapshot::{ElementSnapshot, StepSnapshot};
pub use status::ElementStatus;
pub use vecmath::{lon_to_lat_ratio, meters_to_lonlat, Vec3, METERS_PER_DEGREE_LAT};
