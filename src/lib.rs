//! Time-stepping engine for spill trajectory runs.
//!
//! A [`Model`] advances a clock, asks its movers for element displacements,
//! lets the land/water map beach and refloat elements, releases new elements
//! from the configured spills, and caches or renders the result of every step.

pub mod cache;
pub mod clock;
pub mod error;
pub mod map;
pub mod model;
pub mod movers;
pub mod scenario;
pub mod spill_container;

pub use cache::ElementCache;
pub use clock::{RunState, SimulationClock, TimeStep};
pub use error::{CacheError, Hook, ModelError, ModelResult};
pub use map::{LandWaterMap, PolygonMap, WaterWorld};
pub use model::{Model, StepImage, StepOutcome, Steps};
pub use movers::{Mover, RandomMover, SimpleMover, WindMover, WindSeries};
pub use scenario::build_model;
pub use spill_container::{PointRelease, SpillContainer, SpillContainerPair};
