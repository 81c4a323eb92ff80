//! The stepping coordinator.
//!
//! A [`Model`] owns the clock, the movers, the land/water map, both element
//! populations and the element cache, and drives them through a run one step
//! at a time. Each call to [`Model::step`] either performs exactly one
//! transition of the clock or reports that the run is finished.

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use log::{debug, error, info, trace};
use spill_common::StepRenderer;

use crate::cache::ElementCache;
use crate::clock::{RunState, SimulationClock, TimeStep};
use crate::error::{Hook, ModelError, ModelResult};
use crate::map::{LandWaterMap, WaterWorld};
use crate::movers::{Mover, WindSeries};
use crate::spill_container::{PointRelease, SpillContainerPair};

/// Result of a single call to [`Model::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The clock moved to this step index.
    Advanced(u32),
    /// The run was already complete; nothing changed.
    Finished,
}

/// An image written by [`Model::next_image`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepImage {
    pub step: u32,
    pub path: PathBuf,
    pub model_time: NaiveDateTime,
}

pub struct Model {
    clock: SimulationClock,
    movers: Vec<Box<dyn Mover>>,
    /// Named wind series, shared with the wind movers that read them.
    winds: Vec<(String, Arc<WindSeries>)>,
    spills: SpillContainerPair,
    cache: ElementCache,
    map: Box<dyn LandWaterMap>,
    output_map: Option<Box<dyn StepRenderer>>,
}

impl Default for Model {
    fn default() -> Self {
        Model {
            clock: SimulationClock::default(),
            movers: Vec::new(),
            winds: Vec::new(),
            spills: SpillContainerPair::new(false),
            cache: ElementCache::new(false),
            map: Box::new(WaterWorld::default()),
            output_map: None,
        }
    }
}

impl Model {
    /// A model starting at the current hour, stepping every 15 minutes for one day,
    /// over open water, with uncertainty and caching off.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(start_time: NaiveDateTime, time_step: impl Into<TimeStep>, duration: Duration) -> ModelResult<Self> {
        Ok(Model {
            clock: SimulationClock::new(start_time, time_step, duration)?,
            ..Default::default()
        })
    }

    /// Back to a freshly constructed model: movers, spills, map and output consumer are dropped.
    pub fn reset(&mut self) {
        *self = Model::default();
        debug!("Model reset to defaults.");
    }

    /// Puts the run back before its first step. Configuration is kept.
    pub fn rewind(&mut self) {
        self.clock.reset();
        self.spills.rewind();
        self.cache.rewind();
        debug!("Model rewound.");
    }

    // --- Clock ---

    pub fn start_time(&self) -> NaiveDateTime {
        self.clock.start_time()
    }

    pub fn set_start_time(&mut self, start_time: NaiveDateTime) {
        self.clock.set_start_time(start_time);
        self.rewind();
    }

    /// Time step in seconds.
    pub fn time_step(&self) -> f64 {
        self.clock.time_step()
    }

    pub fn set_time_step(&mut self, time_step: impl Into<TimeStep>) -> ModelResult<()> {
        self.clock.set_time_step(time_step)?;
        self.rewind();
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        self.clock.duration()
    }

    /// Extending a run keeps its progress; shortening it rewinds.
    pub fn set_duration(&mut self, duration: Duration) -> ModelResult<()> {
        if self.clock.set_duration(duration)? {
            self.rewind();
        }
        Ok(())
    }

    pub fn num_time_steps(&self) -> i64 {
        self.clock.num_time_steps()
    }

    /// -1 before the first step.
    pub fn current_step(&self) -> i64 {
        self.clock.current_step()
    }

    pub fn model_time(&self) -> NaiveDateTime {
        self.clock.model_time()
    }

    pub fn state(&self) -> RunState {
        self.clock.state()
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    // --- Collaborators ---

    pub fn map(&self) -> &dyn LandWaterMap {
        self.map.as_ref()
    }

    pub fn set_map(&mut self, map: Box<dyn LandWaterMap>) {
        self.map = map;
        self.rewind();
    }

    pub fn uncertain(&self) -> bool {
        self.spills.uncertain()
    }

    /// Turning uncertainty on or off rewinds; setting the current value does nothing.
    pub fn set_uncertain(&mut self, uncertain: bool) {
        if self.spills.set_uncertain(uncertain) {
            self.rewind();
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.enabled()
    }

    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    pub fn cache(&self) -> &ElementCache {
        &self.cache
    }

    /// Movers apply in the order they were added.
    pub fn add_mover(&mut self, mover: impl Mover + 'static) {
        self.add_boxed_mover(Box::new(mover));
    }

    pub fn add_boxed_mover(&mut self, mover: Box<dyn Mover>) {
        debug!("Adding mover '{}'.", mover.name());
        self.movers.push(mover);
    }

    pub fn movers(&self) -> impl Iterator<Item = &dyn Mover> + '_ {
        self.movers.iter().map(|m| {
            let mover: &dyn Mover = m.as_ref();
            mover
        })
    }

    /// Registers a named wind and returns the handle movers should share.
    pub fn add_wind(&mut self, name: impl Into<String>, series: WindSeries) -> ModelResult<Arc<WindSeries>> {
        let name = name.into();
        if self.wind(&name).is_some() {
            return Err(ModelError::Configuration(format!("wind '{}' is already defined", name)));
        }
        debug!("Adding wind '{}'.", name);
        let series = Arc::new(series);
        self.winds.push((name, Arc::clone(&series)));
        Ok(series)
    }

    pub fn wind(&self, name: &str) -> Option<&Arc<WindSeries>> {
        self.winds.iter().find(|(n, _)| n == name).map(|(_, series)| series)
    }

    pub fn winds(&self) -> impl Iterator<Item = (&str, &Arc<WindSeries>)> + '_ {
        self.winds.iter().map(|(name, series)| (name.as_str(), series))
    }

    pub fn add_spill(&mut self, spill: PointRelease) -> ModelResult<()> {
        debug!("Adding spill '{}' of {} elements.", spill.name, spill.num_elements);
        self.spills.add_spill(spill)
    }

    pub fn spills(&self) -> &SpillContainerPair {
        &self.spills
    }

    pub fn set_output_map(&mut self, output_map: Box<dyn StepRenderer>) {
        self.output_map = Some(output_map);
    }

    pub fn has_output_map(&self) -> bool {
        self.output_map.is_some()
    }

    // --- Stepping ---

    /// Performs one transition of the run.
    ///
    /// The first call after a rewind prepares the collaborators; every later call
    /// runs one step of movement. Either way the clock then advances, newly due
    /// elements are released, and the populations are cached. If a collaborator
    /// fails the clock and cache are left as they were.
    pub fn step(&mut self) -> ModelResult<StepOutcome> {
        let state = self.clock.state();
        if state == RunState::Finished {
            trace!("Run already finished at step {}.", self.clock.current_step());
            return Ok(StepOutcome::Finished);
        }
        let next = self.clock.current_step() + 1;
        let step = u32::try_from(next).map_err(|_| ModelError::Configuration(format!("step index {} out of range", next)))?;

        if state == RunState::NotStarted {
            self.setup_model_run()?;
        } else {
            self.setup_time_step()?;
            self.move_elements()?;
            self.step_is_done()?;
        }

        self.clock.advance();
        let model_time = self.clock.model_time();
        let time_step = self.clock.time_step();
        for sc in self.spills.items_mut() {
            sc.release_elements(model_time, time_step);
        }
        self.cache.save_timestep(step, model_time, &self.spills);

        trace!(
            "Step {}/{} at {} ({} certain elements)",
            step,
            self.clock.num_time_steps(),
            model_time,
            self.spills.certain().num_elements()
        );
        Ok(StepOutcome::Advanced(step))
    }

    /// Rewinds, then yields each step index until the run finishes.
    pub fn steps(&mut self) -> Steps<'_> {
        self.rewind();
        Steps { model: self, done: false }
    }

    fn setup_model_run(&mut self) -> ModelResult<()> {
        for mover in self.movers.iter_mut() {
            mover
                .prepare_for_model_run()
                .map_err(|e| collaborator_failed(mover.name(), Hook::PrepareForModelRun, e))?;
        }
        self.map.prepare_for_model_run();
        self.spills.rewind();
        info!(
            "Starting run at {}: {} steps of {} s, uncertain = {}.",
            self.clock.start_time(),
            self.clock.num_time_steps(),
            self.clock.time_step(),
            self.spills.uncertain()
        );
        Ok(())
    }

    fn setup_time_step(&mut self) -> ModelResult<()> {
        let time_step = self.clock.time_step();
        let model_time = self.clock.model_time();
        for mover in self.movers.iter_mut() {
            for sc in self.spills.items() {
                mover
                    .prepare_for_model_step(sc, time_step, model_time)
                    .map_err(|e| collaborator_failed(mover.name(), Hook::PrepareForModelStep, e))?;
            }
        }
        Ok(())
    }

    /// Movers all see the pre-step positions; their displacements are summed.
    fn move_elements(&mut self) -> ModelResult<()> {
        let time_step = self.clock.time_step();
        let model_time = self.clock.model_time();
        for sc in self.spills.items_mut() {
            if sc.is_empty() {
                continue;
            }
            self.map
                .refloat_elements(sc, time_step)
                .map_err(|e| collaborator_failed("map", Hook::RefloatElements, e))?;

            sc.next_positions.copy_from_slice(&sc.positions);
            for mover in &self.movers {
                let delta = mover
                    .get_move(sc, time_step, model_time)
                    .map_err(|e| collaborator_failed(mover.name(), Hook::GetMove, e))?;
                if delta.len() != sc.num_elements() {
                    return Err(collaborator_failed(
                        mover.name(),
                        Hook::GetMove,
                        anyhow::anyhow!("returned {} displacements for {} elements", delta.len(), sc.num_elements()),
                    ));
                }
                for (next, d) in sc.next_positions.iter_mut().zip(delta) {
                    *next += d;
                }
            }

            self.map
                .beach_elements(sc)
                .map_err(|e| collaborator_failed("map", Hook::BeachElements, e))?;
            sc.positions.copy_from_slice(&sc.next_positions);
        }
        Ok(())
    }

    fn step_is_done(&mut self) -> ModelResult<()> {
        for mover in self.movers.iter_mut() {
            mover
                .model_step_is_done()
                .map_err(|e| collaborator_failed(mover.name(), Hook::ModelStepIsDone, e))?;
        }
        Ok(())
    }

    // --- Image output ---

    /// Draws the live populations for the current step into `images_dir`.
    /// The background is drawn and saved as well on step 0.
    pub fn write_image(&mut self, images_dir: &Path) -> ModelResult<PathBuf> {
        let step = self.clock.current_step();
        if step < 0 {
            return Err(ModelError::Configuration("no step has been run yet".to_string()));
        }
        let canvas = self.output_map.as_mut().ok_or_else(missing_output_map)?;

        if step == 0 {
            canvas.draw_background().map_err(ModelError::Output)?;
            canvas
                .save_background(&images_dir.join("background_map.png"))
                .map_err(ModelError::Output)?;
        }
        let path = images_dir.join(format!("foreground_{:05}.png", step));
        canvas.create_foreground_image();
        for sc in self.spills.items() {
            canvas.draw_elements(sc.uncertain(), &sc.positions, &sc.status_codes);
        }
        canvas.save_foreground(&path).map_err(ModelError::Output)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Steps once and writes the image for the new step. `None` once the run is finished.
    pub fn next_image(&mut self, images_dir: &Path) -> ModelResult<Option<StepImage>> {
        if self.output_map.is_none() {
            return Err(missing_output_map());
        }
        match self.step()? {
            StepOutcome::Finished => Ok(None),
            StepOutcome::Advanced(step) => {
                let path = self.write_image(images_dir)?;
                Ok(Some(StepImage {
                    step,
                    path,
                    model_time: self.clock.model_time(),
                }))
            }
        }
    }

    /// Runs to completion from wherever the run currently is, writing an image per step.
    /// Returns the number of images written.
    pub fn full_run_with_image_output(&mut self, images_dir: &Path) -> ModelResult<usize> {
        let mut written = 0;
        while let Some(image) = self.next_image(images_dir)? {
            trace!("Step {} image at {}", image.step, image.path.display());
            written += 1;
        }
        info!("Done with the model run: {} images in {}.", written, images_dir.display());
        Ok(written)
    }

    /// Re-renders a step from the element cache.
    pub fn render_cached_step(&mut self, step: u32, images_dir: &Path) -> ModelResult<PathBuf> {
        let snapshot = self.cache.load_timestep(step)?;
        let canvas = self.output_map.as_mut().ok_or_else(missing_output_map)?;
        let path = images_dir.join(format!("foreground_{:05}.png", step));
        canvas.create_foreground_image();
        for population in &snapshot.populations {
            canvas.draw_elements(population.uncertain, &population.positions, &population.status_codes);
        }
        canvas.save_foreground(&path).map_err(ModelError::Output)?;
        Ok(path)
    }
}

fn collaborator_failed(name: &str, hook: Hook, source: anyhow::Error) -> ModelError {
    error!("{} failed in {}: {:#}", name, hook, source);
    ModelError::collaborator(name, hook, source)
}

fn missing_output_map() -> ModelError {
    ModelError::Configuration("image output needs an output map".to_string())
}

/// Iterator over a run; see [`Model::steps`].
///
/// Yields each new step index. Stops after the run finishes or after the first error.
pub struct Steps<'a> {
    model: &'a mut Model,
    done: bool,
}

impl Steps<'_> {
    /// The model between steps.
    pub fn model(&self) -> &Model {
        self.model
    }
}

impl Iterator for Steps<'_> {
    type Item = ModelResult<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.model.step() {
            Ok(StepOutcome::Advanced(step)) => Some(Ok(step)),
            Ok(StepOutcome::Finished) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Steps<'_> {}
