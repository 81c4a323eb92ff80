use crate::status::ElementStatus;
use crate::vecmath::Vec3;
use anyhow::Result;
use std::path::Path;

/// An output consumer that turns element positions into images.
///
/// The model drives it after a step completes: the background once at the
/// start of a run, then a fresh foreground per step.
pub trait StepRenderer {
    /// Draws the static background (land, map bounds).
    fn draw_background(&mut self) -> Result<()>;

    fn save_background(&self, path: &Path) -> Result<()>;

    /// Starts a new, empty foreground image.
    fn create_foreground_image(&mut self);

    /// Draws one population onto the current foreground.
    fn draw_elements(&mut self, uncertain: bool, positions: &[Vec3], status_codes: &[ElementStatus]);

    fn save_foreground(&self, path: &Path) -> Result<()>;
}
