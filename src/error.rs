//! Error types for the stepping engine.
//!
//! Reaching the end of a run is not an error; see [`crate::model::StepOutcome`].

use thiserror::Error;

/// Which collaborator hook failed during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    PrepareForModelRun,
    PrepareForModelStep,
    GetMove,
    ModelStepIsDone,
    RefloatElements,
    BeachElements,
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Hook::PrepareForModelRun => "prepare_for_model_run",
            Hook::PrepareForModelStep => "prepare_for_model_step",
            Hook::GetMove => "get_move",
            Hook::ModelStepIsDone => "model_step_is_done",
            Hook::RefloatElements => "refloat_elements",
            Hook::BeachElements => "beach_elements",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("No cached elements available for step {step}")]
    NotAvailable { step: u32 },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{collaborator} failed in {hook}: {source}")]
    Collaborator {
        collaborator: String,
        hook: Hook,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Output failed: {0}")]
    Output(#[source] anyhow::Error),
}

impl ModelError {
    pub(crate) fn collaborator(collaborator: &str, hook: Hook, source: anyhow::Error) -> Self {
        ModelError::Collaborator {
            collaborator: collaborator.to_string(),
            hook,
            source,
        }
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
