use thiserror::Error;

use deskpilot_computer::ComputerError;
use deskpilot_model::ModelError;

/// Failure of a loop-strategy operation.
#[derive(Debug, Error)]
pub enum LoopError {
    /// Invalid setup: missing required computer tool, malformed pattern,
    /// unusable model string.  Fatal at construction or dispatch time.
    #[error("configuration error: {0}")]
    Config(String),

    /// No registered strategy matches the requested model identifier.
    #[error("no agent loop matches model '{0}'")]
    NoMatch(String),

    /// The strategy exists but cannot perform full step prediction.
    #[error("model '{0}' only supports click prediction")]
    StepUnsupported(String),

    /// Provider exchange failed.  Transient variants are retried by the
    /// orchestrator.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A computer-handler call made inside the strategy failed (screenshot
    /// injection in the composed loop).
    #[error(transparent)]
    Computer(#[from] ComputerError),
}

impl LoopError {
    /// True when the orchestrator should retry the step.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Model(m) if m.is_transient())
    }
}
