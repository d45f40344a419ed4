use thiserror::Error;

/// Failure of a computer handler operation.
///
/// Dispatch errors never abort a run: the orchestrator converts them into a
/// `function_call_output` carrying the error text so the model can observe
/// the failure and self-correct on its next turn.
#[derive(Debug, Error)]
pub enum ComputerError {
    /// The handler does not implement this operation (screenshot-only shims).
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The action reached the computer but failed there.
    #[error("{0}")]
    ActionFailed(String),

    /// Screenshot capture or encoding failed.
    #[error("screenshot failed: {0}")]
    Screenshot(String),
}
