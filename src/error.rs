use thiserror::Error;

/// Errors surfaced by the detector boundary.
///
/// Internal code works with `anyhow` and is folded into one of these at the
/// component edge, so callers only ever see four kinds of failure.
#[derive(Debug, Error)]
pub enum NanodetError {
    /// The model artifact is missing, corrupt or incompatible, or the
    /// requested device cannot be used.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Network execution failed or the input image was unusable.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Drawing was requested with an invalid image or handle.
    #[error("visualization failed: {0}")]
    Visualization(String),

    /// An operation was called on a handle that is not loaded.
    #[error("usage error: {0}")]
    Usage(String),
}

impl NanodetError {
    /// Numeric code reported through the C interface.
    pub fn code(&self) -> i32 {
        match self {
            NanodetError::ModelLoad(_) => 1,
            NanodetError::Inference(_) => 2,
            NanodetError::Visualization(_) => 3,
            NanodetError::Usage(_) => 4,
        }
    }

    pub(crate) fn model_load(err: anyhow::Error) -> Self {
        NanodetError::ModelLoad(format!("{err:#}"))
    }

    pub(crate) fn inference(err: anyhow::Error) -> Self {
        NanodetError::Inference(format!("{err:#}"))
    }
}
