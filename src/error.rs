use crate::changes::UnsupportedFields;
use crate::engine::Operation;
use thiserror::Error;

/// Failures of a flatten run.
///
/// Every variant is reported after the run's cleanup actions have executed.
#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("image '{image}' not found: {message}")]
    ImageNotFound { image: String, message: String },

    #[error(transparent)]
    UnsupportedFields(#[from] UnsupportedFields),

    #[error("failed to {operation}: {message}")]
    ExternalCall {
        operation: Operation,
        message: String,
    },

    #[error("image {image_id} was imported but could not be tagged as '{tag}': {message}")]
    TagFailed {
        image_id: String,
        tag: String,
        message: String,
    },

    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("interrupted")]
    Interrupted,
}

impl FlattenError {
    pub(crate) fn external(operation: Operation, err: anyhow::Error) -> Self {
        FlattenError::ExternalCall {
            operation,
            message: format!("{:#}", err),
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            FlattenError::Interrupted => 130,
            _ => 1,
        }
    }
}
