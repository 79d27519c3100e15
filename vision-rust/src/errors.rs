use thiserror::Error;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a [`crate::ModelRuntime`].
///
/// Access denial is the only failure the invoker handles itself, so it is the
/// only one given its own variant. Everything else is carried opaquely.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The caller lacks permission to invoke the requested model.
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("{0}")]
    Other(#[source] BoxedError),
}

impl RuntimeError {
    pub fn other<E>(error: E) -> Self
    where
        E: Into<BoxedError>,
    {
        Self::Other(error.into())
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum VisionError {
    /// The image could not be read from local storage.
    #[error("Image read error: {0}")]
    Io(#[from] std::io::Error),
    /// The request to the model runtime failed.
    #[error("Runtime error: {0}")]
    Runtime(#[source] BoxedError),
    /// The response body was not UTF-8 or not the expected JSON.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The response was well-formed JSON but did not have the expected shape
    /// (e.g. an empty `content` array).
    #[error("Invariant from {0}: {1}")]
    Invariant(&'static str, String),
}

pub type VisionResult<T> = Result<T, VisionError>;
