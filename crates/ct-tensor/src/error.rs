use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },
    /// A collaborator rejected a submission. Carries the collaborator's own
    /// message so callers can surface it verbatim.
    #[error("{op} failed: {message}")]
    Backend { op: &'static str, message: String },
}

impl TensorError {
    /// Shorthand for a [`TensorError::Backend`] failure.
    pub fn backend(op: &'static str, message: impl Into<String>) -> Self {
        TensorError::Backend {
            op,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;
