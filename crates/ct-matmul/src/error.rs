use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatMulError {
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("batch dimensions {left:?} and {right:?} are not broadcast-compatible")]
    BroadcastError { left: Vec<usize>, right: Vec<usize> },
    #[error("{name}: 2:4 structured sparsity validation failed")]
    SparsityValidation { name: String },
    #[error("sparse weight cannot run an irregular batch of {batch_count} matrices")]
    UnsupportedSparseBatchShape { batch_count: usize },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("weight is prepacked for 2:4 sparsity but no sparse backend was supplied")]
    MissingSparseBackend,
    #[error("missing attribute: {0}")]
    MissingAttribute(String),
    #[error("type mismatch for attribute '{key}': expected {expected}, got {got}")]
    AttributeType {
        key: String,
        expected: String,
        got: String,
    },
    #[error("tensor error: {0}")]
    Tensor(#[from] ct_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, MatMulError>;
