//! `ct-matmul` - Batched matrix multiply for contraction-runtime.
//!
//! This crate provides:
//! - Contraction dimensions and NumPy-style batch broadcasting (`MatMulDims`,
//!   `ContractionPlan`)
//! - Selection of the cheapest execution strategy for a plan (`BatchStrategy`)
//! - Dispatch onto a `DeviceExecutor`, or onto a `SparseBackend` when the
//!   right operand was prepacked as a 2:4 structured-sparse weight
//! - The `MatMul` operator tying these together

pub mod broadcast;
pub mod config;
mod dispatch;
pub mod error;
pub mod matmul;
pub mod plan;
pub mod prepack;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use broadcast::MatMulDims;
pub use config::{AttributeValue, MatMulConfig, NodeAttributes, PrepackParam};
pub use error::{MatMulError, Result};
pub use matmul::{ExecutionContext, MatMul};
pub use plan::ContractionPlan;
pub use prepack::{SparsePrepackState, SparseWeightCache};
pub use strategy::{BatchStrategy, StridedUniform};
