//! `ct-tensor` - Tensor primitives and device collaborator interfaces for contraction-runtime.
//!
//! This crate provides:
//! - A `Tensor` type backed by CPU storage, generic over `Element` types
//! - Shape utilities and broadcasting
//! - The `DeviceExecutor`, `SparseBackend` and `Allocator` traits that
//!   matmul dispatch submits work through
//! - Host reference implementations: `CpuExecutor`, `CpuSparseBackend`,
//!   `HostAllocator`

pub mod alloc;
pub mod backend;
pub mod cpu;
pub mod dtype;
pub mod element;
pub mod error;
pub mod shape;
pub mod sparse;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use alloc::{Allocator, DeviceBuffer, HostAllocator};
pub use backend::{DeviceExecutor, DeviceOffsets, GemmParams, StridedBatch, Transpose};
pub use cpu::{CpuExecutor, CpuSparseBackend};
pub use dtype::DType;
pub use element::Element;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use sparse::{CompressedBuffer, CompressedLayout, SparseBackend, SparseGemmDesc};
pub use storage::CpuStorage;
pub use tensor::Tensor;
