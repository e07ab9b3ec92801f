use std::fmt::Debug;

use crate::element::Element;
use crate::error::Result;

/// Operand transposition as understood by a column-major GEMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

impl Transpose {
    pub fn from_flag(transposed: bool) -> Self {
        if transposed {
            Transpose::Yes
        } else {
            Transpose::No
        }
    }
}

/// Arguments shared by every GEMM call shape, in column-major (BLAS) terms:
/// `C[m, n] = alpha * op(A)[m, k] * op(B)[k, n] + beta * C`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmParams<T> {
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: T,
    pub lda: usize,
    pub ldb: usize,
    pub beta: T,
    pub ldc: usize,
}

/// Per-operand element strides for a uniformly strided batched GEMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StridedBatch {
    pub stride_a: usize,
    pub stride_b: usize,
    pub stride_c: usize,
    pub batch_count: usize,
}

/// Per-batch element offsets that have been transferred to the executor.
///
/// The only way to obtain one is [`DeviceExecutor::copy_offsets_to_device`],
/// so an indexed batched call can never be issued before its offset arrays
/// are visible on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOffsets {
    offsets: Vec<usize>,
}

impl DeviceOffsets {
    /// Wraps offsets whose host-to-device copy has completed. Intended for
    /// `DeviceExecutor` implementations only.
    pub fn transferred(offsets: Vec<usize>) -> Self {
        DeviceOffsets { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.offsets
    }
}

/// Dense GEMM submission interface of a device.
///
/// All submissions made through one executor land on a single ordered
/// stream. Each method reports only whether the submission was accepted;
/// a rejected submission is returned as `TensorError::Backend` and is
/// never retried by callers.
pub trait DeviceExecutor<T: Element>: Send + Sync + Debug {
    /// Returns the name of this executor (e.g., "cpu").
    fn name(&self) -> &str;

    /// Single GEMM. `a`, `b` and `c` start at the first element of each matrix.
    fn gemm(&self, params: &GemmParams<T>, a: &[T], b: &[T], c: &mut [T]) -> Result<()>;

    /// `batch.batch_count` GEMMs, the i-th reading `a[i * stride_a..]`,
    /// `b[i * stride_b..]` and writing `c[i * stride_c..]`.
    fn gemm_strided_batched(
        &self,
        params: &GemmParams<T>,
        batch: &StridedBatch,
        a: &[T],
        b: &[T],
        c: &mut [T],
    ) -> Result<()>;

    /// Copies host offsets into executor-visible memory, ordered before any
    /// later submission on the same stream.
    fn copy_offsets_to_device(&self, host: &[usize]) -> Result<DeviceOffsets>;

    /// One GEMM per entry of the offset arrays; all three must have the
    /// same length.
    #[allow(clippy::too_many_arguments)]
    fn gemm_batched(
        &self,
        params: &GemmParams<T>,
        a: &[T],
        a_offsets: &DeviceOffsets,
        b: &[T],
        b_offsets: &DeviceOffsets,
        c: &mut [T],
        c_offsets: &DeviceOffsets,
    ) -> Result<()>;
}
