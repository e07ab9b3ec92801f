use std::fmt::Debug;

use crate::alloc::DeviceBuffer;
use crate::element::Element;
use crate::error::Result;

/// Describes a sparse-weight multiply in row-major terms:
/// `out[m, n] = op(dense)[m, k] * op(weight)[k, n]`.
///
/// The weight is the structured-sparse operand. With `trans_b` it is stored
/// as `[n, k]`, otherwise as `[k, n]`. With `trans_a` the dense operand is
/// stored as `[k, m]`, otherwise as `[m, k]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseGemmDesc {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub trans_a: bool,
    pub trans_b: bool,
}

impl SparseGemmDesc {
    /// Number of weight elements described.
    pub fn weight_len(&self) -> usize {
        self.k * self.n
    }
}

/// Sizes of a compressed buffer, as chosen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedLayout {
    pub values: usize,
    pub metadata: usize,
}

/// A weight in the backend's packed 2:4 representation: the kept values
/// plus per-value position metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedBuffer<T> {
    values: Vec<T>,
    metadata: Vec<u8>,
}

impl<T: Element> CompressedBuffer<T> {
    pub fn zeroed(layout: CompressedLayout) -> Self {
        CompressedBuffer {
            values: vec![T::zero(); layout.values],
            metadata: vec![0; layout.metadata],
        }
    }

    pub fn layout(&self) -> CompressedLayout {
        CompressedLayout {
            values: self.values.len(),
            metadata: self.metadata.len(),
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// Mutable views of both parts, for backends filling the buffer.
    pub fn parts_mut(&mut self) -> (&mut [T], &mut [u8]) {
        (&mut self.values, &mut self.metadata)
    }
}

/// Structured-sparse (2:4) multiply interface.
pub trait SparseBackend<T: Element>: Send + Sync + Debug {
    /// Returns the name of this backend.
    fn name(&self) -> &str;

    /// Whether the device supports the structured-sparse instruction set.
    fn is_available(&self) -> bool;

    /// Checks that `weight` follows the 2:4 pattern along the reduction
    /// axis of `desc`. `Ok(false)` means the data does not conform.
    fn validate_structured_sparsity(
        &self,
        desc: &SparseGemmDesc,
        weight: &DeviceBuffer<T>,
    ) -> Result<bool>;

    /// Buffer sizes `compress` needs for `desc`.
    fn compressed_layout(&self, desc: &SparseGemmDesc) -> Result<CompressedLayout>;

    /// Packs `weight` (`desc.weight_len()` elements) into `out`.
    fn compress(
        &self,
        desc: &SparseGemmDesc,
        weight: &[T],
        out: &mut CompressedBuffer<T>,
    ) -> Result<()>;

    /// Workspace elements `sparse_multiply` needs for `desc`.
    fn workspace_len(&self, desc: &SparseGemmDesc) -> Result<usize>;

    /// `out = alpha * op(dense) * op(weight) + beta * out`, with the weight
    /// taken from `compressed`.
    #[allow(clippy::too_many_arguments)]
    fn sparse_multiply(
        &self,
        desc: &SparseGemmDesc,
        alpha: T,
        compressed: &CompressedBuffer<T>,
        dense: &[T],
        beta: T,
        out: &mut [T],
        workspace: &mut DeviceBuffer<T>,
    ) -> Result<()>;
}
