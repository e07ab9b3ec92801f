//! One-time 2:4 compression of a constant right-hand weight.
//!
//! A weight offered for prepack is flattened to 2-D, copied to the device,
//! checked against the structured-sparsity pattern and compressed. The
//! result lives in a [`SparseWeightCache`] owned by the operator and is
//! reused by every later multiply; it is never validated or compressed
//! again.
//!
//! The cache is written through `&mut self` and read through `&self`, so
//! callers that share an operator across threads must finish prepack before
//! sharing it.

use ct_tensor::{
    Allocator, CompressedBuffer, DeviceBuffer, Element, Shape, SparseBackend, SparseGemmDesc,
    Tensor,
};
use log::{debug, info, warn};

use crate::config::PrepackParam;
use crate::error::{MatMulError, Result};

/// Left-operand rows of the descriptor used only for the sparsity check.
const VALIDATION_ROWS: usize = 2;

/// Reduction-axis elements per 2:4 group.
const SPARSE_GROUP: usize = 4;

/// A validated, compressed constant weight.
#[derive(Debug)]
pub struct SparsePrepackState<T: Element> {
    name: String,
    shape: Shape,
    k: usize,
    n: usize,
    trans_b: bool,
    dense: DeviceBuffer<T>,
    compressed: CompressedBuffer<T>,
}

impl<T: Element> SparsePrepackState<T> {
    /// Initializer name the state was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical shape of the weight before flattening.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Reduction length of the flattened weight.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Output columns of the flattened weight.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn trans_b(&self) -> bool {
        self.trans_b
    }

    /// Device copy of the uncompressed weight.
    pub fn dense(&self) -> &DeviceBuffer<T> {
        &self.dense
    }

    /// The weight in the backend's packed form.
    pub fn compressed(&self) -> &CompressedBuffer<T> {
        &self.compressed
    }

    /// Whether the compressed buffer describes a `[k, n]` contraction.
    pub fn covers(&self, k: usize, n: usize) -> bool {
        self.k == k && self.n == n
    }
}

/// Flattens a weight to `(k, n)`: all leading dimensions fold into the
/// stored rows, the last dimension is the stored columns. A 1-D weight is a
/// single column. With `trans_b` the stored matrix is `[n, k]`.
fn flatten(shape: &Shape, trans_b: bool) -> (usize, usize, bool) {
    if shape.ndim() < 2 {
        return (shape.numel(), 1, false);
    }
    let rows = shape.size_to_dimension(shape.ndim() - 1);
    let cols = shape.dim(shape.ndim() - 1);
    if trans_b {
        (cols, rows, true)
    } else {
        (rows, cols, false)
    }
}

/// Reduction length of one matrix of a batched weight, or `None` for a
/// weight of rank 2 or less.
///
/// Flattening folds the batch axes into the stored rows, so without
/// `trans_b` the groups of the flattened matrix would run across matrix
/// boundaries unless each matrix's K is a whole number of groups.
fn per_matrix_k(shape: &Shape, trans_b: bool) -> Option<usize> {
    let ndim = shape.ndim();
    if ndim < 3 {
        return None;
    }
    Some(if trans_b {
        shape.dim(ndim - 1)
    } else {
        shape.dim(ndim - 2)
    })
}

/// Write-once holder of a [`SparsePrepackState`].
#[derive(Debug)]
pub struct SparseWeightCache<T: Element> {
    state: Option<SparsePrepackState<T>>,
}

impl<T: Element> Default for SparseWeightCache<T> {
    fn default() -> Self {
        SparseWeightCache { state: None }
    }
}

impl<T: Element> SparseWeightCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&SparsePrepackState<T>> {
        self.state.as_ref()
    }

    pub fn is_packed(&self) -> bool {
        self.state.is_some()
    }

    /// Validates and compresses `weight` if it is eligible.
    ///
    /// Returns `Ok(true)` when the weight is (or already was) packed and
    /// `Ok(false)` when it is not eligible: not the right operand, not
    /// flagged as 2:4, or the device lacks structured-sparse support.
    ///
    /// # Errors
    /// - `DTypeMismatch` if the weight is not `T`.
    /// - `SparsityValidation` if the data is not 2:4 sparse, or if a batched
    ///   weight's per-matrix K is not a multiple of 4; the cache stays empty
    ///   and the weight is used densely.
    /// - Backend failures from the copy or compression, verbatim.
    pub fn prepack(
        &mut self,
        weight: &Tensor,
        param: &PrepackParam,
        trans_b: bool,
        sparse: &dyn SparseBackend<T>,
        allocator: &dyn Allocator<T>,
    ) -> Result<bool> {
        if !param.is_sparse_weight() {
            return Ok(false);
        }
        if self.state.is_some() {
            debug!("{}: prepacked weight already cached", param.name);
            return Ok(true);
        }
        if !sparse.is_available() {
            warn!(
                "{}: {} reports no structured-sparse support, keeping the weight dense",
                param.name,
                sparse.name()
            );
            return Ok(false);
        }
        if weight.dtype() != T::DTYPE {
            return Err(MatMulError::DTypeMismatch {
                expected: T::DTYPE.to_string(),
                got: weight.dtype().to_string(),
            });
        }

        if let Some(matrix_k) = per_matrix_k(weight.shape(), trans_b) {
            if matrix_k % SPARSE_GROUP != 0 {
                warn!(
                    "{}: weight {} has reduction length {} per matrix, not a multiple of {}; \
                     falling back to dense matmul",
                    param.name,
                    weight.shape(),
                    matrix_k,
                    SPARSE_GROUP
                );
                return Err(MatMulError::SparsityValidation {
                    name: param.name.clone(),
                });
            }
        }

        let (k, n, trans_b) = flatten(weight.shape(), trans_b);
        let desc = SparseGemmDesc {
            m: VALIDATION_ROWS,
            k,
            n,
            trans_a: false,
            trans_b,
        };

        let dense = allocator.copy_to_device(weight.data::<T>()?)?;
        if !sparse.validate_structured_sparsity(&desc, &dense)? {
            warn!(
                "{}: weight {} is not 2:4 structured sparse, falling back to dense matmul",
                param.name,
                weight.shape()
            );
            return Err(MatMulError::SparsityValidation {
                name: param.name.clone(),
            });
        }

        let mut compressed = CompressedBuffer::<T>::zeroed(sparse.compressed_layout(&desc)?);
        sparse.compress(&desc, &dense, &mut compressed)?;

        info!(
            "{}: prepacked {} weight {} as [{}x{}] 2:4 sparse",
            param.name,
            T::DTYPE,
            weight.shape(),
            k,
            n
        );
        self.state = Some(SparsePrepackState {
            name: param.name.clone(),
            shape: weight.shape().clone(),
            k,
            n,
            trans_b,
            dense,
            compressed,
        });
        Ok(true)
    }
}
