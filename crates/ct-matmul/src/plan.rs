use ct_tensor::{Shape, TensorError};
use log::debug;

use crate::broadcast::MatMulDims;
use crate::error::{MatMulError, Result};

/// Per-batch element offsets of one matmul invocation.
///
/// Built fresh for every call and read-only afterwards. The three offset
/// sequences always have one entry per logical batch, and that count is the
/// product of the broadcast batch dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractionPlan {
    dims: MatMulDims,
    batch_shape: Vec<usize>,
    left_offsets: Vec<usize>,
    right_offsets: Vec<usize>,
    output_offsets: Vec<usize>,
}

impl ContractionPlan {
    /// Broadcasts the batch prefixes of `dims` and expands them into
    /// left/right/output offsets.
    ///
    /// Batch prefixes are aligned on the right; missing leading dimensions
    /// count as 1. A size-1 dimension repeats, so it never advances its
    /// operand's offset. The output never broadcasts: its offsets are
    /// `b * M * N`.
    ///
    /// # Errors
    /// `BroadcastError` if a pair of batch dimensions differ and neither is 1.
    pub fn build(dims: MatMulDims) -> Result<Self> {
        let batch_shape = Shape::broadcast_shape(
            &Shape::from_slice(&dims.left_batch),
            &Shape::from_slice(&dims.right_batch),
        )
        .map_err(|e| match e {
            TensorError::BroadcastError { a, b } => MatMulError::BroadcastError { left: a, right: b },
            other => MatMulError::Tensor(other),
        })?
        .dims()
        .to_vec();

        let rank = batch_shape.len();
        let left_strides = broadcast_strides(&dims.left_batch, rank, dims.m * dims.k);
        let right_strides = broadcast_strides(&dims.right_batch, rank, dims.k * dims.n);
        let output_matrix = dims.m * dims.n;

        let batch_size: usize = batch_shape.iter().product();
        let mut left_offsets = Vec::with_capacity(batch_size);
        let mut right_offsets = Vec::with_capacity(batch_size);
        let mut output_offsets = Vec::with_capacity(batch_size);

        for b in 0..batch_size {
            let mut rem = b;
            let mut left = 0;
            let mut right = 0;
            for axis in (0..rank).rev() {
                let coord = rem % batch_shape[axis];
                rem /= batch_shape[axis];
                left += coord * left_strides[axis];
                right += coord * right_strides[axis];
            }
            left_offsets.push(left);
            right_offsets.push(right);
            output_offsets.push(b * output_matrix);
        }

        debug!(
            "matmul plan: M={} K={} N={} batch_shape={:?} batches={}",
            dims.m, dims.k, dims.n, batch_shape, batch_size
        );

        Ok(ContractionPlan {
            dims,
            batch_shape,
            left_offsets,
            right_offsets,
            output_offsets,
        })
    }

    pub fn dims(&self) -> &MatMulDims {
        &self.dims
    }

    pub fn m(&self) -> usize {
        self.dims.m
    }

    pub fn k(&self) -> usize {
        self.dims.k
    }

    pub fn n(&self) -> usize {
        self.dims.n
    }

    /// The broadcast batch shape (empty for a plain 2-D multiply).
    pub fn batch_shape(&self) -> &[usize] {
        &self.batch_shape
    }

    /// Number of logical batches.
    pub fn batch_size(&self) -> usize {
        self.output_offsets.len()
    }

    pub fn left_offsets(&self) -> &[usize] {
        &self.left_offsets
    }

    pub fn right_offsets(&self) -> &[usize] {
        &self.right_offsets
    }

    pub fn output_offsets(&self) -> &[usize] {
        &self.output_offsets
    }

    /// Shape of the tensor this plan writes.
    pub fn output_shape(&self) -> Shape {
        self.dims.output_shape(&self.batch_shape)
    }
}

/// Element stride of each broadcast batch axis for one operand.
///
/// `prefix` is right-aligned against `rank` axes; absent and size-1 axes
/// get stride 0.
fn broadcast_strides(prefix: &[usize], rank: usize, matrix_size: usize) -> Vec<usize> {
    let mut strides = vec![0; rank];
    let pad = rank - prefix.len();
    let mut step = matrix_size;
    for (i, &d) in prefix.iter().enumerate().rev() {
        if d != 1 {
            strides[pad + i] = step;
        }
        step *= d;
    }
    strides
}
