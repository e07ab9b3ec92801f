use ct_tensor::Shape;

use crate::error::{MatMulError, Result};

/// Contraction dimensions of one matmul call, resolved from the operand
/// shapes and transpose flags.
///
/// The left operand contributes `[.., M, K]` (stored `[.., K, M]` when
/// transposed) and the right operand `[.., K, N]` (stored `[.., N, K]`).
/// Everything before the trailing two dimensions is a batch prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatMulDims {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    /// Effective left transpose; always false for a 1-D left operand.
    pub trans_a: bool,
    /// Effective right transpose; always false for a 1-D right operand.
    pub trans_b: bool,
    pub left_batch: Vec<usize>,
    pub right_batch: Vec<usize>,
    /// The left operand was a vector promoted to `[1, K]`.
    left_vector: bool,
    /// The right operand was a vector promoted to `[K, 1]`.
    right_vector: bool,
}

impl MatMulDims {
    /// Resolves `(M, K, N)` and the batch prefixes of `left @ right`.
    ///
    /// A vector operand has no meaningful transpose, so its flag is
    /// ignored. A 1-D left operand is treated as a single row and a 1-D
    /// right operand as a single column; the promoted axis is dropped from
    /// the output shape again.
    ///
    /// # Errors
    /// `InvalidShape` if either operand is a scalar or the reduction
    /// dimensions disagree.
    pub fn compute(left: &Shape, right: &Shape, trans_a: bool, trans_b: bool) -> Result<Self> {
        if left.ndim() == 0 || right.ndim() == 0 {
            return Err(MatMulError::InvalidShape(format!(
                "matmul operands must have at least one dimension, got {} and {}",
                left, right
            )));
        }

        let left_vector = left.ndim() == 1;
        let right_vector = right.ndim() == 1;
        let trans_a = trans_a && !left_vector;
        let trans_b = trans_b && !right_vector;

        let left_dims: Vec<usize> = if left_vector {
            vec![1, left.dim(0)]
        } else {
            left.dims().to_vec()
        };
        let right_dims: Vec<usize> = if right_vector {
            vec![right.dim(0), 1]
        } else {
            right.dims().to_vec()
        };

        let (l_rows, l_cols) = trailing_pair(&left_dims);
        let (r_rows, r_cols) = trailing_pair(&right_dims);
        let (m, k) = if trans_a { (l_cols, l_rows) } else { (l_rows, l_cols) };
        let (k2, n) = if trans_b { (r_cols, r_rows) } else { (r_rows, r_cols) };

        if k != k2 {
            return Err(MatMulError::InvalidShape(format!(
                "reduction dimension mismatch: {} @ {} gives [{}x{}] @ [{}x{}]",
                left, right, m, k, k2, n
            )));
        }

        Ok(MatMulDims {
            m,
            k,
            n,
            trans_a,
            trans_b,
            left_batch: left_dims[..left_dims.len() - 2].to_vec(),
            right_batch: right_dims[..right_dims.len() - 2].to_vec(),
            left_vector,
            right_vector,
        })
    }

    /// Output shape for the given broadcast batch shape.
    pub fn output_shape(&self, batch_shape: &[usize]) -> Shape {
        let mut dims = batch_shape.to_vec();
        if !self.left_vector {
            dims.push(self.m);
        }
        if !self.right_vector {
            dims.push(self.n);
        }
        Shape::new(dims)
    }

    /// Row-major leading dimension of the left operand.
    pub fn lda(&self) -> usize {
        if self.trans_a {
            self.m
        } else {
            self.k
        }
    }

    /// Row-major leading dimension of the right operand.
    pub fn ldb(&self) -> usize {
        if self.trans_b {
            self.k
        } else {
            self.n
        }
    }

    /// Row-major leading dimension of the output.
    pub fn ldc(&self) -> usize {
        self.n
    }
}

fn trailing_pair(dims: &[usize]) -> (usize, usize) {
    (dims[dims.len() - 2], dims[dims.len() - 1])
}
