use ct_tensor::{Allocator, DeviceExecutor, Element, SparseBackend, Tensor};
use log::debug;

use crate::broadcast::MatMulDims;
use crate::config::{MatMulConfig, NodeAttributes, PrepackParam};
use crate::dispatch::{dispatch_dense, dispatch_sparse};
use crate::error::{MatMulError, Result};
use crate::plan::ContractionPlan;
use crate::prepack::SparseWeightCache;
use crate::strategy::BatchStrategy;

/// Device collaborators a multiply runs against.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a, T: Element> {
    pub executor: &'a dyn DeviceExecutor<T>,
    pub allocator: &'a dyn Allocator<T>,
    /// Required only when the operator holds a prepacked sparse weight.
    pub sparse: Option<&'a dyn SparseBackend<T>>,
}

impl<'a, T: Element> ExecutionContext<'a, T> {
    pub fn new(executor: &'a dyn DeviceExecutor<T>, allocator: &'a dyn Allocator<T>) -> Self {
        ExecutionContext {
            executor,
            allocator,
            sparse: None,
        }
    }

    pub fn with_sparse(mut self, sparse: &'a dyn SparseBackend<T>) -> Self {
        self.sparse = Some(sparse);
        self
    }
}

/// Batched matrix multiply operator over `T` elements.
///
/// One instance serves one graph node. The optional sparse weight is
/// prepacked once through `&mut self`; `compute` takes `&self` and may run
/// concurrently afterwards.
#[derive(Debug)]
pub struct MatMul<T: Element> {
    config: MatMulConfig,
    sparse_weight: SparseWeightCache<T>,
}

impl<T: Element> MatMul<T> {
    pub fn new(config: MatMulConfig) -> Self {
        MatMul {
            config,
            sparse_weight: SparseWeightCache::new(),
        }
    }

    /// Builds the operator from node attributes (`alpha`, `transA`, `transB`).
    pub fn from_attributes(attrs: &NodeAttributes) -> Result<Self> {
        Ok(Self::new(MatMulConfig::from_attributes(attrs)?))
    }

    pub fn config(&self) -> &MatMulConfig {
        &self.config
    }

    /// Offers a constant operand for 2:4 sparse prepacking.
    ///
    /// See [`SparseWeightCache::prepack`]. A `SparsityValidation` error
    /// leaves the operator fully usable on the dense path.
    pub fn prepack(
        &mut self,
        weight: &Tensor,
        param: &PrepackParam,
        sparse: &dyn SparseBackend<T>,
        allocator: &dyn Allocator<T>,
    ) -> Result<bool> {
        self.sparse_weight
            .prepack(weight, param, self.config.trans_b, sparse, allocator)
    }

    pub fn is_prepacked(&self) -> bool {
        self.sparse_weight.is_packed()
    }

    /// Computes `alpha * op(left) @ op(right)` with NumPy batch broadcasting.
    ///
    /// With a prepacked weight, `right` must have the prepacked shape and is
    /// not read; the cached weight is used instead.
    ///
    /// # Errors
    /// - `DTypeMismatch` if an operand is not `T`.
    /// - `InvalidShape` / `BroadcastError` for incompatible operands.
    /// - `MissingSparseBackend` if a weight is prepacked but `ctx` carries
    ///   no sparse backend.
    /// - `UnsupportedSparseBatchShape` for a prepacked weight under an
    ///   irregular broadcast.
    /// - Backend failures, verbatim.
    pub fn compute(
        &self,
        left: &Tensor,
        right: &Tensor,
        ctx: &ExecutionContext<'_, T>,
    ) -> Result<Tensor> {
        for operand in [left, right] {
            if operand.dtype() != T::DTYPE {
                return Err(MatMulError::DTypeMismatch {
                    expected: T::DTYPE.to_string(),
                    got: operand.dtype().to_string(),
                });
            }
        }

        let dims = MatMulDims::compute(
            left.shape(),
            right.shape(),
            self.config.trans_a,
            self.config.trans_b,
        )?;
        let plan = ContractionPlan::build(dims)?;
        let mut output = Tensor::zeros(T::DTYPE, plan.output_shape());

        if output.shape().numel() == 0 || plan.k() == 0 {
            debug!(
                "matmul {} @ {}: nothing to reduce, output {} stays zero",
                left.shape(),
                right.shape(),
                output.shape()
            );
            return Ok(output);
        }

        let strategy = BatchStrategy::select(&plan);
        let alpha = T::from_f32(self.config.alpha);
        let left_data = left.data::<T>()?;

        match self.sparse_weight.state() {
            Some(state) => {
                if right.shape() != state.shape() {
                    return Err(MatMulError::InvalidShape(format!(
                        "{}: right operand {} differs from the prepacked weight {}",
                        state.name(),
                        right.shape(),
                        state.shape()
                    )));
                }
                let sparse = ctx.sparse.ok_or(MatMulError::MissingSparseBackend)?;
                dispatch_sparse(
                    sparse,
                    ctx.allocator,
                    state,
                    &plan,
                    &strategy,
                    alpha,
                    left_data,
                    output.data_mut::<T>()?,
                )?;
            }
            None => dispatch_dense(
                ctx.executor,
                &plan,
                &strategy,
                alpha,
                left_data,
                right.data::<T>()?,
                output.data_mut::<T>()?,
            )?,
        }
        Ok(output)
    }
}
