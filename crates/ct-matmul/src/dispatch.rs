use ct_tensor::{
    Allocator, CompressedBuffer, DeviceExecutor, Element, GemmParams, SparseBackend,
    SparseGemmDesc, StridedBatch, Transpose,
};
use log::trace;

use crate::error::{MatMulError, Result};
use crate::plan::ContractionPlan;
use crate::prepack::SparsePrepackState;
use crate::strategy::BatchStrategy;

/// GEMM arguments for the executor's column-major convention.
///
/// Row-major `Y = op(L) * op(R)` is column-major `Y^T = op(R)^T * op(L)^T`,
/// so the right operand is passed as `A`, the left as `B`, M and N trade
/// places, and each transpose flag follows its operand.
fn swapped_params<T: Element>(plan: &ContractionPlan, alpha: T) -> GemmParams<T> {
    let dims = plan.dims();
    GemmParams {
        trans_a: Transpose::from_flag(dims.trans_b),
        trans_b: Transpose::from_flag(dims.trans_a),
        m: dims.n,
        n: dims.m,
        k: dims.k,
        alpha,
        lda: dims.ldb(),
        ldb: dims.lda(),
        beta: T::zero(),
        ldc: dims.ldc(),
    }
}

/// Runs `plan` on the dense executor with one submission (plus the offset
/// copies of an indexed batch).
pub(crate) fn dispatch_dense<T: Element>(
    executor: &dyn DeviceExecutor<T>,
    plan: &ContractionPlan,
    strategy: &BatchStrategy,
    alpha: T,
    left: &[T],
    right: &[T],
    out: &mut [T],
) -> Result<()> {
    let params = swapped_params(plan, alpha);
    trace!(
        "{}: gemm m={} n={} k={} as {:?}",
        executor.name(),
        params.m,
        params.n,
        params.k,
        strategy
    );
    match strategy {
        BatchStrategy::Single => executor.gemm(&params, right, left, out)?,
        BatchStrategy::StridedUniform(su) => {
            let batch = StridedBatch {
                stride_a: su.stride_right,
                stride_b: su.stride_left,
                stride_c: su.stride_out,
                batch_count: su.batch_count,
            };
            executor.gemm_strided_batched(&params, &batch, right, left, out)?
        }
        BatchStrategy::FullyIndexed => {
            // The copies are ordered before the batched call on the stream,
            // and the call cannot be made without their results.
            let right_offsets = executor.copy_offsets_to_device(plan.right_offsets())?;
            let left_offsets = executor.copy_offsets_to_device(plan.left_offsets())?;
            let output_offsets = executor.copy_offsets_to_device(plan.output_offsets())?;
            executor.gemm_batched(
                &params,
                right,
                &right_offsets,
                left,
                &left_offsets,
                out,
                &output_offsets,
            )?
        }
    }
    Ok(())
}

fn batch_slice<'a, T>(what: &str, data: &'a [T], offset: usize) -> Result<&'a [T]> {
    data.get(offset..).ok_or_else(|| {
        MatMulError::InvalidShape(format!(
            "{} offset {} is outside {} elements",
            what,
            offset,
            data.len()
        ))
    })
}

fn batch_slice_mut<'a, T>(offset: usize, data: &'a mut [T]) -> Result<&'a mut [T]> {
    let len = data.len();
    data.get_mut(offset..).ok_or_else(|| {
        MatMulError::InvalidShape(format!("output offset {} is outside {} elements", offset, len))
    })
}

fn ensure_covers<T: Element>(state: &SparsePrepackState<T>, plan: &ContractionPlan) -> Result<()> {
    if state.covers(plan.k(), plan.n()) {
        Ok(())
    } else {
        Err(MatMulError::InvalidShape(format!(
            "{}: prepacked weight is [{}x{}] but the multiply needs [{}x{}]",
            state.name(),
            state.k(),
            state.n(),
            plan.k(),
            plan.n()
        )))
    }
}

/// Runs `plan` against a prepacked 2:4 weight.
///
/// - `Single`: one multiply with the cached compressed weight.
/// - `StridedUniform` sharing the right matrix: the cached compressed
///   weight serves every batch; left and output advance.
/// - `StridedUniform` with a right stride: each batch's weight slice is
///   compressed into a scratch buffer right before its multiply.
/// - `FullyIndexed`: rejected with `UnsupportedSparseBatchShape`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn dispatch_sparse<T: Element>(
    sparse: &dyn SparseBackend<T>,
    allocator: &dyn Allocator<T>,
    state: &SparsePrepackState<T>,
    plan: &ContractionPlan,
    strategy: &BatchStrategy,
    alpha: T,
    left: &[T],
    out: &mut [T],
) -> Result<()> {
    let dims = plan.dims();
    let desc = SparseGemmDesc {
        m: dims.m,
        k: dims.k,
        n: dims.n,
        trans_a: dims.trans_a,
        trans_b: dims.trans_b,
    };
    let mut workspace = allocator.scratch_buffer(sparse.workspace_len(&desc)?)?;
    let beta = T::zero();

    match strategy {
        BatchStrategy::Single => {
            ensure_covers(state, plan)?;
            sparse.sparse_multiply(
                &desc,
                alpha,
                state.compressed(),
                left,
                beta,
                out,
                &mut workspace,
            )?;
        }
        BatchStrategy::StridedUniform(su) if su.shares_right() => {
            ensure_covers(state, plan)?;
            for i in 0..su.batch_count {
                trace!("sparse batch {}/{} (shared weight)", i + 1, su.batch_count);
                sparse.sparse_multiply(
                    &desc,
                    alpha,
                    state.compressed(),
                    batch_slice("left", left, i * su.stride_left)?,
                    beta,
                    batch_slice_mut(i * su.stride_out, out)?,
                    &mut workspace,
                )?;
            }
        }
        BatchStrategy::StridedUniform(su) => {
            let mut compressed = CompressedBuffer::<T>::zeroed(sparse.compressed_layout(&desc)?);
            let weight_len = desc.weight_len();
            for i in 0..su.batch_count {
                trace!("sparse batch {}/{} (per-batch weight)", i + 1, su.batch_count);
                let weight = batch_slice("right", state.dense(), i * su.stride_right)?;
                let weight = weight.get(..weight_len).ok_or_else(|| {
                    MatMulError::InvalidShape(format!(
                        "{}: batch {} weight needs {} elements, {} remain",
                        state.name(),
                        i,
                        weight_len,
                        weight.len()
                    ))
                })?;
                sparse.compress(&desc, weight, &mut compressed)?;
                sparse.sparse_multiply(
                    &desc,
                    alpha,
                    &compressed,
                    batch_slice("left", left, i * su.stride_left)?,
                    beta,
                    batch_slice_mut(i * su.stride_out, out)?,
                    &mut workspace,
                )?;
            }
        }
        BatchStrategy::FullyIndexed => {
            return Err(MatMulError::UnsupportedSparseBatchShape {
                batch_count: plan.batch_size(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MatMulDims;
    use crate::testing::CountingExecutor;
    use ct_tensor::Shape;

    fn plan(l: &[usize], r: &[usize], ta: bool, tb: bool) -> ContractionPlan {
        let dims =
            MatMulDims::compute(&Shape::from_slice(l), &Shape::from_slice(r), ta, tb).unwrap();
        ContractionPlan::build(dims).unwrap()
    }

    #[test]
    fn test_swapped_params() {
        let p = plan(&[4, 3], &[4, 2], true, false);
        let params = swapped_params(&p, 2.0f32);
        assert_eq!(params.trans_a, Transpose::No);
        assert_eq!(params.trans_b, Transpose::Yes);
        assert_eq!((params.m, params.n, params.k), (2, 3, 4));
        assert_eq!((params.lda, params.ldb, params.ldc), (2, 3, 2));
        assert_eq!(params.alpha, 2.0);
        assert_eq!(params.beta, 0.0);
    }

    #[test]
    fn test_single_issues_one_gemm() {
        let p = plan(&[1, 2], &[2, 1], false, false);
        let exec = CountingExecutor::new();
        let mut out = [0.0f32];
        let strategy = BatchStrategy::select(&p);
        dispatch_dense::<f32>(&exec, &p, &strategy, 1.0, &[1.0, 2.0], &[3.0, 4.0], &mut out)
            .unwrap();
        assert_eq!(out, [11.0]);
        assert_eq!(exec.gemm_calls(), 1);
        assert_eq!(exec.total_calls(), 1);
    }

    #[test]
    fn test_indexed_copies_offsets_first() {
        let p = plan(&[2, 1, 1, 1], &[3, 1, 1], false, false);
        let strategy = BatchStrategy::select(&p);
        assert_eq!(strategy, BatchStrategy::FullyIndexed);
        let exec = CountingExecutor::new();
        let mut out = [0.0f32; 6];
        dispatch_dense::<f32>(&exec, &p, &strategy, 1.0, &[1.0, 2.0], &[10.0, 20.0, 30.0], &mut out)
            .unwrap();
        assert_eq!(out, [10.0, 20.0, 30.0, 20.0, 40.0, 60.0]);
        assert_eq!(exec.offset_copies(), 3);
        assert_eq!(exec.batched_calls(), 1);
    }
}
