use log::debug;

use crate::plan::ContractionPlan;

/// Element strides of a batch whose offsets are arithmetic progressions.
///
/// The first offset of every sequence is 0, so `offset[i] == i * stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StridedUniform {
    pub stride_left: usize,
    pub stride_right: usize,
    pub stride_out: usize,
    pub batch_count: usize,
}

impl StridedUniform {
    /// The same right matrix serves every batch.
    ///
    /// Kept distinct from a nonzero stride: a shared weight can be
    /// transformed once, a strided one must be transformed per batch.
    pub fn shares_right(&self) -> bool {
        self.stride_right == 0
    }
}

/// How a plan is executed, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// One plain 2-D multiply.
    Single,
    /// One strided-batched multiply.
    StridedUniform(StridedUniform),
    /// One offset-indexed batched multiply with explicit per-batch offsets.
    FullyIndexed,
}

impl BatchStrategy {
    /// Picks the earliest applicable strategy for `plan`.
    ///
    /// - a batch of one is `Single`;
    /// - otherwise, if all three offset sequences advance by a constant
    ///   step, `StridedUniform`;
    /// - anything else is `FullyIndexed`, which handles every broadcast
    ///   pattern.
    ///
    /// Left operands of rank 3 or more against a 2-D right operand, or
    /// against a right operand with the same batch prefix, always take the
    /// strided path (stride 0 for the 2-D right). The mirror case, a 2-D
    /// left against a batched right (`[M, K] @ [B, K, N]`), is strided with
    /// left stride 0. So is any pattern where only one operand is broadcast
    /// along a single run of batch axes, such as `[1, M, K] @ [B, K, N]`.
    ///
    /// An empty batch is reported as `Single`; it is never dispatched.
    pub fn select(plan: &ContractionPlan) -> BatchStrategy {
        let batch_count = plan.batch_size();
        let strategy = if batch_count <= 1 {
            BatchStrategy::Single
        } else {
            match (
                uniform_stride(plan.left_offsets()),
                uniform_stride(plan.right_offsets()),
                uniform_stride(plan.output_offsets()),
            ) {
                (Some(stride_left), Some(stride_right), Some(stride_out)) => {
                    BatchStrategy::StridedUniform(StridedUniform {
                        stride_left,
                        stride_right,
                        stride_out,
                        batch_count,
                    })
                }
                _ => BatchStrategy::FullyIndexed,
            }
        };
        debug!("matmul strategy for {} batches: {:?}", batch_count, strategy);
        strategy
    }
}

/// The common step of an arithmetic progression starting at 0, if any.
fn uniform_stride(offsets: &[usize]) -> Option<usize> {
    if offsets.first() != Some(&0) {
        return None;
    }
    let step = match offsets.get(1) {
        Some(&second) => second,
        None => return Some(0),
    };
    offsets
        .windows(2)
        .all(|w| w[1].checked_sub(w[0]) == Some(step))
        .then_some(step)
}
