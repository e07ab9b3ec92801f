use log::debug;

use crate::alloc::DeviceBuffer;
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::sparse::{CompressedBuffer, CompressedLayout, SparseBackend, SparseGemmDesc};

/// Elements per structured-sparsity group along the reduction axis.
pub const GROUP: usize = 4;
/// Nonzeros allowed per group.
pub const KEPT: usize = 2;

/// Host reference implementation of the 2:4 structured-sparse backend.
///
/// Groups are four consecutive reduction-axis (k) elements of one weight
/// column. The packed form stores, per column and group, two values and
/// their positions inside the group (one metadata byte per value).
#[derive(Debug, Clone)]
pub struct CpuSparseBackend {
    available: bool,
}

impl CpuSparseBackend {
    pub fn new() -> Self {
        CpuSparseBackend { available: true }
    }

    /// A backend reporting that the device lacks structured-sparse support.
    pub fn unavailable() -> Self {
        CpuSparseBackend { available: false }
    }
}

impl Default for CpuSparseBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Weight element at logical `(p, j)` of a `[k, n]` matrix.
fn weight_at<T: Element>(desc: &SparseGemmDesc, weight: &[T], p: usize, j: usize) -> T {
    if desc.trans_b {
        weight[j * desc.k + p]
    } else {
        weight[p * desc.n + j]
    }
}

fn check_weight_len(op: &'static str, desc: &SparseGemmDesc, len: usize) -> Result<()> {
    if len < desc.weight_len() {
        return Err(TensorError::backend(
            op,
            format!("weight has {} elements, needs {}", len, desc.weight_len()),
        ));
    }
    Ok(())
}

impl<T: Element> SparseBackend<T> for CpuSparseBackend {
    fn name(&self) -> &str {
        "cpu-2:4"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn validate_structured_sparsity(
        &self,
        desc: &SparseGemmDesc,
        weight: &DeviceBuffer<T>,
    ) -> Result<bool> {
        check_weight_len("sparsity check", desc, weight.len())?;
        if desc.k % GROUP != 0 {
            debug!("2:4 check: reduction length {} is not a multiple of {}", desc.k, GROUP);
            return Ok(false);
        }
        for j in 0..desc.n {
            for g in 0..desc.k / GROUP {
                let nonzeros = (0..GROUP)
                    .filter(|&i| !weight_at(desc, weight, g * GROUP + i, j).is_zero())
                    .count();
                if nonzeros > KEPT {
                    debug!("2:4 check: column {} group {} has {} nonzeros", j, g, nonzeros);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn compressed_layout(&self, desc: &SparseGemmDesc) -> Result<CompressedLayout> {
        if desc.k % GROUP != 0 {
            return Err(TensorError::backend(
                "sparse compress",
                format!("reduction length {} is not a multiple of {}", desc.k, GROUP),
            ));
        }
        let kept = desc.n * (desc.k / GROUP) * KEPT;
        Ok(CompressedLayout {
            values: kept,
            metadata: kept,
        })
    }

    fn compress(
        &self,
        desc: &SparseGemmDesc,
        weight: &[T],
        out: &mut CompressedBuffer<T>,
    ) -> Result<()> {
        check_weight_len("sparse compress", desc, weight.len())?;
        let layout = <Self as SparseBackend<T>>::compressed_layout(self, desc)?;
        if out.layout() != layout {
            return Err(TensorError::backend(
                "sparse compress",
                format!("output buffer {:?} does not match {:?}", out.layout(), layout),
            ));
        }

        let groups = desc.k / GROUP;
        let (values, metadata) = out.parts_mut();
        for j in 0..desc.n {
            for g in 0..groups {
                let base = (j * groups + g) * KEPT;
                let mut slot = 0;
                for i in 0..GROUP {
                    let v = weight_at(desc, weight, g * GROUP + i, j);
                    if v.is_zero() {
                        continue;
                    }
                    if slot == KEPT {
                        return Err(TensorError::backend(
                            "sparse compress",
                            format!("column {} group {} has more than {} nonzeros", j, g, KEPT),
                        ));
                    }
                    values[base + slot] = v;
                    metadata[base + slot] = i as u8;
                    slot += 1;
                }
                for s in slot..KEPT {
                    values[base + s] = T::zero();
                    metadata[base + s] = 0;
                }
            }
        }
        Ok(())
    }

    fn workspace_len(&self, desc: &SparseGemmDesc) -> Result<usize> {
        Ok(desc.n)
    }

    fn sparse_multiply(
        &self,
        desc: &SparseGemmDesc,
        alpha: T,
        compressed: &CompressedBuffer<T>,
        dense: &[T],
        beta: T,
        out: &mut [T],
        workspace: &mut DeviceBuffer<T>,
    ) -> Result<()> {
        let layout = <Self as SparseBackend<T>>::compressed_layout(self, desc)?;
        if compressed.layout() != layout {
            return Err(TensorError::backend(
                "sparse multiply",
                format!("compressed buffer {:?} does not match {:?}", compressed.layout(), layout),
            ));
        }
        let (m, k, n) = (desc.m, desc.k, desc.n);
        if dense.len() < m * k || out.len() < m * n || workspace.len() < n {
            return Err(TensorError::backend(
                "sparse multiply",
                format!(
                    "buffers too small for [{}x{}] @ [{}x{}]: dense={}, out={}, workspace={}",
                    m,
                    k,
                    k,
                    n,
                    dense.len(),
                    out.len(),
                    workspace.len()
                ),
            ));
        }

        let dense_at = |i: usize, p: usize| {
            if desc.trans_a {
                dense[p * m + i]
            } else {
                dense[i * k + p]
            }
        };
        let groups = k / GROUP;
        let values = compressed.values();
        let metadata = compressed.metadata();
        let alpha = alpha.to_f64();
        let beta = beta.to_f64();

        for i in 0..m {
            // Stage the scaled row in the workspace before merging into `out`.
            for j in 0..n {
                let mut acc = 0.0f64;
                for g in 0..groups {
                    let base = (j * groups + g) * KEPT;
                    for s in 0..KEPT {
                        let p = g * GROUP + metadata[base + s] as usize;
                        acc += values[base + s].to_f64() * dense_at(i, p).to_f64();
                    }
                }
                workspace[j] = T::from_f64(alpha * acc);
            }
            for j in 0..n {
                let dst = &mut out[i * n + j];
                let prior = if beta == 0.0 { 0.0 } else { beta * dst.to_f64() };
                *dst = T::from_f64(workspace[j].to_f64() + prior);
            }
        }
        Ok(())
    }
}
