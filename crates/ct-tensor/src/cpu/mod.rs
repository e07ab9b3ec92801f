pub mod gemm;
pub mod sparse;

use crate::backend::{DeviceExecutor, DeviceOffsets, GemmParams, StridedBatch};
use crate::element::Element;
use crate::error::{Result, TensorError};

pub use sparse::CpuSparseBackend;

/// Pure-Rust CPU executor.
///
/// Runs column-major GEMMs on host slices with straightforward loops,
/// optimized for correctness rather than peak performance. Every
/// submission completes before it returns, so stream order is trivially
/// preserved. Intended as a reference implementation and fallback.
#[derive(Debug, Clone)]
pub struct CpuExecutor;

impl CpuExecutor {
    pub fn new() -> Self {
        CpuExecutor
    }
}

impl Default for CpuExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn tail<'a, T>(op: &'static str, data: &'a [T], offset: usize) -> Result<&'a [T]> {
    data.get(offset..).ok_or_else(|| {
        TensorError::backend(op, format!("offset {} past end of {} elements", offset, data.len()))
    })
}

fn tail_mut<'a, T>(op: &'static str, data: &'a mut [T], offset: usize) -> Result<&'a mut [T]> {
    let len = data.len();
    data.get_mut(offset..).ok_or_else(|| {
        TensorError::backend(op, format!("offset {} past end of {} elements", offset, len))
    })
}

impl<T: Element> DeviceExecutor<T> for CpuExecutor {
    fn name(&self) -> &str {
        "cpu"
    }

    fn gemm(&self, params: &GemmParams<T>, a: &[T], b: &[T], c: &mut [T]) -> Result<()> {
        gemm::gemm(params, a, b, c)
    }

    fn gemm_strided_batched(
        &self,
        params: &GemmParams<T>,
        batch: &StridedBatch,
        a: &[T],
        b: &[T],
        c: &mut [T],
    ) -> Result<()> {
        const OP: &str = "gemm_strided_batched";
        for i in 0..batch.batch_count {
            let a_i = tail(OP, a, i * batch.stride_a)?;
            let b_i = tail(OP, b, i * batch.stride_b)?;
            let c_i = tail_mut(OP, c, i * batch.stride_c)?;
            gemm::gemm(params, a_i, b_i, c_i)?;
        }
        Ok(())
    }

    fn copy_offsets_to_device(&self, host: &[usize]) -> Result<DeviceOffsets> {
        Ok(DeviceOffsets::transferred(host.to_vec()))
    }

    fn gemm_batched(
        &self,
        params: &GemmParams<T>,
        a: &[T],
        a_offsets: &DeviceOffsets,
        b: &[T],
        b_offsets: &DeviceOffsets,
        c: &mut [T],
        c_offsets: &DeviceOffsets,
    ) -> Result<()> {
        const OP: &str = "gemm_batched";
        if a_offsets.len() != c_offsets.len() || b_offsets.len() != c_offsets.len() {
            return Err(TensorError::backend(
                OP,
                format!(
                    "offset arrays differ in length: a={}, b={}, c={}",
                    a_offsets.len(),
                    b_offsets.len(),
                    c_offsets.len()
                ),
            ));
        }
        let triples = a_offsets
            .as_slice()
            .iter()
            .zip(b_offsets.as_slice())
            .zip(c_offsets.as_slice());
        for ((&ao, &bo), &co) in triples {
            gemm::gemm(params, tail(OP, a, ao)?, tail(OP, b, bo)?, tail_mut(OP, c, co)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Transpose;

    fn executor() -> CpuExecutor {
        CpuExecutor::new()
    }

    fn upload(e: &CpuExecutor, host: &[usize]) -> DeviceOffsets {
        DeviceExecutor::<f32>::copy_offsets_to_device(e, host).unwrap()
    }

    fn square(n: usize) -> GemmParams<f32> {
        GemmParams {
            trans_a: Transpose::No,
            trans_b: Transpose::No,
            m: n,
            n,
            k: n,
            alpha: 1.0,
            lda: n,
            ldb: n,
            beta: 0.0,
            ldc: n,
        }
    }

    #[test]
    fn test_gemm_identity() {
        let e = executor();
        let a = [1.0, 0.0, 0.0, 1.0];
        let x = [1.0, 2.0, 3.0, 4.0];
        let mut c = [0.0f32; 4];
        e.gemm(&square(2), &a, &x, &mut c).unwrap();
        assert_eq!(c, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_strided_batched_zero_stride_b() {
        let e = executor();
        let a = [2.0, 3.0];
        let b = [10.0];
        let mut c = [0.0f32; 2];
        let batch = StridedBatch {
            stride_a: 1,
            stride_b: 0,
            stride_c: 1,
            batch_count: 2,
        };
        e.gemm_strided_batched(&square(1), &batch, &a, &b, &mut c).unwrap();
        assert_eq!(c, [20.0, 30.0]);
    }

    #[test]
    fn test_gemm_batched_offsets() {
        let e = executor();
        let a = [2.0, 3.0];
        let b = [5.0, 7.0];
        let mut c = [0.0f32; 2];
        let ao = upload(&e, &[1, 0]);
        let bo = upload(&e, &[0, 1]);
        let co = upload(&e, &[0, 1]);
        e.gemm_batched(&square(1), &a, &ao, &b, &bo, &mut c, &co).unwrap();
        assert_eq!(c, [15.0, 14.0]);
    }

    #[test]
    fn test_gemm_batched_length_mismatch() {
        let e = executor();
        let mut c = [0.0f32; 2];
        let ao = upload(&e, &[0]);
        let co = upload(&e, &[0, 1]);
        let err = e.gemm_batched(&square(1), &[1.0], &ao, &[1.0], &co, &mut c, &co);
        assert!(matches!(err, Err(TensorError::Backend { .. })));
    }

    #[test]
    fn test_strided_batched_offset_past_end() {
        let e = executor();
        let mut c = [0.0f32; 1];
        let batch = StridedBatch {
            stride_a: 1,
            stride_b: 0,
            stride_c: 5,
            batch_count: 2,
        };
        assert!(e
            .gemm_strided_batched(&square(1), &batch, &[1.0, 1.0], &[1.0], &mut c)
            .is_err());
    }
}
