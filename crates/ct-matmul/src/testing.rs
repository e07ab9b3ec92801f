//! Call-counting wrappers around the reference collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};

use ct_tensor::{
    CompressedBuffer, CompressedLayout, CpuExecutor, DeviceBuffer, DeviceExecutor, DeviceOffsets,
    Element, GemmParams, Result, SparseBackend, SparseGemmDesc, StridedBatch, TensorError,
};

#[derive(Debug, Default)]
pub struct CountingExecutor {
    inner: CpuExecutor,
    reject: bool,
    gemm: AtomicUsize,
    strided: AtomicUsize,
    batched: AtomicUsize,
    copies: AtomicUsize,
}

impl CountingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every submission and rejects it.
    pub fn rejecting() -> Self {
        CountingExecutor {
            reject: true,
            ..Self::default()
        }
    }

    fn admit(&self, op: &'static str) -> Result<()> {
        if self.reject {
            Err(TensorError::backend(op, "stream rejected the submission"))
        } else {
            Ok(())
        }
    }

    pub fn gemm_calls(&self) -> usize {
        self.gemm.load(Ordering::SeqCst)
    }

    pub fn strided_calls(&self) -> usize {
        self.strided.load(Ordering::SeqCst)
    }

    pub fn batched_calls(&self) -> usize {
        self.batched.load(Ordering::SeqCst)
    }

    pub fn offset_copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.gemm_calls() + self.strided_calls() + self.batched_calls() + self.offset_copies()
    }
}

impl<T: Element> DeviceExecutor<T> for CountingExecutor {
    fn name(&self) -> &str {
        "counting"
    }

    fn gemm(&self, params: &GemmParams<T>, a: &[T], b: &[T], c: &mut [T]) -> Result<()> {
        self.gemm.fetch_add(1, Ordering::SeqCst);
        self.admit("gemm")?;
        self.inner.gemm(params, a, b, c)
    }

    fn gemm_strided_batched(
        &self,
        params: &GemmParams<T>,
        batch: &StridedBatch,
        a: &[T],
        b: &[T],
        c: &mut [T],
    ) -> Result<()> {
        self.strided.fetch_add(1, Ordering::SeqCst);
        self.admit("gemm_strided_batched")?;
        self.inner.gemm_strided_batched(params, batch, a, b, c)
    }

    fn copy_offsets_to_device(&self, host: &[usize]) -> Result<DeviceOffsets> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        self.admit("copy_offsets_to_device")?;
        DeviceExecutor::<T>::copy_offsets_to_device(&self.inner, host)
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
        self.batched.fetch_add(1, Ordering::SeqCst);
        self.admit("gemm_batched")?;
        self.inner
            .gemm_batched(params, a, a_offsets, b, b_offsets, c, c_offsets)
    }
}

#[derive(Debug)]
pub struct CountingSparse<S> {
    inner: S,
    reject_multiply: bool,
    validations: AtomicUsize,
    compressions: AtomicUsize,
    multiplies: AtomicUsize,
}

impl<S> CountingSparse<S> {
    pub fn new(inner: S) -> Self {
        CountingSparse {
            inner,
            reject_multiply: false,
            validations: AtomicUsize::new(0),
            compressions: AtomicUsize::new(0),
            multiplies: AtomicUsize::new(0),
        }
    }

    /// Validates and compresses through `inner` but rejects every multiply.
    pub fn rejecting_multiply(inner: S) -> Self {
        CountingSparse {
            reject_multiply: true,
            ..Self::new(inner)
        }
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn compressions(&self) -> usize {
        self.compressions.load(Ordering::SeqCst)
    }

    pub fn multiplies(&self) -> usize {
        self.multiplies.load(Ordering::SeqCst)
    }
}

impl<T: Element, S: SparseBackend<T>> SparseBackend<T> for CountingSparse<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn validate_structured_sparsity(
        &self,
        desc: &SparseGemmDesc,
        weight: &DeviceBuffer<T>,
    ) -> Result<bool> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.inner.validate_structured_sparsity(desc, weight)
    }

    fn compressed_layout(&self, desc: &SparseGemmDesc) -> Result<CompressedLayout> {
        self.inner.compressed_layout(desc)
    }

    fn compress(
        &self,
        desc: &SparseGemmDesc,
        weight: &[T],
        out: &mut CompressedBuffer<T>,
    ) -> Result<()> {
        self.compressions.fetch_add(1, Ordering::SeqCst);
        self.inner.compress(desc, weight, out)
    }

    fn workspace_len(&self, desc: &SparseGemmDesc) -> Result<usize> {
        self.inner.workspace_len(desc)
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
        self.multiplies.fetch_add(1, Ordering::SeqCst);
        if self.reject_multiply {
            return Err(TensorError::backend(
                "sparse multiply",
                "stream rejected the submission",
            ));
        }
        self.inner
            .sparse_multiply(desc, alpha, compressed, dense, beta, out, workspace)
    }
}

/// Row-major batched matmul with NumPy broadcasting, computed directly from
/// the operand shapes.
pub fn reference_matmul(
    left: &[f32],
    left_shape: &[usize],
    right: &[f32],
    right_shape: &[usize],
    trans_a: bool,
    trans_b: bool,
) -> Vec<f32> {
    let l_vec = left_shape.len() == 1;
    let r_vec = right_shape.len() == 1;
    let trans_a = trans_a && !l_vec;
    let trans_b = trans_b && !r_vec;
    let ls: Vec<usize> = if l_vec { vec![1, left_shape[0]] } else { left_shape.to_vec() };
    let rs: Vec<usize> = if r_vec { vec![right_shape[0], 1] } else { right_shape.to_vec() };
    let (lr, lc) = (ls[ls.len() - 2], ls[ls.len() - 1]);
    let (rr, rc) = (rs[rs.len() - 2], rs[rs.len() - 1]);
    let (m, k) = if trans_a { (lc, lr) } else { (lr, lc) };
    let n = if trans_b { rr } else { rc };

    let lb = &ls[..ls.len() - 2];
    let rb = &rs[..rs.len() - 2];
    let rank = lb.len().max(rb.len());
    let pad = |b: &[usize]| -> Vec<usize> {
        let mut v = vec![1; rank - b.len()];
        v.extend_from_slice(b);
        v
    };
    let (lb, rb) = (pad(lb), pad(rb));
    let out_b: Vec<usize> = lb.iter().zip(&rb).map(|(&a, &b)| a.max(b)).collect();
    let batches: usize = out_b.iter().product();

    let mut out = vec![0.0f32; batches * m * n];
    for bi in 0..batches {
        // Coordinates of this batch, then the matching index in each operand.
        let mut coords = vec![0; rank];
        let mut rem = bi;
        for ax in (0..rank).rev() {
            coords[ax] = rem % out_b[ax];
            rem /= out_b[ax];
        }
        let (mut li, mut ri) = (0, 0);
        for ax in 0..rank {
            li = li * lb[ax] + if lb[ax] == 1 { 0 } else { coords[ax] };
            ri = ri * rb[ax] + if rb[ax] == 1 { 0 } else { coords[ax] };
        }
        let l = &left[li * m * k..];
        let r = &right[ri * k * n..];
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0f32;
                for p in 0..k {
                    let a = if trans_a { l[p * m + i] } else { l[i * k + p] };
                    let b = if trans_b { r[j * k + p] } else { r[p * n + j] };
                    acc += a * b;
                }
                out[bi * m * n + i * n + j] = acc;
            }
        }
    }
    out
}
