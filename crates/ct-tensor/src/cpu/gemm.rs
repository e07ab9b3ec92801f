// Column-major GEMM kernel used by CpuExecutor.

use crate::backend::{GemmParams, Transpose};
use crate::element::Element;
use crate::error::{Result, TensorError};

/// Minimum slice length holding a column-major `rows x cols` matrix with
/// leading dimension `ld`.
fn required_len(rows: usize, cols: usize, ld: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        ld * (cols - 1) + rows
    }
}

/// Checks one operand: `ld` must cover its stored rows and `data` must be
/// long enough for the whole matrix.
fn check_operand(
    name: &str,
    stored_rows: usize,
    stored_cols: usize,
    ld: usize,
    len: usize,
) -> Result<()> {
    if ld < stored_rows.max(1) {
        return Err(TensorError::backend(
            "gemm",
            format!("ld{}={} is smaller than {} rows", name, ld, stored_rows),
        ));
    }
    let needed = required_len(stored_rows, stored_cols, ld);
    if len < needed {
        return Err(TensorError::backend(
            "gemm",
            format!("operand {} has {} elements, needs {}", name, len, needed),
        ));
    }
    Ok(())
}

/// Validates `params` against the operand slices.
pub(crate) fn check(params: &GemmParams<impl Element>, a: usize, b: usize, c: usize) -> Result<()> {
    let (m, n, k) = (params.m, params.n, params.k);
    let (a_rows, a_cols) = match params.trans_a {
        Transpose::No => (m, k),
        Transpose::Yes => (k, m),
    };
    let (b_rows, b_cols) = match params.trans_b {
        Transpose::No => (k, n),
        Transpose::Yes => (n, k),
    };
    check_operand("a", a_rows, a_cols, params.lda, a)?;
    check_operand("b", b_rows, b_cols, params.ldb, b)?;
    check_operand("c", m, n, params.ldc, c)
}

/// `C = alpha * op(A) * op(B) + beta * C`, all operands column-major.
///
/// When `beta` is zero, `C` is not read.
pub(crate) fn gemm<T: Element>(params: &GemmParams<T>, a: &[T], b: &[T], c: &mut [T]) -> Result<()> {
    check(params, a.len(), b.len(), c.len())?;

    let alpha = params.alpha.to_f64();
    let beta = params.beta.to_f64();
    let a_at = |i: usize, p: usize| match params.trans_a {
        Transpose::No => a[i + p * params.lda],
        Transpose::Yes => a[p + i * params.lda],
    };
    let b_at = |p: usize, j: usize| match params.trans_b {
        Transpose::No => b[p + j * params.ldb],
        Transpose::Yes => b[j + p * params.ldb],
    };

    for j in 0..params.n {
        for i in 0..params.m {
            let mut acc = 0.0f64;
            for p in 0..params.k {
                acc += a_at(i, p).to_f64() * b_at(p, j).to_f64();
            }
            let dst = &mut c[i + j * params.ldc];
            let prior = if beta == 0.0 { 0.0 } else { beta * dst.to_f64() };
            *dst = T::from_f64(alpha * acc + prior);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(m: usize, n: usize, k: usize, lda: usize, ldb: usize, ldc: usize) -> GemmParams<f32> {
        GemmParams {
            trans_a: Transpose::No,
            trans_b: Transpose::No,
            m,
            n,
            k,
            alpha: 1.0,
            lda,
            ldb,
            beta: 0.0,
            ldc,
        }
    }

    #[test]
    fn test_gemm_col_major() {
        // A = [1 3; 2 4] column-major, B = [5 7; 6 8] column-major
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [0.0f32; 4];
        gemm(&params(2, 2, 2, 2, 2, 2), &a, &b, &mut c).unwrap();
        // [1 3; 2 4] @ [5 7; 6 8] = [23 31; 34 46]
        assert_eq!(c, [23.0, 34.0, 31.0, 46.0]);
    }

    #[test]
    fn test_gemm_transposed_a() {
        // op(A) = A^T where A is stored 2x2 column-major [1 3; 2 4]
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [1.0, 0.0, 0.0, 1.0];
        let mut c = [0.0f32; 4];
        let mut p = params(2, 2, 2, 2, 2, 2);
        p.trans_a = Transpose::Yes;
        gemm(&p, &a, &b, &mut c).unwrap();
        assert_eq!(c, [1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_gemm_alpha_beta() {
        let a = [2.0];
        let b = [3.0];
        let mut c = [10.0f32];
        let mut p = params(1, 1, 1, 1, 1, 1);
        p.alpha = 0.5;
        p.beta = 1.0;
        gemm(&p, &a, &b, &mut c).unwrap();
        assert_relative_eq!(c[0], 13.0);
    }

    #[test]
    fn test_gemm_beta_zero_ignores_nan() {
        let mut c = [f32::NAN];
        gemm(&params(1, 1, 1, 1, 1, 1), &[1.0], &[1.0], &mut c).unwrap();
        assert_eq!(c[0], 1.0);
    }

    #[test]
    fn test_gemm_rejects_short_operand() {
        let mut c = [0.0f32; 4];
        let err = gemm(&params(2, 2, 2, 2, 2, 2), &[1.0; 3], &[1.0; 4], &mut c);
        assert!(matches!(err, Err(TensorError::Backend { op: "gemm", .. })));
    }

    #[test]
    fn test_gemm_rejects_small_ld() {
        let mut c = [0.0f32; 4];
        assert!(gemm(&params(2, 2, 2, 1, 2, 2), &[1.0; 4], &[1.0; 4], &mut c).is_err());
    }
}
