use half::{bf16, f16};

use crate::dtype::DType;

/// CPU-side tensor storage, one variant per supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F64(Vec<f64>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
}

impl CpuStorage {
    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F64 => CpuStorage::F64(vec![0.0; n]),
            DType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
            DType::BF16 => CpuStorage::BF16(vec![bf16::ZERO; n]),
        }
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let s = CpuStorage::zeros(DType::F32, 5);
        assert_eq!(s, CpuStorage::F32(vec![0.0; 5]));

        let h = CpuStorage::zeros(DType::BF16, 3);
        assert_eq!(h.dtype(), DType::BF16);
        assert_eq!(h, CpuStorage::BF16(vec![bf16::ZERO; 3]));
    }
}
