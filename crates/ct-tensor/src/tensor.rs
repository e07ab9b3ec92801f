use crate::dtype::DType;
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A tensor backed by CPU storage.
///
/// Holds contiguous, row-major data with an associated shape and dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
}

impl Tensor {
    /// Create a new tensor from typed data and a shape.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: Shape) -> Result<Self> {
        if data.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor {
            storage: T::into_storage(data),
            shape,
        })
    }

    /// Create a zero-filled tensor with the given dtype and shape.
    pub fn zeros(dtype: DType, shape: Shape) -> Self {
        Tensor {
            storage: CpuStorage::zeros(dtype, shape.numel()),
            shape,
        }
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Returns the element data as `T`.
    ///
    /// # Errors
    /// Returns `DTypeMismatch` if the storage does not hold `T`.
    pub fn data<T: Element>(&self) -> Result<&[T]> {
        T::slice(&self.storage).ok_or_else(|| TensorError::DTypeMismatch {
            expected: T::DTYPE.to_string(),
            got: self.dtype().to_string(),
        })
    }

    /// Mutable counterpart of [`Tensor::data`].
    pub fn data_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        let got = self.dtype();
        T::slice_mut(&mut self.storage).ok_or_else(|| TensorError::DTypeMismatch {
            expected: T::DTYPE.to_string(),
            got: got.to_string(),
        })
    }
}
