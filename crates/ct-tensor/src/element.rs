use std::fmt::Debug;

use half::{bf16, f16};

use crate::dtype::DType;
use crate::storage::CpuStorage;

/// Numeric-type descriptor for the element types a contraction can run on.
///
/// One generic code path is written against this trait instead of one copy
/// per element type. Arithmetic in the reference backends goes through
/// `f64`.
pub trait Element: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// The storage tag for this element type.
    const DTYPE: DType;

    fn zero() -> Self;
    fn from_f32(v: f32) -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;

    /// Borrows the matching variant of `storage`, or `None` on a dtype mismatch.
    fn slice(storage: &CpuStorage) -> Option<&[Self]>;

    /// Mutable counterpart of [`Element::slice`].
    fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]>;

    /// Wraps owned data in the matching storage variant.
    fn into_storage(data: Vec<Self>) -> CpuStorage;

    fn is_zero(self) -> bool {
        self.to_f64() == 0.0
    }
}

macro_rules! impl_element {
    ($ty:ty, $dtype:ident, $zero:expr, $from_f32:expr, $to_f64:expr, $from_f64:expr) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$dtype;

            fn zero() -> Self {
                $zero
            }

            fn from_f32(v: f32) -> Self {
                $from_f32(v)
            }

            fn to_f64(self) -> f64 {
                $to_f64(self)
            }

            fn from_f64(v: f64) -> Self {
                $from_f64(v)
            }

            fn slice(storage: &CpuStorage) -> Option<&[Self]> {
                match storage {
                    CpuStorage::$dtype(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
                match storage {
                    CpuStorage::$dtype(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn into_storage(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$dtype(data)
            }
        }
    };
}

impl_element!(f32, F32, 0.0, |v: f32| v, |v: f32| v as f64, |v: f64| v as f32);
impl_element!(f64, F64, 0.0, |v: f32| v as f64, |v: f64| v, |v: f64| v);
impl_element!(
    f16,
    F16,
    f16::ZERO,
    f16::from_f32,
    |v: f16| v.to_f64(),
    f16::from_f64
);
impl_element!(
    bf16,
    BF16,
    bf16::ZERO,
    bf16::from_f32,
    |v: bf16| v.to_f64(),
    bf16::from_f64
);
