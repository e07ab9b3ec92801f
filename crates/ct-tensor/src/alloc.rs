use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

use crate::element::Element;
use crate::error::Result;

/// An executor-visible buffer. Released when dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer<T> {
    data: Vec<T>,
}

impl<T> DeviceBuffer<T> {
    pub fn from_vec(data: Vec<T>) -> Self {
        DeviceBuffer { data }
    }
}

impl<T> Deref for DeviceBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for DeviceBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Device memory provider.
pub trait Allocator<T: Element>: Send + Sync + Debug {
    /// Zero-filled scratch memory for `len` elements.
    fn scratch_buffer(&self, len: usize) -> Result<DeviceBuffer<T>>;

    /// Copies host data into a new device buffer.
    fn copy_to_device(&self, host: &[T]) -> Result<DeviceBuffer<T>>;
}

/// Allocator whose "device" is host memory.
#[derive(Debug, Clone, Default)]
pub struct HostAllocator;

impl HostAllocator {
    pub fn new() -> Self {
        HostAllocator
    }
}

impl<T: Element> Allocator<T> for HostAllocator {
    fn scratch_buffer(&self, len: usize) -> Result<DeviceBuffer<T>> {
        Ok(DeviceBuffer::from_vec(vec![T::zero(); len]))
    }

    fn copy_to_device(&self, host: &[T]) -> Result<DeviceBuffer<T>> {
        Ok(DeviceBuffer::from_vec(host.to_vec()))
    }
}
