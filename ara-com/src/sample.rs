//! Owning handles for received and allocated samples.

use crate::zerocopy::LoanedSample;
use bytes::BytesMut;
use std::{
    fmt,
    ops::{Deref, DerefMut},
};

/// Read-only handle to a received sample.
///
/// The handle owns the decoded value. It can be moved but not copied.
///
/// # Examples
///
/// ```rust
/// use ara_com::SamplePtr;
/// let sample = SamplePtr::new(5u32);
/// assert_eq!(*sample, 5);
/// ```
pub struct SamplePtr<T> {
    value: Box<T>,
}

impl<T> SamplePtr<T> {
    /// Creates a new [`SamplePtr`] owning the given value.
    pub fn new(value: T) -> Self {
        Self {
            value: Box::new(value),
        }
    }

    /// Consumes the handle and returns the owned value.
    pub fn into_inner(self) -> T {
        *self.value
    }
}

impl<T> Deref for SamplePtr<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for SamplePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SamplePtr").field(&self.value).finish()
    }
}

/// Memory an outgoing sample is serialized into.
///
/// Dropping loaned storage without sending it returns the chunk to its channel.
pub enum SampleStorage {
    /// Heap memory owned by the sample.
    Heap(BytesMut),
    /// A chunk loaned from a zero-copy channel.
    Loaned(LoanedSample),
}

impl SampleStorage {
    /// Returns the buffer to serialize into, or [`None`] for an invalid loan.
    pub fn buffer_mut(&mut self) -> Option<&mut BytesMut> {
        match self {
            Self::Heap(buffer) => Some(buffer),
            Self::Loaned(sample) => sample.buffer_mut(),
        }
    }

    /// Returns how many bytes the storage holds without growing.
    pub fn capacity(&self) -> usize {
        match self {
            Self::Heap(buffer) => buffer.capacity(),
            Self::Loaned(sample) => sample.capacity(),
        }
    }

    /// Returns whether `len` bytes can be written without leaving the provided memory.
    ///
    /// Heap storage grows on demand; loaned chunks have a fixed size.
    pub fn fits(&self, len: usize) -> bool {
        match self {
            Self::Heap(_) => true,
            Self::Loaned(sample) => len <= sample.capacity(),
        }
    }
}

impl Deref for SampleStorage {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Heap(buffer) => &buffer[..],
            Self::Loaned(sample) => &sample[..],
        }
    }
}

impl fmt::Debug for SampleStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heap(buffer) => f.debug_tuple("Heap").field(&buffer.capacity()).finish(),
            Self::Loaned(sample) => f.debug_tuple("Loaned").field(sample).finish(),
        }
    }
}

/// Mutable handle to a sample constructed in binding-provided storage.
///
/// The sample is built in place by [`SkeletonEvent::allocate`] and handed back to the binding by
/// [`SkeletonEvent::send_allocated`]. If it is dropped instead, the value is dropped first and
/// the storage is released afterwards.
///
/// [`SkeletonEvent::allocate`]: crate::SkeletonEvent::allocate
/// [`SkeletonEvent::send_allocated`]: crate::SkeletonEvent::send_allocated
pub struct SampleAllocateePtr<T> {
    // Field order is drop order.
    value: T,
    storage: SampleStorage,
}

impl<T> SampleAllocateePtr<T> {
    pub(crate) fn new(value: T, storage: SampleStorage) -> Self {
        Self { value, storage }
    }

    /// Returns the capacity of the underlying storage.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Gives up ownership of the value and its storage.
    pub(crate) fn release(self) -> (T, SampleStorage) {
        (self.value, self.storage)
    }
}

impl<T> Deref for SampleAllocateePtr<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for SampleAllocateePtr<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for SampleAllocateePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleAllocateePtr")
            .field("value", &self.value)
            .field("capacity", &self.storage.capacity())
            .finish()
    }
}
