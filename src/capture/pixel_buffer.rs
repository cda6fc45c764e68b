//! Geometry-tagged pixel memory with scoped access
//!
//! A [`PixelBuffer`] owns exactly `bytes_per_row * height` bytes for the
//! geometry it was created with. Readers and writers go through guards that
//! release the lock when dropped, so an early return or a panic in the
//! middle of a copy can never leave the buffer locked.
//!
//! Writers get a fixed-size mutable slice: the length invariant cannot be
//! broken through a guard.

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::frame::Geometry;

/// Error returned when wrapping bytes that don't match the geometry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("buffer holds {actual} bytes but geometry {geometry} needs {expected}")]
pub struct BufferSizeError {
    pub geometry: Geometry,
    pub expected: usize,
    pub actual: usize,
}

pub struct PixelBuffer {
    geometry: Geometry,
    data: RwLock<Vec<u8>>,
}

impl PixelBuffer {
    /// Allocate a zero-filled buffer for `geometry`
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            data: RwLock::new(vec![0u8; geometry.payload_len()]),
        }
    }

    /// Wrap existing pixel bytes; the length must match the geometry exactly
    pub fn from_vec(geometry: Geometry, data: Vec<u8>) -> Result<Self, BufferSizeError> {
        let expected = geometry.payload_len();
        if data.len() != expected {
            return Err(BufferSizeError {
                geometry,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            geometry,
            data: RwLock::new(data),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn len(&self) -> usize {
        self.geometry.payload_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared access, blocking while a writer holds the buffer
    pub fn read(&self) -> PixelReadGuard<'_> {
        PixelReadGuard {
            inner: self.data.read(),
        }
    }

    /// Shared access without blocking; `None` while a writer holds the buffer
    pub fn try_read(&self) -> Option<PixelReadGuard<'_>> {
        self.data
            .try_read()
            .map(|inner| PixelReadGuard { inner })
    }

    /// Exclusive access
    pub fn write(&self) -> PixelWriteGuard<'_> {
        PixelWriteGuard {
            inner: self.data.write(),
        }
    }

    /// Copy of the current contents
    pub fn to_vec(&self) -> Vec<u8> {
        self.read().to_vec()
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("geometry", &self.geometry)
            .field("len", &self.len())
            .finish()
    }
}

/// Read guard for a [`PixelBuffer`]
pub struct PixelReadGuard<'a> {
    inner: RwLockReadGuard<'a, Vec<u8>>,
}

impl Deref for PixelReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.inner.as_slice()
    }
}

/// Write guard for a [`PixelBuffer`]
pub struct PixelWriteGuard<'a> {
    inner: RwLockWriteGuard<'a, Vec<u8>>,
}

impl Deref for PixelWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.inner.as_slice()
    }
}

impl DerefMut for PixelWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.inner.as_mut_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FourCc, PixelFormat};

    fn geometry() -> Geometry {
        Geometry::new(4, 2, PixelFormat::OneComponent8.fourcc(), 6)
    }

    #[test]
    fn test_new_buffer_is_zeroed() {
        let buffer = PixelBuffer::new(geometry());
        assert_eq!(buffer.len(), 12);
        assert!(buffer.read().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = PixelBuffer::from_vec(geometry(), vec![0u8; 11]).unwrap_err();
        assert_eq!(err.expected, 12);
        assert_eq!(err.actual, 11);

        assert!(PixelBuffer::from_vec(geometry(), vec![7u8; 12]).is_ok());
    }

    #[test]
    fn test_write_then_read() {
        let buffer = PixelBuffer::new(Geometry::new(2, 1, FourCc(1), 2));
        {
            let mut guard = buffer.write();
            guard.copy_from_slice(&[3, 4]);
        }
        assert_eq!(&*buffer.read(), &[3, 4]);
    }

    #[test]
    fn test_try_read_fails_while_writing() {
        let buffer = PixelBuffer::new(geometry());
        let guard = buffer.write();
        assert!(buffer.try_read().is_none());
        drop(guard);
        assert!(buffer.try_read().is_some());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let buffer = std::sync::Arc::new(PixelBuffer::new(geometry()));
        let cloned = buffer.clone();
        let result = std::thread::spawn(move || {
            let _guard = cloned.write();
            panic!("writer failed mid-copy");
        })
        .join();
        assert!(result.is_err());
        // parking_lot locks don't poison
        assert!(buffer.try_read().is_some());
    }
}
