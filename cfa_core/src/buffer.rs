use std::alloc::{self, Layout};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use crate::error::{ArrayError, Result};
use crate::format::BUFFER_ALIGNMENT;

/// Exclusively owned, zero-initialized byte buffer aligned to
/// [`BUFFER_ALIGNMENT`].
///
/// This is the single storage type behind compressed data, header scratch
/// space and their deep copies. Buffers are never resized in place: a size
/// change allocates a fresh buffer and drops the old one.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is plain owned bytes with no interior sharing.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// A buffer of length zero. Does not allocate.
    pub const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Allocate `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self::empty());
        }
        let layout = Layout::from_size_align(len, BUFFER_ALIGNMENT)
            .map_err(|_| ArrayError::Allocation { bytes: len })?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(raw)
            .map(|ptr| Self { ptr, len })
            .ok_or(ArrayError::Allocation { bytes: len })
    }

    /// Allocate an aligned copy of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut buf = Self::zeroed(bytes.len())?;
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    /// Fallible deep copy.
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_slice(self)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.fill(0);
    }

    fn layout(&self) -> Layout {
        // SAFETY: this exact layout was validated when the buffer was allocated.
        unsafe { Layout::from_size_align_unchecked(self.len, BUFFER_ALIGNMENT) }
    }
}

impl Default for AlignedBuf {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` initialized bytes (dangling only when len == 0).
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Clone for AlignedBuf {
    /// Infallible deep copy; allocation failure is fatal, as for `Vec`.
    fn clone(&self) -> Self {
        if self.len == 0 {
            return Self::empty();
        }
        let layout = self.layout();
        // SAFETY: non-zero size; the source is valid for `len` bytes and the
        // fresh allocation cannot overlap it.
        unsafe {
            let raw = alloc::alloc(layout);
            let Some(dst) = NonNull::new(raw) else {
                alloc::handle_alloc_error(layout)
            };
            ptr::copy_nonoverlapping(self.ptr.as_ptr(), dst.as_ptr(), self.len);
            Self {
                ptr: dst,
                len: self.len,
            }
        }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated by `alloc`/`alloc_zeroed` with this layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout()) }
        }
    }
}

impl fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuf").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_buffer_is_aligned_and_clear() {
        let buf = AlignedBuf::zeroed(1000).unwrap();
        assert_eq!(buf.len(), 1000);
        assert_eq!(buf.as_ptr() as usize % BUFFER_ALIGNMENT, 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_buffer_does_not_allocate() {
        let buf = AlignedBuf::zeroed(0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(&*buf, &[] as &[u8]);
        let copy = buf.clone();
        assert!(copy.is_empty());
    }

    #[test]
    fn clone_is_independent() {
        let mut a = AlignedBuf::from_slice(&[1, 2, 3, 4]).unwrap();
        let b = a.clone();
        a[0] = 9;
        assert_eq!(&*b, &[1, 2, 3, 4]);
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert_eq!(b.as_ptr() as usize % BUFFER_ALIGNMENT, 0);

        let c = a.try_clone().unwrap();
        assert_eq!(&*c, &[9, 2, 3, 4]);
    }

    #[test]
    fn clear_zeroes_contents() {
        let mut a = AlignedBuf::from_slice(&[7; 16]).unwrap();
        a.clear();
        assert!(a.iter().all(|&b| b == 0));
    }
}
