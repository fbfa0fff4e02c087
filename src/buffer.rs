//! Cache-line-aligned working-set buffers.
//!
//! Every experiment array starts on a cache-line boundary so line counts and
//! flush loops are exact, and so two buffers never share a line by accident.
//! Allocation failures surface as typed errors instead of aborting, since
//! the larger experiments reserve hundreds of MiB.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::cache::{CachePadded, CACHE_LINE_SIZE};
use crate::error::{BenchError, Result};

/// Element types that are valid for any byte pattern, so buffers may be
/// created zeroed and refilled with `memset`-style writes
///
/// # Safety
/// Implementors must be plain old data: no niches, no invalid bit patterns,
/// no drop glue.
pub unsafe trait Pod: Copy {}

unsafe impl Pod for u8 {}
unsafe impl Pod for u64 {}
unsafe impl Pod for usize {}
unsafe impl Pod for f64 {}
unsafe impl<T: Pod> Pod for CachePadded<T> {}

/// Fixed-length, cache-line-aligned heap buffer
pub struct AlignedBuffer<T: Pod> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// Unique owner of its allocation
unsafe impl<T: Pod + Send> Send for AlignedBuffer<T> {}

impl<T: Pod> AlignedBuffer<T> {
    /// Allocate `len` zeroed elements at cache-line alignment. Zero-length
    /// buffers are rejected so downstream flush and fill loops never see an
    /// empty working set.
    pub fn new(len: usize) -> Result<Self> {
        let align = CACHE_LINE_SIZE.max(std::mem::align_of::<T>());
        let bytes = match len.checked_mul(std::mem::size_of::<T>()) {
            Some(bytes) if len > 0 => bytes,
            _ => return Err(BenchError::allocation(0, align)),
        };
        let layout = Layout::from_size_align(bytes, align)
            .map_err(|_| BenchError::allocation(bytes, align))?;

        let raw = unsafe { alloc_zeroed(layout) } as *mut T;
        let ptr = NonNull::new(raw).ok_or(BenchError::AllocationFailed { bytes, align })?;

        Ok(Self { ptr, len, layout })
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocation size in bytes
    pub fn size_bytes(&self) -> usize {
        self.layout.size()
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Overwrite the whole allocation with a repeated byte
    pub fn fill_bytes(&mut self, byte: u8) {
        unsafe {
            std::ptr::write_bytes(self.ptr.as_ptr() as *mut u8, byte, self.layout.size());
        }
    }
}

impl AlignedBuffer<u64> {
    /// Fill with `buf[i] = i`, the identity table used by the prefetch
    /// experiments
    pub fn fill_sequential(&mut self) {
        for (i, slot) in self.as_mut_slice().iter_mut().enumerate() {
            *slot = i as u64;
        }
    }
}

impl<T: Pod> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_len() {
        let buf = AlignedBuffer::<u64>::new(1000).unwrap();
        assert_eq!(buf.len(), 1000);
        assert_eq!(buf.size_bytes(), 8000);
        assert_eq!(buf.as_slice().as_ptr() as usize % CACHE_LINE_SIZE, 0);
        assert!(buf.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_zero_len_rejected() {
        match AlignedBuffer::<u64>::new(0) {
            Err(BenchError::AllocationFailed { .. }) => {}
            other => panic!("expected AllocationFailed, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_fill_bytes() {
        let mut buf = AlignedBuffer::<u64>::new(64).unwrap();
        buf.fill_bytes(0x55);
        assert!(buf.as_slice().iter().all(|&v| v == 0x5555_5555_5555_5555));
        buf.fill_bytes(0xAA);
        assert!(buf.as_slice().iter().all(|&v| v == 0xAAAA_AAAA_AAAA_AAAA));
    }

    #[test]
    fn test_fill_sequential() {
        let mut buf = AlignedBuffer::<u64>::new(128).unwrap();
        buf.fill_sequential();
        assert_eq!(buf.as_slice()[0], 0);
        assert_eq!(buf.as_slice()[127], 127);
    }

    #[test]
    fn test_padded_elements_line_apart() {
        let buf = AlignedBuffer::<CachePadded<u64>>::new(4).unwrap();
        let base = buf.as_slice().as_ptr() as usize;
        assert_eq!(base % CACHE_LINE_SIZE, 0);
        assert_eq!(std::mem::size_of_val(buf.as_slice()), 4 * CACHE_LINE_SIZE);
    }

    #[test]
    fn test_writes_round_trip() {
        let mut buf = AlignedBuffer::<f64>::new(16).unwrap();
        for (i, slot) in buf.as_mut_slice().iter_mut().enumerate() {
            *slot = i as f64 * 0.5;
        }
        assert_eq!(buf.as_slice()[15], 7.5);
    }
}
