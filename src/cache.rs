//! Cache-line layout helpers and explicit cache-state control.
//!
//! Cold-start experiments must begin with their working set evicted from
//! every cache level; [`invalidate`] walks a buffer flushing one line at a
//! time and fences so later loads really miss. Warm runs skip the flush and
//! inherit whatever the fill left resident.

/// Cache line size of the target microarchitecture in bytes
pub const CACHE_LINE_SIZE: usize = 64;

/// Wrapper aligning its contents to a full cache line, so adjacent values
/// never share a line
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(64))]
pub struct CachePadded<T> {
    pub value: T,
}

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }
}

/// Evict every cache line spanned by `data` from all cache levels
#[cfg(target_arch = "x86_64")]
pub fn invalidate<T>(data: &[T]) {
    use core::arch::x86_64::{_mm_clflush, _mm_mfence};

    let bytes = std::mem::size_of_val(data);
    if bytes == 0 {
        return;
    }
    let base = data.as_ptr() as *const u8;
    unsafe {
        let mut offset = 0;
        while offset < bytes {
            _mm_clflush(base.add(offset));
            offset += CACHE_LINE_SIZE;
        }
        // Unaligned buffers can end mid-line; flush the final byte's line too
        _mm_clflush(base.add(bytes - 1));
        _mm_mfence();
    }
}

/// Without clflush there is no portable eviction; issue a full fence so at
/// least ordering matches the x86 path
#[cfg(not(target_arch = "x86_64"))]
pub fn invalidate<T>(data: &[T]) {
    let _ = data;
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

/// Cache state each worker's buffer is placed in before the timed region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Flush the buffer out of all cache levels
    Cold,
    /// Leave whatever the fill pass made resident
    Warm,
}

impl CachePolicy {
    /// Apply this policy to a buffer, strictly before any timed region
    pub fn apply<T>(&self, data: &[T]) {
        match self {
            CachePolicy::Cold => invalidate(data),
            CachePolicy::Warm => {}
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CachePolicy::Cold => "cold",
            CachePolicy::Warm => "warm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_layout() {
        assert_eq!(std::mem::size_of::<CachePadded<u64>>(), CACHE_LINE_SIZE);
        assert_eq!(std::mem::align_of::<CachePadded<u64>>(), CACHE_LINE_SIZE);

        let pair = [CachePadded::new(1u64), CachePadded::new(2u64)];
        let a = &pair[0] as *const _ as usize;
        let b = &pair[1] as *const _ as usize;
        assert_eq!(b - a, CACHE_LINE_SIZE);
    }

    #[test]
    fn test_invalidate_preserves_contents() {
        let data: Vec<u64> = (0..1024).collect();
        invalidate(&data);
        for (i, &v) in data.iter().enumerate() {
            assert_eq!(v, i as u64);
        }
    }

    #[test]
    fn test_invalidate_empty_slice() {
        let data: [u64; 0] = [];
        invalidate(&data);
    }

    #[test]
    fn test_policy_apply() {
        let data: Vec<u64> = vec![7; 256];
        CachePolicy::Cold.apply(&data);
        CachePolicy::Warm.apply(&data);
        assert!(data.iter().all(|&v| v == 7));
        assert_eq!(CachePolicy::Cold.label(), "cold");
        assert_eq!(CachePolicy::Warm.label(), "warm");
    }
}
