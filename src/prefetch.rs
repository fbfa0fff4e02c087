//! Software prefetch hint wrappers.
//!
//! Thin safe fronts over `_mm_prefetch` with each locality strategy:
//! T0 pulls into every level, T1 into L2 and below, T2 into L3 and below,
//! NTA into a non-temporal slot that bypasses lower-level pollution. Hints
//! never fault, so the slice-indexed forms may reference positions past the
//! end of the data during the tail of a sweep; the address is formed with
//! `wrapping_add` and never dereferenced.

/// Prefetch into all cache levels
#[inline(always)]
pub fn prefetch_t0<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<_MM_HINT_T0>(ptr as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = ptr;
    }
}

/// Prefetch into L2 and below
#[inline(always)]
pub fn prefetch_t1<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T1};
        _mm_prefetch::<_MM_HINT_T1>(ptr as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = ptr;
    }
}

/// Prefetch into L3 and below
#[inline(always)]
pub fn prefetch_t2<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T2};
        _mm_prefetch::<_MM_HINT_T2>(ptr as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = ptr;
    }
}

/// Non-temporal prefetch, minimizing cache pollution
#[inline(always)]
pub fn prefetch_nta<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_NTA};
        _mm_prefetch::<_MM_HINT_NTA>(ptr as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = ptr;
    }
}

/// Prefetch ahead of a store; the stable intrinsic set exposes no write
/// strategy, so this issues T0 like the read path
#[inline(always)]
pub fn prefetch_write<T>(ptr: *const T) {
    prefetch_t0(ptr);
}

/// Hint `data[index]` for reading, T0 locality
#[inline(always)]
pub fn prefetch_read_t0<T>(data: &[T], index: usize) {
    prefetch_t0(data.as_ptr().wrapping_add(index));
}

/// Hint `data[index]` for reading, T1 locality
#[inline(always)]
pub fn prefetch_read_t1<T>(data: &[T], index: usize) {
    prefetch_t1(data.as_ptr().wrapping_add(index));
}

/// Hint `data[index]` for reading, T2 locality
#[inline(always)]
pub fn prefetch_read_t2<T>(data: &[T], index: usize) {
    prefetch_t2(data.as_ptr().wrapping_add(index));
}

/// Hint `data[index]` for reading, non-temporal
#[inline(always)]
pub fn prefetch_read_nta<T>(data: &[T], index: usize) {
    prefetch_nta(data.as_ptr().wrapping_add(index));
}

/// Hint `data[index]` ahead of a store
#[inline(always)]
pub fn prefetch_write_at<T>(data: &[T], index: usize) {
    prefetch_write(data.as_ptr().wrapping_add(index));
}

/// Locality strategy selector for drivers that compare hint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchHint {
    T0,
    T1,
    T2,
    Nta,
}

impl PrefetchHint {
    pub const ALL: [PrefetchHint; 4] = [
        PrefetchHint::T0,
        PrefetchHint::T1,
        PrefetchHint::T2,
        PrefetchHint::Nta,
    ];

    /// Hint `data[index]` for reading with this strategy
    #[inline(always)]
    pub fn prefetch_read<T>(&self, data: &[T], index: usize) {
        match self {
            PrefetchHint::T0 => prefetch_read_t0(data, index),
            PrefetchHint::T1 => prefetch_read_t1(data, index),
            PrefetchHint::T2 => prefetch_read_t2(data, index),
            PrefetchHint::Nta => prefetch_read_nta(data, index),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PrefetchHint::T0 => "T0",
            PrefetchHint::T1 => "T1",
            PrefetchHint::T2 => "T2",
            PrefetchHint::Nta => "NTA",
        }
    }
}
