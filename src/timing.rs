//! Timing utilities for the timed regions of each experiment.
//!
//! All measurements use the monotonic clock (`std::time::Instant`, immune to
//! wall-clock adjustment) and are reported as `f64` seconds. Serializing
//! fences bracket every timed region so in-flight loads and stores retire
//! inside the measurement instead of leaking across its edges.

use std::time::{Duration, Instant};

/// Serializing fence around timed regions
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn serialize() {
    unsafe {
        core::arch::x86_64::_mm_mfence();
        core::arch::x86_64::_mm_lfence();
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub fn serialize() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

/// Monotonic stopwatch for a single timed region
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Capture the start instant
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since start
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed seconds since start
    #[inline(always)]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Measure a closure inside serializing fences, returning its result and
/// the elapsed seconds
#[inline(always)]
pub fn timed<F, R>(f: F) -> (R, f64)
where
    F: FnOnce() -> R,
{
    serialize();
    let sw = Stopwatch::start();
    let result = std::hint::black_box(f());
    serialize();
    let elapsed = sw.elapsed_secs();
    (result, elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_monotonic() {
        let sw = Stopwatch::start();
        let a = sw.elapsed_secs();
        std::thread::sleep(Duration::from_micros(10));
        let b = sw.elapsed_secs();
        assert!(b > a, "elapsed seconds should be monotonically increasing");
        assert!(a >= 0.0);
    }

    #[test]
    fn test_timed_sleep() {
        let (_, elapsed) = timed(|| {
            std::thread::sleep(Duration::from_millis(1));
        });

        // Should be around 1ms, with generous scheduler tolerance
        assert!(
            elapsed > 0.0005 && elapsed < 0.5,
            "Unexpected elapsed time: {} s",
            elapsed
        );
    }

    #[test]
    fn test_timed_returns_result() {
        let (value, elapsed) = timed(|| 41 + 1);
        assert_eq!(value, 42);
        assert!(elapsed >= 0.0);
    }

    #[test]
    fn test_serialize_is_cheap() {
        let sw = Stopwatch::start();
        for _ in 0..1000 {
            serialize();
        }
        // A thousand fence pairs should complete well under a second
        assert!(sw.elapsed_secs() < 1.0);
    }
}
