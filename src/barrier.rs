//! Spin-wait start barrier for simultaneous worker release.
//!
//! Workers check in on a shared ready counter and then spin on a release
//! gate; the orchestrator opens the gate only after every worker has checked
//! in, so all timed regions begin within one cache-coherency round trip of
//! each other. Workers never sleep while waiting: a futex wakeup would add
//! scheduler latency with per-worker jitter, which is exactly what the
//! simultaneous start is meant to exclude.
//!
//! The gate has three states. A failed setup (bind rejection, missing
//! worker) moves it to `ABORT` instead of `GO`, which frees the spinning
//! workers without pretending the run started.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::cache::CachePadded;
use crate::error::{BenchError, Result};

const HOLD: u8 = 0;
const GO: u8 = 1;
const ABORT: u8 = 2;

/// Ready-count / release-gate barrier shared between an orchestrator and a
/// fixed set of workers
pub struct StartBarrier {
    // Separate lines: worker check-ins must not steal the line every other
    // worker is spinning on
    ready: CachePadded<AtomicUsize>,
    gate: CachePadded<AtomicU8>,
    expected: usize,
}

impl StartBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            ready: CachePadded::new(AtomicUsize::new(0)),
            gate: CachePadded::new(AtomicU8::new(HOLD)),
            expected,
        }
    }

    /// Worker side: check in, then spin until the gate opens. Returns
    /// `true` when the run was released, `false` when setup was aborted.
    pub fn arrive_and_wait(&self) -> bool {
        self.ready.value.fetch_add(1, Ordering::SeqCst);
        loop {
            match self.gate.value.load(Ordering::Acquire) {
                GO => return true,
                ABORT => return false,
                _ => std::hint::spin_loop(),
            }
        }
    }

    /// Workers checked in so far
    pub fn ready(&self) -> usize {
        self.ready.value.load(Ordering::SeqCst)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Orchestrator side: busy-poll until every worker has checked in,
    /// failing with `SetupTimeout` once `timeout` has elapsed
    pub fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.ready() >= self.expected {
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(BenchError::SetupTimeout {
                    ready: self.ready(),
                    expected: self.expected,
                    waited_ms: waited.as_millis(),
                });
            }
            std::hint::spin_loop();
        }
    }

    /// Open the gate. A no-op after `abort`, so a cancelled run can never
    /// be released late.
    pub fn release(&self) {
        let _ = self
            .gate
            .value
            .compare_exchange(HOLD, GO, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Cancel the run, freeing spinning workers. A no-op after `release`.
    pub fn abort(&self) {
        let _ = self
            .gate
            .value
            .compare_exchange(HOLD, ABORT, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Restore the initial state for another run. Exclusive access makes
    /// this safe to call only once all workers are joined.
    pub fn reset(&mut self) {
        self.ready.value.store(0, Ordering::SeqCst);
        self.gate.value.store(HOLD, Ordering::SeqCst);
    }
}
