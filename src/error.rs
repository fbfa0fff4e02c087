//! Unified error handling for the experiment harness
//!
//! Every fallible setup step (binding, allocation, barrier synchronization)
//! reports through [`BenchError`] so drivers can distinguish a mis-pinned
//! run from an out-of-memory condition or a worker that never came up.

use thiserror::Error;

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum BenchError {
    /// Requested CPU id does not exist in the detected topology
    #[error("cpu {cpu} is outside the detected topology (0..{limit})")]
    InvalidCpu { cpu: usize, limit: usize },

    /// The OS rejected an affinity request (cpuset restrictions, permissions)
    #[error("binding to cpu {cpu} rejected by the OS: {source}")]
    BindRejected {
        cpu: usize,
        #[source]
        source: std::io::Error,
    },

    /// Aligned buffer allocation failed
    #[error("allocation of {bytes} bytes (align {align}) failed")]
    AllocationFailed { bytes: usize, align: usize },

    /// Workers did not all reach the start barrier before the deadline
    #[error("setup timed out after {waited_ms} ms with {ready}/{expected} workers at the barrier")]
    SetupTimeout {
        ready: usize,
        expected: usize,
        waited_ms: u128,
    },

    /// A worker panicked inside its workload; remaining workers were joined
    #[error("worker {index} (cpu {cpu}) panicked during the timed region")]
    WorkerPanicked { index: usize, cpu: usize },

    /// Worker released by an aborted setup; never surfaced as a run result
    #[error("run cancelled before the timed region started")]
    Cancelled,
}

/// Convenience type alias for Results using BenchError
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Shorthand used within the crate, equivalent to [`BenchResult`]
pub type Result<T> = BenchResult<T>;

// Helper methods
impl BenchError {
    /// Create a bind rejection from a raw errno value
    pub fn bind_rejected(cpu: usize, errno: i32) -> Self {
        BenchError::BindRejected {
            cpu,
            source: std::io::Error::from_raw_os_error(errno),
        }
    }

    /// Create an allocation failure for `bytes` at cache-line alignment
    pub fn allocation(bytes: usize, align: usize) -> Self {
        BenchError::AllocationFailed { bytes, align }
    }
}
