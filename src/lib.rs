//! # smtbench
//!
//! Controlled experiments measuring how SMT hardware threads interact
//! through the cache hierarchy: contention between siblings, cooperation on
//! shared working sets, and the effectiveness of software prefetching.
//!
//! ## Architecture
//!
//! - **src/**: the measurement harness (pinning, synchronized start, cache
//!   state, deterministic patterns, timing)
//! - **src/bin/**: one driver per experiment, each a thin composition of
//!   harness pieces around a hand-written workload
//! - **tests/**: integration properties of the harness itself
//!
//! ## Methodology
//!
//! All experiments follow the same discipline:
//! - **Pinned placement**: every worker is bound to an explicit logical CPU
//!   chosen from the discovered topology, and the binding is verified
//! - **Simultaneous start**: workers spin at a barrier and are released
//!   together, so contention windows fully overlap
//! - **Explicit cache state**: cold runs flush the working set line by line
//!   before the timed region; warm runs inherit the fill
//! - **Reproducibility**: random access patterns come from a fixed LCG and
//!   every workload folds its work into a checksum printed next to the time

pub mod affinity;
pub mod barrier;
pub mod buffer;
pub mod cache;
pub mod error;
pub mod pattern;
pub mod platform;
pub mod prefetch;
pub mod report;
pub mod runner;
pub mod timing;
pub mod topology;

// Re-exports for convenience
pub use affinity::{bind_current_thread, bind_thread, current_cpu, CpuId};
pub use barrier::StartBarrier;
pub use buffer::AlignedBuffer;
pub use cache::{invalidate, CachePadded, CachePolicy, CACHE_LINE_SIZE};
pub use error::{BenchError, BenchResult, Result};
pub use pattern::{IndexSequence, Lcg};
pub use prefetch::PrefetchHint;
pub use runner::{
    run, run_current, run_with_timeout, RunReport, TimingResult, WorkerSpec, Workload,
    DEFAULT_SETUP_TIMEOUT,
};
pub use timing::{serialize, Stopwatch};
pub use topology::CpuTopology;
