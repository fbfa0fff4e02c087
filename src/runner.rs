//! Pinned-worker benchmark orchestration.
//!
//! A run takes one [`WorkerSpec`] per worker: the logical CPU to pin, the
//! buffer the workload owns for the duration, and the workload itself.
//! Workers bind, check in at the start barrier, and are released together;
//! each times only its own workload and reports a checksum so results can
//! be compared across runs and variants. The orchestrator times the whole
//! span from release to last join.
//!
//! Failure handling: bind rejection or a missing worker aborts the barrier
//! gate so nobody spins forever, and `std::thread::scope` joins every
//! spawned worker before any error propagates. A bind error outranks the
//! generic setup timeout when both apply.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::affinity::{self, CpuId};
use crate::barrier::StartBarrier;
use crate::cache::CachePolicy;
use crate::error::{BenchError, Result};
use crate::timing::{serialize, Stopwatch};
use crate::topology::CpuTopology;

/// Setup deadline applied by [`run`]
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Workload run by one worker: receives its buffer, returns a checksum
pub type Workload<'a, T> = Box<dyn FnOnce(&mut [T]) -> u64 + Send + 'a>;

/// One worker's placement, working set, and workload
pub struct WorkerSpec<'a, T = u64> {
    pub cpu: CpuId,
    pub buffer: &'a mut [T],
    pub workload: Workload<'a, T>,
}

impl<'a, T> WorkerSpec<'a, T> {
    pub fn new<F>(cpu: CpuId, buffer: &'a mut [T], workload: F) -> Self
    where
        F: FnOnce(&mut [T]) -> u64 + Send + 'a,
    {
        Self {
            cpu,
            buffer,
            workload: Box::new(workload),
        }
    }
}

/// Timing and verification data for one completed worker
#[derive(Debug, Clone, Copy)]
pub struct TimingResult {
    /// CPU the worker was asked to run on
    pub cpu: CpuId,
    /// CPU the OS reported after binding, when readable
    pub observed_cpu: Option<CpuId>,
    /// Seconds spent inside the workload, fenced on both edges
    pub elapsed_secs: f64,
    /// Workload checksum, deterministic for a deterministic workload
    pub checksum: u64,
}

impl TimingResult {
    /// True unless the OS reported a different CPU than requested
    pub fn pinned_ok(&self) -> bool {
        self.observed_cpu.map_or(true, |observed| observed == self.cpu)
    }
}

/// Results of a full run, workers in spec order
#[derive(Debug, Clone)]
pub struct RunReport {
    pub workers: Vec<TimingResult>,
    /// Seconds from barrier release to the last worker joined
    pub wall_secs: f64,
}

impl RunReport {
    /// Slowest single worker
    pub fn max_worker_secs(&self) -> f64 {
        self.workers
            .iter()
            .map(|w| w.elapsed_secs)
            .fold(0.0, f64::max)
    }

    /// True when every worker stayed where it was pinned
    pub fn all_pinned(&self) -> bool {
        self.workers.iter().all(|w| w.pinned_ok())
    }
}

/// Run a set of pinned workers with the default setup deadline
pub fn run<T: Send>(specs: Vec<WorkerSpec<'_, T>>, policy: CachePolicy) -> Result<RunReport> {
    run_with_timeout(specs, policy, DEFAULT_SETUP_TIMEOUT)
}

/// Run a set of pinned workers, failing if setup outlasts `timeout`
pub fn run_with_timeout<T: Send>(
    specs: Vec<WorkerSpec<'_, T>>,
    policy: CachePolicy,
    timeout: Duration,
) -> Result<RunReport> {
    let topology = CpuTopology::detect();
    for spec in &specs {
        if !topology.contains(spec.cpu) {
            return Err(BenchError::InvalidCpu {
                cpu: spec.cpu,
                limit: topology.id_limit(),
            });
        }
    }

    // Cache state is prepared before any worker exists, so flush cost can
    // never leak into a timed region
    for spec in &specs {
        policy.apply(&*spec.buffer);
    }

    let cpus: Vec<CpuId> = specs.iter().map(|s| s.cpu).collect();
    let barrier = StartBarrier::new(specs.len());
    let bind_failures = AtomicUsize::new(0);

    std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(cpus.len());
        for (index, spec) in specs.into_iter().enumerate() {
            let barrier = &barrier;
            let bind_failures = &bind_failures;
            handles.push(s.spawn(move || worker_body(index, spec, barrier, bind_failures)));
        }

        match wait_for_ready(&barrier, &bind_failures, timeout) {
            Ok(()) => {
                let wall = Stopwatch::start();
                serialize();
                barrier.release();

                let mut workers = Vec::with_capacity(handles.len());
                let mut panicked = None;
                for (index, handle) in handles.into_iter().enumerate() {
                    match handle.join() {
                        Ok(Ok(result)) => workers.push(result),
                        Ok(Err(err)) => return Err(err),
                        Err(_) => {
                            panicked.get_or_insert(index);
                        }
                    }
                }
                let wall_secs = wall.elapsed_secs();

                if let Some(index) = panicked {
                    return Err(BenchError::WorkerPanicked {
                        index,
                        cpu: cpus[index],
                    });
                }
                Ok(RunReport { workers, wall_secs })
            }
            Err(setup_err) => {
                barrier.abort();
                // Scope joins the workers; surface the most specific cause
                let mut bind_err = None;
                for handle in handles {
                    if let Ok(Err(err @ BenchError::BindRejected { .. })) = handle.join() {
                        bind_err.get_or_insert(err);
                    }
                }
                Err(bind_err.unwrap_or(setup_err))
            }
        }
    })
}

/// Bind the calling thread and time `workload` on it, without spawning.
/// The single-worker path used by the sequential experiments.
pub fn run_current<T, F>(
    cpu: CpuId,
    buffer: &mut [T],
    policy: CachePolicy,
    workload: F,
) -> Result<TimingResult>
where
    F: FnOnce(&mut [T]) -> u64,
{
    let topology = CpuTopology::detect();
    if !topology.contains(cpu) {
        return Err(BenchError::InvalidCpu {
            cpu,
            limit: topology.id_limit(),
        });
    }

    affinity::bind_current_thread(cpu)?;
    let observed_cpu = affinity::current_cpu();
    policy.apply(buffer);

    serialize();
    let sw = Stopwatch::start();
    let checksum = std::hint::black_box(workload(buffer));
    serialize();
    let elapsed_secs = sw.elapsed_secs();

    Ok(TimingResult {
        cpu,
        observed_cpu,
        elapsed_secs,
        checksum,
    })
}

fn worker_body<T>(
    index: usize,
    spec: WorkerSpec<'_, T>,
    barrier: &StartBarrier,
    bind_failures: &AtomicUsize,
) -> Result<TimingResult> {
    let WorkerSpec {
        cpu,
        buffer,
        workload,
    } = spec;

    if let Err(err) = affinity::bind_current_thread(cpu) {
        bind_failures.fetch_add(1, Ordering::SeqCst);
        return Err(err);
    }

    let observed_cpu = affinity::current_cpu();
    if let Some(observed) = observed_cpu {
        if observed != cpu {
            log::warn!(
                "worker {} bound to cpu {} but the OS reports cpu {}",
                index,
                cpu,
                observed
            );
        }
    }
    log::debug!("worker {} ready on cpu {}", index, cpu);

    if !barrier.arrive_and_wait() {
        return Err(BenchError::Cancelled);
    }

    serialize();
    let sw = Stopwatch::start();
    let checksum = std::hint::black_box(workload(buffer));
    serialize();
    let elapsed_secs = sw.elapsed_secs();

    Ok(TimingResult {
        cpu,
        observed_cpu,
        elapsed_secs,
        checksum,
    })
}

/// Poll for full readiness, bailing early on a reported bind failure
fn wait_for_ready(
    barrier: &StartBarrier,
    bind_failures: &AtomicUsize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        if bind_failures.load(Ordering::SeqCst) > 0 {
            return Err(BenchError::Cancelled);
        }
        if barrier.ready() >= barrier.expected() {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(BenchError::SetupTimeout {
                ready: barrier.ready(),
                expected: barrier.expected(),
                waited_ms: waited.as_millis(),
            });
        }
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AlignedBuffer;

    fn two_cpus() -> (CpuId, CpuId) {
        let topology = CpuTopology::detect();
        let ids = topology.cpu_ids();
        if ids.len() > 1 {
            (ids[0], ids[1])
        } else {
            (ids[0], ids[0])
        }
    }

    #[test]
    fn test_two_worker_run() {
        let (cpu_a, cpu_b) = two_cpus();
        let mut buf_a = AlignedBuffer::<u64>::new(4096).unwrap();
        let mut buf_b = AlignedBuffer::<u64>::new(4096).unwrap();
        buf_a.fill_bytes(0x55);
        buf_b.fill_bytes(0xAA);

        let sum_all = |buf: &mut [u64]| buf.iter().fold(0u64, |acc, &v| acc.wrapping_add(v));

        let report = run(
            vec![
                WorkerSpec::new(cpu_a, buf_a.as_mut_slice(), sum_all),
                WorkerSpec::new(cpu_b, buf_b.as_mut_slice(), sum_all),
            ],
            CachePolicy::Warm,
        )
        .unwrap();

        assert_eq!(report.workers.len(), 2);
        assert_eq!(report.workers[0].cpu, cpu_a);
        assert_eq!(report.workers[1].cpu, cpu_b);
        assert_ne!(report.workers[0].checksum, report.workers[1].checksum);
        // Wall span opens before release and closes after the last join
        assert!(report.wall_secs >= report.max_worker_secs());
        #[cfg(target_os = "linux")]
        assert!(report.all_pinned());
    }

    #[test]
    fn test_checksums_deterministic_across_runs() {
        let (cpu_a, cpu_b) = two_cpus();
        let mut checksums = Vec::new();

        for _ in 0..2 {
            let mut buf_a = AlignedBuffer::<u64>::new(1024).unwrap();
            let mut buf_b = AlignedBuffer::<u64>::new(1024).unwrap();
            buf_a.fill_bytes(0x55);
            buf_b.fill_bytes(0xAA);

            let walk = |buf: &mut [u64]| {
                let mut sum = 0u64;
                for i in (0..buf.len()).step_by(8) {
                    sum = sum.wrapping_add(buf[i]);
                    buf[i] = sum;
                }
                sum
            };

            let report = run(
                vec![
                    WorkerSpec::new(cpu_a, buf_a.as_mut_slice(), walk),
                    WorkerSpec::new(cpu_b, buf_b.as_mut_slice(), walk),
                ],
                CachePolicy::Warm,
            )
            .unwrap();
            checksums.push((report.workers[0].checksum, report.workers[1].checksum));
        }

        assert_eq!(checksums[0], checksums[1]);
    }

    #[test]
    fn test_invalid_cpu_fails_before_spawn() {
        let mut buf = AlignedBuffer::<u64>::new(64).unwrap();
        let err = run(
            vec![WorkerSpec::new(1 << 20, buf.as_mut_slice(), |_buf| 0)],
            CachePolicy::Warm,
        )
        .unwrap_err();

        match err {
            BenchError::InvalidCpu { cpu, .. } => assert_eq!(cpu, 1 << 20),
            other => panic!("expected InvalidCpu, got {:?}", other),
        }
    }

    #[test]
    fn test_worker_panic_is_reported_after_joins() {
        let (cpu_a, cpu_b) = two_cpus();
        let mut buf_a = AlignedBuffer::<u64>::new(64).unwrap();
        let mut buf_b = AlignedBuffer::<u64>::new(64).unwrap();

        let err = run(
            vec![
                WorkerSpec::new(cpu_a, buf_a.as_mut_slice(), |buf| {
                    buf.iter().sum::<u64>()
                }),
                WorkerSpec::new(cpu_b, buf_b.as_mut_slice(), |_buf| -> u64 {
                    panic!("injected workload failure")
                }),
            ],
            CachePolicy::Warm,
        )
        .unwrap_err();

        match err {
            BenchError::WorkerPanicked { index, cpu } => {
                assert_eq!(index, 1);
                assert_eq!(cpu, cpu_b);
            }
            other => panic!("expected WorkerPanicked, got {:?}", other),
        }
    }

    #[test]
    fn test_run_current_deterministic() {
        let cpu = CpuTopology::detect().cpu_ids()[0];
        let mut checksums = Vec::new();
        for _ in 0..2 {
            let mut buf = AlignedBuffer::<u64>::new(2048).unwrap();
            buf.fill_sequential();
            let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Warm, |buf| {
                buf.iter().fold(0u64, |acc, &v| acc.wrapping_add(v * 3))
            })
            .unwrap();
            assert_eq!(result.cpu, cpu);
            assert!(result.elapsed_secs >= 0.0);
            checksums.push(result.checksum);
        }
        assert_eq!(checksums[0], checksums[1]);
    }

    #[test]
    fn test_cold_policy_preserves_data() {
        let cpu = CpuTopology::detect().cpu_ids()[0];
        let mut buf = AlignedBuffer::<u64>::new(1024).unwrap();
        buf.fill_sequential();
        let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Cold, |buf| {
            buf.iter().fold(0u64, |acc, &v| acc.wrapping_add(v))
        })
        .unwrap();
        // Sum of 0..1024
        assert_eq!(result.checksum, 1023 * 1024 / 2);
    }
}
