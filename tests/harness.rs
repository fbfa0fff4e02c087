//! End-to-end properties of the measurement harness: pinned multi-worker
//! runs reproduce their checksums, cache policies order timings the expected
//! way, and prefetch hints never alter results.

use smtbench::prefetch::prefetch_read_t0;
use smtbench::{
    run, run_current, AlignedBuffer, BenchError, CachePolicy, CpuId, CpuTopology, IndexSequence,
    WorkerSpec,
};

const PAIR_WORKING_SET: usize = 8 * 1024 * 1024 / std::mem::size_of::<u64>();

fn pair(topology: &CpuTopology) -> (CpuId, CpuId) {
    // Prefer hardware siblings; any two CPUs (or a degenerate self-pair)
    // still exercise the run protocol on hosts without SMT
    if let Some(siblings) = topology.first_smt_pair() {
        return siblings;
    }
    let ids = topology.cpu_ids();
    if ids.len() > 1 {
        (ids[0], ids[1])
    } else {
        (ids[0], ids[0])
    }
}

/// Line-granular read-modify-write walk, deterministic for a fixed fill
fn strided_sum(buf: &mut [u64]) -> u64 {
    let mut sum = 0u64;
    for i in (0..buf.len()).step_by(64) {
        sum = sum.wrapping_add(buf[i]);
        buf[i] = sum;
    }
    sum
}

fn gather(data: &[u64], seq: &IndexSequence, distance: usize) -> u64 {
    let mut sum = 0u64;
    if distance == 0 {
        for i in 0..seq.accesses() {
            sum = sum.wrapping_add(data[seq.at(i)]);
        }
    } else {
        for i in 0..seq.accesses() {
            prefetch_read_t0(data, seq.at(i + distance));
            sum = sum.wrapping_add(data[seq.at(i)]);
        }
    }
    sum
}

#[test]
fn test_two_worker_run_reproduces_checksums() {
    let topology = CpuTopology::detect();
    let (cpu_a, cpu_b) = pair(&topology);

    let mut checksums = Vec::new();
    for _ in 0..2 {
        let mut buf_a = AlignedBuffer::<u64>::new(PAIR_WORKING_SET).unwrap();
        let mut buf_b = AlignedBuffer::<u64>::new(PAIR_WORKING_SET).unwrap();
        buf_a.fill_bytes(0x55);
        buf_b.fill_bytes(0xAA);

        let report = run(
            vec![
                WorkerSpec::new(cpu_a, buf_a.as_mut_slice(), strided_sum),
                WorkerSpec::new(cpu_b, buf_b.as_mut_slice(), strided_sum),
            ],
            CachePolicy::Warm,
        )
        .unwrap();

        assert_eq!(report.workers.len(), 2);
        assert!(
            report.wall_secs >= report.max_worker_secs(),
            "wall time {} must cover the slowest worker {}",
            report.wall_secs,
            report.max_worker_secs()
        );
        #[cfg(target_os = "linux")]
        assert!(report.all_pinned(), "a worker drifted off its pinned CPU");

        checksums.push((report.workers[0].checksum, report.workers[1].checksum));
    }

    assert_eq!(
        checksums[0], checksums[1],
        "identical inputs must reproduce identical checksums"
    );
    assert_ne!(
        checksums[0].0, checksums[0].1,
        "distinct fills must produce distinct checksums"
    );
}

#[test]
#[cfg(target_arch = "x86_64")]
fn test_cold_runs_slower_than_warm() {
    const ELEMENTS: usize = 2 * 1024 * 1024 / std::mem::size_of::<u64>();

    let topology = CpuTopology::detect();
    let cpu = topology.cpu_ids()[0];
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS).unwrap();
    buf.fill_sequential();

    let warm = best_of_three(cpu, &mut buf, CachePolicy::Warm);
    let cold = best_of_three(cpu, &mut buf, CachePolicy::Cold);

    assert!(
        cold > warm,
        "flushed run ({:.6}s) should be slower than resident run ({:.6}s)",
        cold,
        warm
    );
}

#[cfg(target_arch = "x86_64")]
fn best_of_three(cpu: CpuId, buf: &mut AlignedBuffer<u64>, policy: CachePolicy) -> f64 {
    let mut best = f64::MAX;
    for _ in 0..3 {
        // Touch every element so the warm runs really start resident; the
        // cold policy flushes this right back out
        let touch = buf.as_slice().iter().fold(0u64, |acc, &v| acc.wrapping_add(v));
        std::hint::black_box(touch);

        let result = run_current(cpu, buf.as_mut_slice(), policy, |data| {
            data.iter().fold(0u64, |acc, &v| acc.wrapping_add(v))
        })
        .unwrap();
        best = best.min(result.elapsed_secs);
    }
    best
}

#[test]
fn test_prefetch_distance_never_changes_checksums() {
    const ELEMENTS: usize = 1 << 16;
    const ACCESSES: usize = 50_000;
    const LOOKAHEAD: usize = 64;

    let topology = CpuTopology::detect();
    let cpu = topology.cpu_ids()[0];
    let seq = IndexSequence::generate(2024, ACCESSES, LOOKAHEAD, ELEMENTS).unwrap();
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS).unwrap();
    buf.fill_sequential();

    let mut checksums = Vec::new();
    for distance in [0usize, 1, 8, 64] {
        let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Cold, |data| {
            gather(data, &seq, distance)
        })
        .unwrap();
        checksums.push(result.checksum);
    }

    assert!(
        checksums.windows(2).all(|w| w[0] == w[1]),
        "prefetch distance changed a read-only checksum: {:?}",
        checksums
    );
}

#[test]
fn test_single_worker_paths_agree() {
    let topology = CpuTopology::detect();
    let cpu = topology.cpu_ids()[0];

    let mut direct_buf = AlignedBuffer::<u64>::new(1 << 14).unwrap();
    direct_buf.fill_bytes(0x5A);
    let direct = run_current(cpu, direct_buf.as_mut_slice(), CachePolicy::Warm, strided_sum)
        .unwrap();

    let mut spawned_buf = AlignedBuffer::<u64>::new(1 << 14).unwrap();
    spawned_buf.fill_bytes(0x5A);
    let report = run(
        vec![WorkerSpec::new(cpu, spawned_buf.as_mut_slice(), strided_sum)],
        CachePolicy::Warm,
    )
    .unwrap();

    assert_eq!(
        direct.checksum, report.workers[0].checksum,
        "the in-place and spawned paths must agree on the same workload"
    );
}

#[test]
fn test_invalid_placement_rejected_before_any_work() {
    let topology = CpuTopology::detect();
    let cpu = topology.cpu_ids()[0];
    let mut buf_a = AlignedBuffer::<u64>::new(64).unwrap();
    let mut buf_b = AlignedBuffer::<u64>::new(64).unwrap();

    let err = run(
        vec![
            WorkerSpec::new(cpu, buf_a.as_mut_slice(), |_buf| 1),
            WorkerSpec::new(1 << 20, buf_b.as_mut_slice(), |_buf| {
                unreachable!("workload must not run for a rejected placement")
            }),
        ],
        CachePolicy::Warm,
    )
    .unwrap_err();

    match err {
        BenchError::InvalidCpu { cpu, limit } => {
            assert_eq!(cpu, 1 << 20);
            assert!(limit < 1 << 20);
        }
        other => panic!("expected InvalidCpu, got {:?}", other),
    }
}
