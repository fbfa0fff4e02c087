//! L1 data-cache contention between hardware threads.
//!
//! Two workers walk private 8 MiB arrays with a cache-line stride, far too
//! large for any private cache, so every access misses. On SMT siblings the
//! two walks evict each other out of the L1/L2 they share; on distinct cores
//! each walk owns its cache hierarchy. A single-worker run is the baseline.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin dcache_contention
//! cargo run --release --bin dcache_contention -- --same-core
//! ```

use smtbench::platform::{cpu_model, l1d_cache_kb, warn_if_scaling_governor};
use smtbench::{
    run, run_current, AlignedBuffer, BenchResult, CachePolicy, CpuId, CpuTopology, WorkerSpec,
};

const ARRAY_BYTES: usize = 8 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / std::mem::size_of::<u64>();
const ITERATIONS: usize = 10;
const STRIDE: usize = 64;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("--all");

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    D-Cache Contention Test                       ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!("Array size: {} MB per worker", ARRAY_BYTES / (1024 * 1024));
    if let Some(kb) = l1d_cache_kb() {
        println!("L1 D-Cache: {} KB (shared by SMT siblings)", kb);
    }
    println!(
        "Stride: {} elements ({} bytes)",
        STRIDE,
        STRIDE * std::mem::size_of::<u64>()
    );
    println!("Iterations: {}", ITERATIONS);

    if let Err(err) = dispatch(mode, &args[0], &topology) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn dispatch(mode: &str, program: &str, topology: &CpuTopology) -> BenchResult<()> {
    match mode {
        "--same-core" => run_same_core(topology),
        "--diff-core" => run_diff_core(topology),
        "--single" => run_single(topology),
        "--all" => {
            run_single(topology)?;
            run_same_core(topology)?;
            run_diff_core(topology)?;

            println!("\n=== Analysis ===");
            println!("Expected: same-core SMT is SLOWER (the walks thrash the shared L1),");
            println!("distinct cores are faster (each walk owns its cache hierarchy).");
            Ok(())
        }
        _ => {
            print_usage(program);
            std::process::exit(1);
        }
    }
}

fn run_single(topology: &CpuTopology) -> BenchResult<()> {
    println!("\n=== Single Worker Baseline ===");

    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_bytes(0x55);
    let cpu = topology.cpu_ids()[0];

    let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Warm, strided_walk)?;
    println!("Result: {}", result.checksum);
    println!("Time: {:.4} seconds", result.elapsed_secs);
    Ok(())
}

fn run_same_core(topology: &CpuTopology) -> BenchResult<()> {
    match topology.first_smt_pair() {
        Some((a, b)) => run_pair(
            (a, b),
            &format!("Same Core SMT (CPU {},{}) - Cache Contention", a, b),
        ),
        None => {
            println!("\nHost topology has no SMT siblings; skipping the same-core run.");
            Ok(())
        }
    }
}

fn run_diff_core(topology: &CpuTopology) -> BenchResult<()> {
    match topology.two_distinct_cores() {
        Some((a, b)) => run_pair(
            (a, b),
            &format!("Different Cores (CPU {},{}) - Independent Caches", a, b),
        ),
        None => {
            println!("\nHost topology has a single core; skipping the cross-core run.");
            Ok(())
        }
    }
}

fn run_pair(cpus: (CpuId, CpuId), title: &str) -> BenchResult<()> {
    println!("\n=== {} ===", title);
    println!(
        "CPU binding: worker 0 -> CPU{}, worker 1 -> CPU{}",
        cpus.0, cpus.1
    );

    let mut buf_a = AlignedBuffer::<u64>::new(ELEMENTS)?;
    let mut buf_b = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf_a.fill_bytes(0x55);
    buf_b.fill_bytes(0xAA);

    let report = run(
        vec![
            WorkerSpec::new(cpus.0, buf_a.as_mut_slice(), strided_walk),
            WorkerSpec::new(cpus.1, buf_b.as_mut_slice(), strided_walk),
        ],
        CachePolicy::Warm,
    )?;

    for (i, worker) in report.workers.iter().enumerate() {
        println!(
            "Thread {}: Result={}, Time={:.4} sec",
            i, worker.checksum, worker.elapsed_secs
        );
    }
    println!("Wall time: {:.4} seconds", report.wall_secs);
    Ok(())
}

/// Line-stride accumulate and write back; every access touches a new line
fn strided_walk(buf: &mut [u64]) -> u64 {
    let mut sum = 0u64;
    for _ in 0..ITERATIONS {
        for i in (0..buf.len()).step_by(STRIDE) {
            sum = sum.wrapping_add(buf[i]);
            buf[i] = sum;
        }
    }
    sum
}

fn print_usage(program: &str) {
    println!(
        "Usage: {} [--same-core | --diff-core | --single | --all]",
        program
    );
    println!();
    println!("Options:");
    println!("  --same-core  Two workers on one physical core (SMT siblings)");
    println!("  --diff-core  Two workers on different physical cores");
    println!("  --single     One worker baseline");
    println!("  --all        Run every placement");
}
