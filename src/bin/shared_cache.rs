//! Constructive cache sharing between SMT siblings.
//!
//! A 16 KB array fits in L1 with room to spare. Two workers sweeping
//! disjoint halves of it from the same physical core populate one shared
//! cache; each worker's loads hit lines the sibling already pulled in.
//! On distinct cores each half is small enough to stay resident anyway,
//! so the comparison isolates the sharing effect.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin shared_cache
//! cargo run --release --bin shared_cache -- --same-core
//! ```

use smtbench::platform::{cpu_model, l1d_cache_kb, warn_if_scaling_governor};
use smtbench::report::{format_ops, ops_per_sec};
use smtbench::{
    run, run_current, AlignedBuffer, BenchResult, CachePolicy, CpuId, CpuTopology, WorkerSpec,
};

const ARRAY_BYTES: usize = 16 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / std::mem::size_of::<u64>();
const ITERATIONS: usize = 100_000;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("--all");

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                  Shared Cache Cooperation Test                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!(
        "Array size: {} KB ({} elements)",
        ARRAY_BYTES / 1024,
        ELEMENTS
    );
    if let Some(kb) = l1d_cache_kb() {
        println!("L1 D-Cache: {} KB", kb);
    }
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
            println!("Expected benefits of same-core SMT here:");
            println!("  - Both halves live in the one L1 the siblings share");
            println!("  - A line pulled in by either worker serves both");
            println!("  - No cross-core coherence traffic on the array");
            Ok(())
        }
        _ => {
            println!(
                "Usage: {} [--same-core | --diff-core | --single | --all]",
                program
            );
            std::process::exit(1);
        }
    }
}

fn run_single(topology: &CpuTopology) -> BenchResult<()> {
    println!("\n=== Single Worker Baseline (full array) ===");

    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_sequential();
    let cpu = topology.cpu_ids()[0];

    let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Warm, sweep)?;
    println!("Result: {}", result.checksum);
    println!("Time: {:.4} seconds", result.elapsed_secs);
    print_throughput(ELEMENTS, result.elapsed_secs);
    Ok(())
}

fn run_same_core(topology: &CpuTopology) -> BenchResult<()> {
    match topology.first_smt_pair() {
        Some((a, b)) => run_pair(
            (a, b),
            &format!("Same Core SMT (CPU {},{}) - Shared L1/L2", a, b),
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
            &format!("Different Cores (CPU {},{}) - Private L1/L2", a, b),
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
        "CPU binding: thread A -> CPU{}, thread B -> CPU{}",
        cpus.0, cpus.1
    );

    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_sequential();
    let (lower, upper) = buf.as_mut_slice().split_at_mut(ELEMENTS / 2);

    let report = run(
        vec![
            WorkerSpec::new(cpus.0, lower, sweep),
            WorkerSpec::new(cpus.1, upper, sweep),
        ],
        CachePolicy::Warm,
    )?;

    println!(
        "Thread A (lower half): Result={}, Time={:.4} sec",
        report.workers[0].checksum, report.workers[0].elapsed_secs
    );
    println!(
        "Thread B (upper half): Result={}, Time={:.4} sec",
        report.workers[1].checksum, report.workers[1].elapsed_secs
    );
    println!("Wall time: {:.4} seconds", report.wall_secs);
    print_throughput(ELEMENTS, report.wall_secs);
    Ok(())
}

/// Accumulate and write back every element, ITERATIONS passes over the slice
fn sweep(buf: &mut [u64]) -> u64 {
    let mut sum = 0u64;
    for _ in 0..ITERATIONS {
        for slot in buf.iter_mut() {
            sum = sum.wrapping_add(*slot);
            *slot = sum & 0xFF;
        }
    }
    sum
}

fn print_throughput(elements: usize, secs: f64) {
    let ops = (elements * ITERATIONS) as u64;
    println!("Throughput: {}", format_ops(ops_per_sec(ops, secs)));
}
