//! Memory latency hiding through SMT.
//!
//! Pairs a pure floating point worker with a random-walk memory worker.
//! The memory worker stalls on DRAM most of the time; an SMT sibling can
//! issue the compute worker's instructions into those stall cycles. The
//! interesting comparison is the overlapped wall time against running the
//! two workloads back to back on one thread.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin latency_hiding
//! cargo run --release --bin latency_hiding -- --same-core
//! ```

use smtbench::platform::{cpu_model, warn_if_scaling_governor};
use smtbench::report::speedup;
use smtbench::{
    run, run_current, AlignedBuffer, BenchResult, CachePolicy, CpuId, CpuTopology, Lcg, WorkerSpec,
};

const ARRAY_BYTES: usize = 64 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / std::mem::size_of::<u64>();
const COMPUTE_ITERATIONS: usize = 10_000_000;
const MEMORY_ACCESSES: usize = 5_000_000;
const MEMORY_SEED: u64 = 12345;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("--all");

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                  Memory Latency Hiding Test                      ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!("Array size: {} MB", ARRAY_BYTES / (1024 * 1024));
    println!("Compute iterations: {}", COMPUTE_ITERATIONS);
    println!("Memory accesses: {}", MEMORY_ACCESSES);

    if let Err(err) = dispatch(mode, &args[0], &topology) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn dispatch(mode: &str, program: &str, topology: &CpuTopology) -> BenchResult<()> {
    match mode {
        "--same-core" => run_same_core(topology).map(|_| ()),
        "--diff-core" => run_diff_core(topology).map(|_| ()),
        "--single" => run_serial(topology).map(|_| ()),
        "--all" => {
            run_compute_only(topology)?;
            run_memory_only(topology)?;
            let serial_secs = run_serial(topology)?;
            let same_secs = run_same_core(topology)?;
            let diff_secs = run_diff_core(topology)?;

            println!("\n=== Analysis ===");
            println!("Serial baseline: {:.4} sec", serial_secs);
            if let Some(secs) = same_secs {
                println!(
                    "Same-core SMT overlap: {:.4} sec ({:.2}x vs serial)",
                    secs,
                    speedup(serial_secs, secs)
                );
            }
            if let Some(secs) = diff_secs {
                println!(
                    "Distinct-core overlap: {:.4} sec ({:.2}x vs serial)",
                    secs,
                    speedup(serial_secs, secs)
                );
            }
            println!("SMT hides latency when the overlapped wall time beats the serial");
            println!("baseline; the compute worker runs in the memory worker's stalls.");
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

fn run_compute_only(topology: &CpuTopology) -> BenchResult<()> {
    println!("\n=== Compute Only (single thread) ===");

    let mut scratch: [u64; 0] = [];
    let cpu = topology.cpu_ids()[0];
    let result = run_current(cpu, &mut scratch[..], CachePolicy::Warm, |_buf| {
        compute_intensive()
    })?;
    println!("Compute: Result={}, Time={:.4} sec", result.checksum, result.elapsed_secs);
    Ok(())
}

fn run_memory_only(topology: &CpuTopology) -> BenchResult<()> {
    println!("\n=== Memory Only (single thread) ===");

    let mut buf = allocate()?;
    let cpu = topology.cpu_ids()[0];
    let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Warm, memory_intensive)?;
    println!("Memory:  Result={}, Time={:.4} sec", result.checksum, result.elapsed_secs);
    Ok(())
}

/// Both workloads back to back on one thread; the bar the SMT runs must clear.
fn run_serial(topology: &CpuTopology) -> BenchResult<f64> {
    println!("\n=== Serial Baseline (compute then memory, one thread) ===");

    let mut buf = allocate()?;
    let cpu = topology.cpu_ids()[0];
    let mut compute_result = 0u64;
    let mut memory_result = 0u64;

    let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Warm, |data| {
        compute_result = compute_intensive();
        memory_result = memory_intensive(data);
        compute_result ^ memory_result
    })?;

    println!("Compute result: {}", compute_result);
    println!("Memory result: {}", memory_result);
    println!("Total time: {:.4} sec", result.elapsed_secs);
    Ok(result.elapsed_secs)
}

fn run_same_core(topology: &CpuTopology) -> BenchResult<Option<f64>> {
    match topology.first_smt_pair() {
        Some((a, b)) => run_pair(
            (a, b),
            &format!("Same Core SMT (CPU {},{}) - Latency Hiding", a, b),
        )
        .map(Some),
        None => {
            println!("\nHost topology has no SMT siblings; skipping the same-core run.");
            Ok(None)
        }
    }
}

fn run_diff_core(topology: &CpuTopology) -> BenchResult<Option<f64>> {
    match topology.two_distinct_cores() {
        Some((a, b)) => run_pair((a, b), &format!("Different Cores (CPU {},{})", a, b)).map(Some),
        None => {
            println!("\nHost topology has a single core; skipping the cross-core run.");
            Ok(None)
        }
    }
}

fn run_pair(cpus: (CpuId, CpuId), title: &str) -> BenchResult<f64> {
    println!("\n=== {} ===", title);
    println!(
        "CPU binding: compute -> CPU{}, memory -> CPU{}",
        cpus.0, cpus.1
    );

    let mut buf = allocate()?;
    let mut scratch: [u64; 0] = [];

    let report = run(
        vec![
            WorkerSpec::new(cpus.0, &mut scratch[..], |_buf: &mut [u64]| {
                compute_intensive()
            }),
            WorkerSpec::new(cpus.1, buf.as_mut_slice(), memory_intensive),
        ],
        CachePolicy::Warm,
    )?;

    println!(
        "Compute: Result={}, Time={:.4} sec",
        report.workers[0].checksum, report.workers[0].elapsed_secs
    );
    println!(
        "Memory:  Result={}, Time={:.4} sec",
        report.workers[1].checksum, report.workers[1].elapsed_secs
    );
    println!("Wall time: {:.4} seconds", report.wall_secs);
    Ok(report.wall_secs)
}

fn allocate() -> BenchResult<AlignedBuffer<u64>> {
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_bytes(0x55);
    Ok(buf)
}

/// Transcendental chain with no memory traffic beyond the stack
fn compute_intensive() -> u64 {
    let mut value = 1.0f64;
    for _ in 0..COMPUTE_ITERATIONS {
        value = value.sin() * value.cos() + (value.abs() + 1.0).sqrt();
        value = (value.abs() + 1.0).ln() * (-value.abs() * 0.001).exp();
    }
    (value * 1_000_000.0) as u64
}

/// Random walk over the full array; bounded by DRAM latency, not the core
fn memory_intensive(buf: &mut [u64]) -> u64 {
    let mut lcg = Lcg::new(MEMORY_SEED);
    let mut sum = 0u64;
    for _ in 0..MEMORY_ACCESSES {
        let idx = lcg.next_index(buf.len());
        sum = sum.wrapping_add(buf[idx]);
        buf[idx] = sum;
    }
    sum
}
