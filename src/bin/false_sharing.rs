//! False sharing demonstration.
//!
//! Four workers pinned to distinct physical cores each increment a private
//! counter. In the packed layout all four counters sit in one cache line, so
//! every store invalidates the line in the other cores and each increment
//! pays a coherence round trip. The padded layout gives each counter a full
//! line of its own and the traffic disappears.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin false_sharing             # both layouts
//! cargo run --release --bin false_sharing -- --bad    # packed counters
//! cargo run --release --bin false_sharing -- --good   # padded counters
//! ```

use smtbench::buffer::Pod;
use smtbench::platform::{cpu_model, warn_if_scaling_governor};
use smtbench::report::{format_ops, ops_per_sec};
use smtbench::{
    run, AlignedBuffer, BenchResult, CachePadded, CachePolicy, CpuId, CpuTopology, WorkerSpec,
    CACHE_LINE_SIZE,
};

const NUM_WORKERS: usize = 4;
const ITERATIONS: u64 = 100_000_000;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("--all");

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                   False Sharing Demonstration                    ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!("Cache line size: {} bytes", CACHE_LINE_SIZE);
    println!(
        "Packed layout: {} counters in {} bytes (one shared line)",
        NUM_WORKERS,
        std::mem::size_of::<u64>() * NUM_WORKERS
    );
    println!(
        "Padded layout: {} counters in {} bytes (one line each)",
        NUM_WORKERS,
        std::mem::size_of::<CachePadded<u64>>() * NUM_WORKERS
    );

    if let Err(err) = dispatch(mode, &args[0], &topology) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn dispatch(mode: &str, program: &str, topology: &CpuTopology) -> BenchResult<()> {
    let cpus = pick_cpus(topology);

    match mode {
        "--bad" => run_packed(&cpus),
        "--good" => run_padded(&cpus),
        "--all" => {
            run_packed(&cpus)?;
            run_padded(&cpus)?;

            println!("\n=== Analysis ===");
            println!("False sharing occurs when:");
            println!("- Multiple threads modify different variables");
            println!("- Those variables share the same cache line");
            println!("- Each write invalidates the line in every other core");
            println!();
            println!("Fix: give each hot counter a full cache line (CachePadded).");
            Ok(())
        }
        _ => {
            println!("Usage: {} [--bad | --good | --all]", program);
            std::process::exit(1);
        }
    }
}

fn run_packed(cpus: &[CpuId]) -> BenchResult<()> {
    let mut counters = AlignedBuffer::<u64>::new(NUM_WORKERS)?;
    run_layout(cpus, &mut counters, "Packed Counters (False Sharing)", |slot| slot)
}

fn run_padded(cpus: &[CpuId]) -> BenchResult<()> {
    let mut counters = AlignedBuffer::<CachePadded<u64>>::new(NUM_WORKERS)?;
    run_layout(
        cpus,
        &mut counters,
        "Padded Counters (No False Sharing)",
        |slot| &mut slot.value,
    )
}

fn run_layout<T: Pod + Send>(
    cpus: &[CpuId],
    counters: &mut AlignedBuffer<T>,
    title: &str,
    counter_of: fn(&mut T) -> &mut u64,
) -> BenchResult<()> {
    println!("\n=== {} ===", title);

    let specs: Vec<WorkerSpec<'_, T>> = counters
        .as_mut_slice()
        .chunks_mut(1)
        .zip(cpus.iter().copied())
        .map(|(slot, cpu)| {
            WorkerSpec::new(cpu, slot, move |buf: &mut [T]| {
                increment_volatile(counter_of(&mut buf[0]))
            })
        })
        .collect();

    let report = run(specs, CachePolicy::Warm)?;

    println!(
        "Threads: {}, Iterations per thread: {}",
        cpus.len(),
        ITERATIONS
    );
    println!("Thread times:");
    for (i, worker) in report.workers.iter().enumerate() {
        println!(
            "  Thread {} (cpu {}): {:.4} sec",
            i, worker.cpu, worker.elapsed_secs
        );
    }
    println!("Wall time: {:.4} seconds", report.wall_secs);
    let rate = ops_per_sec(ITERATIONS * cpus.len() as u64, report.wall_secs);
    println!("Rate: {}", format_ops(rate));

    if report.workers.iter().any(|w| w.checksum != ITERATIONS) {
        log::warn!("final counter values drifted from the expected {}", ITERATIONS);
    }
    Ok(())
}

/// Volatile keeps every increment a real load and store; the counter would
/// otherwise fold into a register for the whole loop.
fn increment_volatile(counter: &mut u64) -> u64 {
    let ptr = counter as *mut u64;
    let mut last = 0;
    for _ in 0..ITERATIONS {
        unsafe {
            last = ptr.read_volatile().wrapping_add(1);
            ptr.write_volatile(last);
        }
    }
    last
}

fn pick_cpus(topology: &CpuTopology) -> Vec<CpuId> {
    if let Some(cpus) = topology.distinct_cores(NUM_WORKERS) {
        return cpus;
    }
    log::warn!(
        "host has fewer than {} physical cores; reusing logical CPUs",
        NUM_WORKERS
    );
    let ids = topology.cpu_ids();
    (0..NUM_WORKERS).map(|i| ids[i % ids.len()]).collect()
}
