//! Combined effect of SMT co-scheduling and software prefetch.
//!
//! SMT and prefetch both hide memory latency, one by filling stall cycles
//! with another thread's work and one by starting the line fill early.
//! This driver measures a read-modify-write sweep in six configurations
//! (single thread, SMT siblings, distinct cores, each with and without
//! prefetch) to show how far the two techniques stack.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin smt_prefetch_combined
//! ```

use smtbench::platform::{cpu_model, warn_if_scaling_governor};
use smtbench::prefetch::prefetch_write_at;
use smtbench::report::speedup;
use smtbench::{
    run, run_current, AlignedBuffer, BenchResult, CachePolicy, CpuId, CpuTopology, WorkerSpec,
};

const ARRAY_BYTES: usize = 32 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / std::mem::size_of::<u64>();
const PREFETCH_DISTANCE: usize = 16;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        println!("Usage: {} (no arguments; runs every configuration)", args[0]);
        std::process::exit(1);
    }

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                  Combined SMT + Prefetch Test                    ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!(
        "Array size: {} MB per thread ({} elements)",
        ARRAY_BYTES / (1024 * 1024),
        ELEMENTS
    );
    println!("Prefetch distance: {} elements", PREFETCH_DISTANCE);

    if let Err(err) = run_grid(&topology) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run_grid(topology: &CpuTopology) -> BenchResult<()> {
    println!("\nMeasuring configurations (one pass per row)...");

    let single_plain = run_single(topology, false)?;
    let single_pf = run_single(topology, true)?;

    let mut rows: Vec<(String, f64)> = vec![
        ("Single thread, no prefetch".to_string(), single_plain),
        ("Single thread, with prefetch".to_string(), single_pf),
    ];

    let mut same_pair = None;
    match topology.first_smt_pair() {
        Some((a, b)) => {
            let plain = run_dual((a, b), false)?;
            let pf = run_dual((a, b), true)?;
            rows.push((format!("Same core SMT (CPU {},{}), no prefetch", a, b), plain));
            rows.push((format!("Same core SMT (CPU {},{}), with prefetch", a, b), pf));
            same_pair = Some((plain, pf));
        }
        None => println!("Host topology has no SMT siblings; skipping the same-core rows."),
    }

    let mut diff_pair = None;
    match topology.two_distinct_cores() {
        Some((a, b)) => {
            let plain = run_dual((a, b), false)?;
            let pf = run_dual((a, b), true)?;
            rows.push((format!("Different cores (CPU {},{}), no prefetch", a, b), plain));
            rows.push((format!("Different cores (CPU {},{}), with prefetch", a, b), pf));
            diff_pair = Some((plain, pf));
        }
        None => println!("Host topology has a single core; skipping the cross-core rows."),
    }

    println!();
    println!("{:<40} {:>10} {:>10}", "Configuration", "Time(s)", "Speedup");
    println!("{}", "-".repeat(60));
    for (label, secs) in &rows {
        println!(
            "{:<40} {:>10.4} {:>9.2}x",
            label,
            secs,
            speedup(single_plain, *secs)
        );
    }

    println!("\n=== Key Findings ===");
    println!(
        "Prefetch gain, single thread: {:+.1}%",
        improvement(single_plain, single_pf)
    );
    if let Some((plain, pf)) = same_pair {
        println!(
            "Prefetch gain, same-core SMT: {:+.1}%",
            improvement(plain, pf)
        );
    }
    if let Some((plain, pf)) = diff_pair {
        println!(
            "Prefetch gain, distinct cores: {:+.1}%",
            improvement(plain, pf)
        );
    }
    println!("The two techniques compete for the same stall cycles, so their");
    println!("combined gain is usually less than the sum of the parts.");
    Ok(())
}

fn run_single(topology: &CpuTopology, use_prefetch: bool) -> BenchResult<f64> {
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_bytes(0x55);

    let workload = select_workload(use_prefetch);
    let result = run_current(
        topology.cpu_ids()[0],
        buf.as_mut_slice(),
        CachePolicy::Warm,
        workload,
    )?;
    Ok(result.elapsed_secs)
}

fn run_dual(cpus: (CpuId, CpuId), use_prefetch: bool) -> BenchResult<f64> {
    let mut buf_a = AlignedBuffer::<u64>::new(ELEMENTS)?;
    let mut buf_b = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf_a.fill_bytes(0x55);
    buf_b.fill_bytes(0xAA);

    let workload = select_workload(use_prefetch);
    let report = run(
        vec![
            WorkerSpec::new(cpus.0, buf_a.as_mut_slice(), workload),
            WorkerSpec::new(cpus.1, buf_b.as_mut_slice(), workload),
        ],
        CachePolicy::Warm,
    )?;
    Ok(report.wall_secs)
}

fn select_workload(use_prefetch: bool) -> fn(&mut [u64]) -> u64 {
    if use_prefetch {
        process_prefetch
    } else {
        process_plain
    }
}

/// Read-modify-write sweep; every element is loaded and stored once
fn process_plain(buf: &mut [u64]) -> u64 {
    let mut sum = 0u64;
    for i in 0..buf.len() {
        sum = sum.wrapping_add(buf[i]);
        buf[i] = sum & 0xFF;
    }
    sum
}

/// Same sweep with a write prefetch ahead of the store
fn process_prefetch(buf: &mut [u64]) -> u64 {
    let mut sum = 0u64;
    for i in 0..buf.len() {
        prefetch_write_at(buf, i + PREFETCH_DISTANCE);
        sum = sum.wrapping_add(buf[i]);
        buf[i] = sum & 0xFF;
    }
    sum
}

fn improvement(baseline_secs: f64, variant_secs: f64) -> f64 {
    (speedup(baseline_secs, variant_secs) - 1.0) * 100.0
}
