//! Comparison of the x86 prefetch locality hints.
//!
//! Runs the same streaming read once per hint (`T0`, `T1`, `T2`, `NTA`)
//! plus a no-prefetch baseline, each from a cold cache. The hints differ
//! in which cache levels the fetched line lands in, so the spread between
//! rows shows how much that placement matters for a pure stream.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin prefetch_hints
//! ```

use smtbench::platform::{cpu_model, warn_if_scaling_governor};
use smtbench::report::bandwidth_gb_per_sec;
use smtbench::{
    run_current, AlignedBuffer, BenchResult, CachePolicy, CpuTopology, PrefetchHint, TimingResult,
};

const ARRAY_BYTES: usize = 128 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / std::mem::size_of::<u64>();
const ITERATIONS: usize = 3;
const PREFETCH_DISTANCE: usize = 16;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        println!("Usage: {} (no arguments; runs every hint)", args[0]);
        std::process::exit(1);
    }

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                   Prefetch Hint Comparison                       ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!("Array size: {} MB ({} elements)", ARRAY_BYTES / (1024 * 1024), ELEMENTS);
    println!("Iterations: {}", ITERATIONS);
    println!("Prefetch distance: {} elements", PREFETCH_DISTANCE);

    if let Err(err) = run_grid(&topology) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run_grid(topology: &CpuTopology) -> BenchResult<()> {
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_sequential();
    let cpu = topology.cpu_ids()[0];

    println!();
    let baseline = run_current(cpu, buf.as_mut_slice(), CachePolicy::Cold, |data| {
        sweep(data, |_: &[u64], _| {})
    })?;
    print_row("No Prefetch", &baseline);

    for hint in PrefetchHint::ALL {
        let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Cold, |data| {
            sweep(data, move |d: &[u64], i| hint.prefetch_read(d, i))
        })?;
        print_row(row_label(hint), &result);
    }

    println!("\n=== Hint Reference ===");
    println!("  T0  - fetch into every cache level (L1/L2/L3)");
    println!("  T1  - fetch into L2 and beyond, skip L1");
    println!("  T2  - fetch into L3 only");
    println!("  NTA - non-temporal; minimize cache pollution");

    println!("\n=== Analysis ===");
    println!("On a pure stream the hints mostly converge because the hardware");
    println!("prefetcher is already running ahead. The spread shows how much");
    println!("cache each hint leaves behind for other data.");
    Ok(())
}

/// One timed pass; `hint` is called with the index to prefetch ahead of `i`
fn sweep<P: Fn(&[u64], usize)>(data: &[u64], hint: P) -> u64 {
    let mut sum = 0u64;
    for _ in 0..ITERATIONS {
        for i in 0..data.len() {
            hint(data, i + PREFETCH_DISTANCE);
            sum = sum.wrapping_add(data[i]);
        }
    }
    sum
}

fn print_row(label: &str, result: &TimingResult) {
    println!(
        "{:<20}: Time={:.4}s, BW={:.2} GB/s (result={})",
        label,
        result.elapsed_secs,
        bandwidth_gb_per_sec((ARRAY_BYTES * ITERATIONS) as u64, result.elapsed_secs),
        result.checksum % 1000
    );
}

fn row_label(hint: PrefetchHint) -> &'static str {
    match hint {
        PrefetchHint::T0 => "Prefetch T0 (L1)",
        PrefetchHint::T1 => "Prefetch T1 (L2)",
        PrefetchHint::T2 => "Prefetch T2 (L3)",
        PrefetchHint::Nta => "Prefetch NTA",
    }
}
