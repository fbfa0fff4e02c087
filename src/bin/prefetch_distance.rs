//! Sweep of software prefetch distance on a random gather.
//!
//! How far ahead to prefetch is the tuning knob that matters most. Too
//! short and the line fill has not completed when the demand load arrives;
//! too far and the line is evicted before use. This driver runs the same
//! random gather at ten distances and prints one row per distance.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin prefetch_distance
//! ```

use smtbench::platform::{cpu_model, warn_if_scaling_governor};
use smtbench::prefetch::prefetch_read_t0;
use smtbench::report::{mean_latency_ns, ops_per_sec};
use smtbench::{run_current, AlignedBuffer, BenchResult, CachePolicy, CpuTopology, IndexSequence};

const ARRAY_BYTES: usize = 64 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / std::mem::size_of::<u64>();
const ACCESSES: usize = 5_000_000;
const SEED: u64 = 54321;
const DISTANCES: [usize; 10] = [0, 1, 2, 4, 8, 16, 32, 64, 128, 256];
// Padding past the end of the sequence; must cover the largest distance.
const LOOKAHEAD: usize = 256;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        println!("Usage: {} (no arguments; runs the full distance sweep)", args[0]);
        std::process::exit(1);
    }

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                   Prefetch Distance Sweep                        ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!("Array size: {} MB ({} elements)", ARRAY_BYTES / (1024 * 1024), ELEMENTS);
    println!("Random accesses: {}", ACCESSES);
    println!("Distances: {:?}", DISTANCES);

    if let Err(err) = run_sweep(&topology) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run_sweep(topology: &CpuTopology) -> BenchResult<()> {
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_sequential();
    let seq = IndexSequence::generate(SEED, ACCESSES, LOOKAHEAD, ELEMENTS)?;
    let cpu = topology.cpu_ids()[0];

    println!();
    println!(
        "{:<12} {:<10} {:<15} {:<12}",
        "Distance", "Time(s)", "Throughput(M/s)", "Latency(ns)"
    );
    println!("{}", "-".repeat(52));

    for &distance in DISTANCES.iter() {
        let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Cold, |data| {
            gather_with_distance(data, &seq, distance)
        })?;
        println!(
            "Distance {:>3}: Time={:.4}s, Throughput={:.2} M/s, Latency={:.1} ns (result={})",
            distance,
            result.elapsed_secs,
            ops_per_sec(ACCESSES as u64, result.elapsed_secs) / 1e6,
            mean_latency_ns(ACCESSES as u64, result.elapsed_secs),
            result.checksum % 1000
        );
    }

    println!("\n=== Analysis ===");
    println!("Distance 0 is the no-prefetch baseline.");
    println!("Short distances leave the fill unfinished when the load arrives;");
    println!("long distances let the line age out of cache before it is used.");
    println!("The sweet spot is roughly memory latency over loop iteration time.");
    Ok(())
}

/// Distance 0 runs the plain loop so the baseline carries no hint overhead
fn gather_with_distance(data: &[u64], seq: &IndexSequence, distance: usize) -> u64 {
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
