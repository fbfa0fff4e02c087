//! L1 instruction-cache contention between hardware threads.
//!
//! Each worker cycles through a registry of one hundred distinct
//! `#[inline(never)]` mixing functions, enough code that the working set
//! spills out of a private instruction cache. Two workers running different
//! registries on SMT siblings evict each other's code; on distinct cores
//! the registries never interact.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin icache_contention
//! cargo run --release --bin icache_contention -- --same-core
//! ```

use smtbench::platform::{cpu_model, l1i_cache_kb, warn_if_scaling_governor};
use smtbench::{run, run_current, BenchResult, CachePolicy, CpuId, CpuTopology, WorkerSpec};

const ITERATIONS: u64 = 50_000_000;
const REGISTRY_LEN: usize = 100;

type MixFn = fn(u64) -> u64;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("--all");

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    I-Cache Contention Test                       ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!("Functions per registry: {}", REGISTRY_LEN);
    println!("Iterations: {}", ITERATIONS);
    if let Some(kb) = l1i_cache_kb() {
        println!("L1 I-Cache: {} KB (shared by SMT siblings)", kb);
    }

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
            println!("Expected: SMT siblings running different code paths are SLOWER;");
            println!("the two dispatch loops thrash the instruction cache they share.");
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
    println!("\n=== Single Worker Baseline ===");

    let registry = rotl_registry();
    let mut scratch: [u64; 0] = [];
    let cpu = topology.cpu_ids()[0];

    let result = run_current(cpu, &mut scratch[..], CachePolicy::Warm, |_buf| {
        dispatch_chain(&registry)
    })?;
    println!("Result: {}", result.checksum);
    println!("Time: {:.4} seconds", result.elapsed_secs);
    Ok(())
}

fn run_same_core(topology: &CpuTopology) -> BenchResult<()> {
    match topology.first_smt_pair() {
        Some((a, b)) => run_pair(
            (a, b),
            &format!("Same Core SMT (CPU {},{}) - I-Cache Contention", a, b),
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
            &format!("Different Cores (CPU {},{}) - Independent I-Caches", a, b),
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

    let registry_a = rotl_registry();
    let registry_b = rotr_registry();
    let mut scratch_a: [u64; 0] = [];
    let mut scratch_b: [u64; 0] = [];

    let report = run(
        vec![
            WorkerSpec::new(cpus.0, &mut scratch_a[..], |_buf: &mut [u64]| {
                dispatch_chain(&registry_a)
            }),
            WorkerSpec::new(cpus.1, &mut scratch_b[..], |_buf: &mut [u64]| {
                dispatch_chain(&registry_b)
            }),
        ],
        CachePolicy::Warm,
    )?;

    println!(
        "Thread A: Result={}, Time={:.4} sec",
        report.workers[0].checksum, report.workers[0].elapsed_secs
    );
    println!(
        "Thread B: Result={}, Time={:.4} sec",
        report.workers[1].checksum, report.workers[1].elapsed_secs
    );
    println!("Wall time: {:.4} seconds", report.wall_secs);
    Ok(())
}

/// Chain every function in the registry round-robin, threading the result
fn dispatch_chain(registry: &[MixFn]) -> u64 {
    let len = registry.len() as u64;
    let mut result = 1u64;
    for i in 0..ITERATIONS {
        result = registry[(i % len) as usize](result);
    }
    result
}

// Each const instantiation is a distinct non-inlined function body, so one
// registry covers REGISTRY_LEN separate code paths.

#[inline(never)]
fn mix_rotl<const N: u64>(x: u64) -> u64 {
    let mut y = x.wrapping_mul(17).wrapping_add(N);
    y = (y << 3) ^ (y >> 5);
    y = y.wrapping_add(N * 31);
    y = y.wrapping_mul(0x1_2345_6789) ^ N;
    y = y.rotate_left(7);
    y.wrapping_add(N * 13)
}

#[inline(never)]
fn mix_rotr<const N: u64>(x: u64) -> u64 {
    let mut y = x.wrapping_add(N * 23);
    y = (y >> 4) ^ (y << 6);
    y = y.wrapping_sub(N * 17);
    y = y.wrapping_mul(0x9_8765_4321).wrapping_add(N);
    y = y.rotate_right(8);
    y.wrapping_sub(N * 11)
}

macro_rules! registry {
    ($mix:ident: $($n:literal)+) => {
        vec![ $( $mix::<$n> as MixFn ),+ ]
    };
}

fn rotl_registry() -> Vec<MixFn> {
    registry!(mix_rotl:
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19
        20 21 22 23 24 25 26 27 28 29 30 31 32 33 34 35 36 37 38 39
        40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58 59
        60 61 62 63 64 65 66 67 68 69 70 71 72 73 74 75 76 77 78 79
        80 81 82 83 84 85 86 87 88 89 90 91 92 93 94 95 96 97 98 99)
}

fn rotr_registry() -> Vec<MixFn> {
    registry!(mix_rotr:
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19
        20 21 22 23 24 25 26 27 28 29 30 31 32 33 34 35 36 37 38 39
        40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58 59
        60 61 62 63 64 65 66 67 68 69 70 71 72 73 74 75 76 77 78 79
        80 81 82 83 84 85 86 87 88 89 90 91 92 93 94 95 96 97 98 99)
}
