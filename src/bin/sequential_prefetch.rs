//! Software prefetch on a sequential streaming read.
//!
//! Sweeps a 128 MB array front to back with no prefetch, with `T0`
//! prefetch a fixed distance ahead, and with `NTA` prefetch. Hardware
//! stride prefetchers already track a pure sequential stream, so this is
//! the workload where software prefetch should help the least; the run
//! puts a number on that.
//!
//! ## Running
//!
//! ```bash
//! cargo run --release --bin sequential_prefetch
//! cargo run --release --bin sequential_prefetch -- --prefetch-nta
//! ```

use smtbench::platform::{cpu_model, warn_if_scaling_governor};
use smtbench::prefetch::{prefetch_read_nta, prefetch_read_t0};
use smtbench::report::bandwidth_gb_per_sec;
use smtbench::{run_current, AlignedBuffer, BenchResult, CachePolicy, CpuId, CpuTopology};

const ARRAY_BYTES: usize = 128 * 1024 * 1024;
const ELEMENTS: usize = ARRAY_BYTES / std::mem::size_of::<u64>();
const ITERATIONS: usize = 5;
const PREFETCH_DISTANCE: usize = 16;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("--all");

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                Sequential Access Prefetch Test                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let topology = CpuTopology::detect();
    println!("Platform: {} [{}]", cpu_model(), topology.describe());
    warn_if_scaling_governor();

    println!();
    println!("Array size: {} MB ({} elements)", ARRAY_BYTES / (1024 * 1024), ELEMENTS);
    println!("Iterations: {}", ITERATIONS);
    println!(
        "Prefetch distance: {} elements ({} bytes ahead)",
        PREFETCH_DISTANCE,
        PREFETCH_DISTANCE * std::mem::size_of::<u64>()
    );

    if let Err(err) = dispatch(mode, &args[0], &topology) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn dispatch(mode: &str, program: &str, topology: &CpuTopology) -> BenchResult<()> {
    match mode {
        "--no-prefetch" => run_one(topology, "No Prefetch (baseline)", sweep_plain),
        "--prefetch" => run_one(
            topology,
            "With Prefetch (T0 - all cache levels)",
            sweep_prefetch_t0,
        ),
        "--prefetch-nta" => run_one(
            topology,
            "With Prefetch (NTA - non-temporal)",
            sweep_prefetch_nta,
        ),
        "--all" => {
            let mut buf = allocate()?;
            let cpu = topology.cpu_ids()[0];
            run_variant(cpu, &mut buf, "No Prefetch (baseline)", sweep_plain)?;
            run_variant(
                cpu,
                &mut buf,
                "With Prefetch (T0 - all cache levels)",
                sweep_prefetch_t0,
            )?;
            run_variant(
                cpu,
                &mut buf,
                "With Prefetch (NTA - non-temporal)",
                sweep_prefetch_nta,
            )?;

            println!("\n=== Notes ===");
            println!("Sequential streams are the hardware prefetcher's home turf, so");
            println!("software T0 usually moves little. NTA bypasses the outer levels");
            println!("and can come out ahead when the data will not be reused.");
            Ok(())
        }
        _ => {
            println!(
                "Usage: {} [--no-prefetch | --prefetch | --prefetch-nta | --all]",
                program
            );
            std::process::exit(1);
        }
    }
}

fn run_one(topology: &CpuTopology, title: &str, sweep: fn(&[u64]) -> u64) -> BenchResult<()> {
    let mut buf = allocate()?;
    run_variant(topology.cpu_ids()[0], &mut buf, title, sweep)
}

fn run_variant(
    cpu: CpuId,
    buf: &mut AlignedBuffer<u64>,
    title: &str,
    sweep: fn(&[u64]) -> u64,
) -> BenchResult<()> {
    println!("\n=== {} ===", title);

    let result = run_current(cpu, buf.as_mut_slice(), CachePolicy::Cold, |data| sweep(data))?;
    println!("Result: {}", result.checksum);
    println!("Time: {:.4} seconds", result.elapsed_secs);
    println!(
        "Bandwidth: {:.2} GB/s",
        bandwidth_gb_per_sec((ARRAY_BYTES * ITERATIONS) as u64, result.elapsed_secs)
    );
    Ok(())
}

fn allocate() -> BenchResult<AlignedBuffer<u64>> {
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS)?;
    buf.fill_sequential();
    Ok(buf)
}

fn sweep_plain(data: &[u64]) -> u64 {
    let mut sum = 0u64;
    for _ in 0..ITERATIONS {
        for &value in data {
            sum = sum.wrapping_add(value);
        }
    }
    sum
}

fn sweep_prefetch_t0(data: &[u64]) -> u64 {
    let mut sum = 0u64;
    for _ in 0..ITERATIONS {
        for i in 0..data.len() {
            prefetch_read_t0(data, i + PREFETCH_DISTANCE);
            sum = sum.wrapping_add(data[i]);
        }
    }
    sum
}

fn sweep_prefetch_nta(data: &[u64]) -> u64 {
    let mut sum = 0u64;
    for _ in 0..ITERATIONS {
        for i in 0..data.len() {
            prefetch_read_nta(data, i + PREFETCH_DISTANCE);
            sum = sum.wrapping_add(data[i]);
        }
    }
    sum
}
