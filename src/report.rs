//! Derived metrics and human-readable formatting for experiment output.
//!
//! Drivers print results to stdout only; these helpers turn raw
//! (operations, bytes, seconds) triples into the throughput, bandwidth, and
//! latency figures the experiments compare.

/// Operations per second
pub fn ops_per_sec(ops: u64, secs: f64) -> f64 {
    ops as f64 / secs
}

/// Bandwidth in GiB/s for `bytes` moved in `secs`
pub fn bandwidth_gb_per_sec(bytes: u64, secs: f64) -> f64 {
    bytes as f64 / secs / (1024.0 * 1024.0 * 1024.0)
}

/// Mean latency in nanoseconds per operation
pub fn mean_latency_ns(ops: u64, secs: f64) -> f64 {
    secs * 1e9 / ops as f64
}

/// Ratio of baseline to variant time; above 1.0 the variant is faster
pub fn speedup(baseline_secs: f64, variant_secs: f64) -> f64 {
    baseline_secs / variant_secs
}

/// Signed percent change from baseline to variant; positive is slower
pub fn percent_change(baseline_secs: f64, variant_secs: f64) -> f64 {
    (variant_secs - baseline_secs) / baseline_secs * 100.0
}

/// Format an operation rate in human-readable form
pub fn format_ops(rate: f64) -> String {
    if rate < 1000.0 {
        format!("{:.1} ops/s", rate)
    } else if rate < 1_000_000.0 {
        format!("{:.2} K ops/s", rate / 1000.0)
    } else {
        format!("{:.2} M ops/s", rate / 1_000_000.0)
    }
}

/// Format a byte count in human-readable form
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_metrics() {
        assert_eq!(ops_per_sec(1_000_000, 2.0), 500_000.0);
        assert_eq!(bandwidth_gb_per_sec(1 << 30, 2.0), 0.5);
        assert_eq!(mean_latency_ns(1_000_000, 1.0), 1000.0);
        assert_eq!(speedup(2.0, 1.0), 2.0);
        assert_eq!(percent_change(2.0, 3.0), 50.0);
        assert_eq!(percent_change(2.0, 1.0), -50.0);
    }

    #[test]
    fn test_format_ops() {
        assert_eq!(format_ops(500.0), "500.0 ops/s");
        assert_eq!(format_ops(50_000.0), "50.00 K ops/s");
        assert_eq!(format_ops(5_000_000.0), "5.00 M ops/s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(16.0 * 1024.0), "16.00 KB");
        assert_eq!(format_bytes(8.0 * 1024.0 * 1024.0), "8.00 MB");
        assert_eq!(format_bytes(2.0 * 1024.0 * 1024.0 * 1024.0), "2.00 GB");
    }
}
