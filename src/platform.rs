//! Host context read-outs printed in experiment headers.
//!
//! Cache-sensitive measurements are only interpretable next to the CPU
//! model, the frequency governor, and the cache sizes of the host, so each
//! driver prints this context before its results.

#[cfg(target_os = "linux")]
use std::fs;

/// CPU model name as reported by the OS
pub fn cpu_model() -> String {
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split(':').nth(1))
                    .map(|m| m.trim().to_string())
            })
            .unwrap_or_else(|| "Unknown".to_string())
    }
    #[cfg(not(target_os = "linux"))]
    {
        "Unknown".to_string()
    }
}

/// Active cpufreq scaling governor, if exposed
pub fn cpu_governor() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor")
            .ok()
            .map(|s| s.trim().to_string())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// L1 data cache size in KiB (per core)
pub fn l1d_cache_kb() -> Option<usize> {
    read_cache_size("/sys/devices/system/cpu/cpu0/cache/index0/size")
}

/// L1 instruction cache size in KiB (per core)
pub fn l1i_cache_kb() -> Option<usize> {
    read_cache_size("/sys/devices/system/cpu/cpu0/cache/index1/size")
}

/// L2 cache size in KiB (per core)
pub fn l2_cache_kb() -> Option<usize> {
    read_cache_size("/sys/devices/system/cpu/cpu0/cache/index2/size")
}

/// L3 cache size in KiB (shared)
pub fn l3_cache_kb() -> Option<usize> {
    read_cache_size("/sys/devices/system/cpu/cpu0/cache/index3/size")
}

#[cfg(target_os = "linux")]
fn read_cache_size(path: &str) -> Option<usize> {
    fs::read_to_string(path).ok().and_then(|s| {
        let s = s.trim();
        if let Some(kb) = s.strip_suffix('K') {
            kb.parse::<usize>().ok()
        } else if let Some(mb) = s.strip_suffix('M') {
            mb.parse::<usize>().ok().map(|v| v * 1024)
        } else {
            s.parse::<usize>().ok().map(|v| v / 1024)
        }
    })
}

#[cfg(not(target_os = "linux"))]
fn read_cache_size(_path: &str) -> Option<usize> {
    None
}

/// Log a warning when the governor will distort timing comparisons
pub fn warn_if_scaling_governor() {
    if let Some(governor) = cpu_governor() {
        if governor != "performance" {
            log::warn!(
                "cpu governor is '{}'; frequency scaling may distort results",
                governor
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_model_nonempty() {
        assert!(!cpu_model().is_empty());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_cache_sizes_sane() {
        // Not every container exposes cache sysfs; only check parsed values
        if let Some(kb) = l1d_cache_kb() {
            assert!(kb >= 8 && kb <= 1024, "implausible L1d size: {} KiB", kb);
        }
        if let Some(kb) = l2_cache_kb() {
            assert!(kb >= 128, "implausible L2 size: {} KiB", kb);
        }
        if let Some(kb) = l3_cache_kb() {
            assert!(kb >= 256, "implausible L3 size: {} KiB", kb);
        }
    }
}
