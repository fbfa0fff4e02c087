//! Runtime CPU topology discovery.
//!
//! Experiments place workers on SMT siblings or on distinct physical cores,
//! so the mapping from logical CPU to physical core is discovered at startup
//! from sysfs instead of being compiled in. When sysfs is unavailable
//! (non-Linux, stripped containers) the topology degrades to a flat view in
//! which every logical CPU is its own core and no SMT pairs exist.

use crate::affinity::CpuId;

#[cfg(target_os = "linux")]
use std::fs;

/// One physical core and the logical CPUs scheduled onto it
#[derive(Debug, Clone)]
struct Core {
    package: usize,
    core_id: usize,
    siblings: Vec<CpuId>,
}

/// Logical-CPU to physical-core mapping for the host
#[derive(Debug, Clone)]
pub struct CpuTopology {
    ids: Vec<CpuId>,
    cores: Vec<Core>,
}

impl CpuTopology {
    /// Discover the host topology, degrading to a flat no-SMT view when
    /// sysfs cannot be read
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            if let Some(topo) = Self::detect_linux() {
                return topo;
            }
            log::debug!("sysfs topology unavailable, assuming one thread per core");
        }
        Self::flat(num_cpus::get())
    }

    #[cfg(target_os = "linux")]
    fn detect_linux() -> Option<Self> {
        let mut ids: Vec<CpuId> = fs::read_dir("/sys/devices/system/cpu")
            .ok()?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("cpu"))
                    .and_then(|rest| rest.parse::<usize>().ok())
            })
            .collect();
        if ids.is_empty() {
            return None;
        }
        ids.sort_unstable();

        // Offline CPUs have no topology leaves; skip them rather than
        // abandoning discovery for the whole machine
        let mut online: Vec<CpuId> = Vec::with_capacity(ids.len());
        let mut cores: Vec<Core> = Vec::new();
        for &cpu in &ids {
            let package = match read_topology_value(cpu, "physical_package_id") {
                Some(v) => v,
                None => continue,
            };
            let core_id = match read_topology_value(cpu, "core_id") {
                Some(v) => v,
                None => continue,
            };
            online.push(cpu);
            match cores
                .iter_mut()
                .find(|c| c.package == package && c.core_id == core_id)
            {
                Some(core) => core.siblings.push(cpu),
                None => cores.push(Core {
                    package,
                    core_id,
                    siblings: vec![cpu],
                }),
            }
        }
        if online.is_empty() {
            return None;
        }
        cores.sort_by_key(|c| c.siblings[0]);

        Some(Self { ids: online, cores })
    }

    fn flat(n: usize) -> Self {
        let ids: Vec<CpuId> = (0..n.max(1)).collect();
        let cores = ids
            .iter()
            .map(|&cpu| Core {
                package: 0,
                core_id: cpu,
                siblings: vec![cpu],
            })
            .collect();
        Self { ids, cores }
    }

    /// Number of logical CPUs
    pub fn logical_cpus(&self) -> usize {
        self.ids.len()
    }

    /// All online logical CPU ids, ascending
    pub fn cpu_ids(&self) -> &[CpuId] {
        &self.ids
    }

    /// Number of physical cores
    pub fn physical_cores(&self) -> usize {
        self.cores.len()
    }

    /// True when at least one core runs two or more hardware threads
    pub fn has_smt(&self) -> bool {
        self.cores.iter().any(|c| c.siblings.len() >= 2)
    }

    /// Whether `cpu` is a valid logical CPU on this host
    pub fn contains(&self, cpu: CpuId) -> bool {
        self.ids.binary_search(&cpu).is_ok()
    }

    /// Upper bound on logical CPU ids, for error reporting
    pub fn id_limit(&self) -> usize {
        self.ids.last().map(|&max| max + 1).unwrap_or(0)
    }

    /// The two hardware threads of the first SMT-capable core
    pub fn first_smt_pair(&self) -> Option<(CpuId, CpuId)> {
        self.cores
            .iter()
            .find(|c| c.siblings.len() >= 2)
            .map(|c| (c.siblings[0], c.siblings[1]))
    }

    /// The SMT sibling sharing a core with `cpu`, if any
    pub fn smt_sibling_of(&self, cpu: CpuId) -> Option<CpuId> {
        let core = self.cores.iter().find(|c| c.siblings.contains(&cpu))?;
        core.siblings.iter().copied().find(|&s| s != cpu)
    }

    /// One logical CPU from each of `n` distinct physical cores
    pub fn distinct_cores(&self, n: usize) -> Option<Vec<CpuId>> {
        if self.cores.len() < n {
            return None;
        }
        Some(self.cores.iter().take(n).map(|c| c.siblings[0]).collect())
    }

    /// Two logical CPUs guaranteed to live on different physical cores
    pub fn two_distinct_cores(&self) -> Option<(CpuId, CpuId)> {
        self.distinct_cores(2).map(|v| (v[0], v[1]))
    }

    /// Short human-readable shape, e.g. "8 cores / 16 threads (SMT)"
    pub fn describe(&self) -> String {
        if self.has_smt() {
            format!(
                "{} cores / {} threads (SMT)",
                self.physical_cores(),
                self.logical_cpus()
            )
        } else {
            format!(
                "{} cores / {} threads",
                self.physical_cores(),
                self.logical_cpus()
            )
        }
    }
}

#[cfg(target_os = "linux")]
fn read_topology_value(cpu: CpuId, leaf: &str) -> Option<usize> {
    let path = format!("/sys/devices/system/cpu/cpu{}/topology/{}", cpu, leaf);
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_basic_shape() {
        let topo = CpuTopology::detect();
        assert!(topo.logical_cpus() >= 1);
        assert!(topo.physical_cores() >= 1);
        assert!(topo.physical_cores() <= topo.logical_cpus());
        assert!(topo.contains(0));
        assert!(!topo.contains(topo.id_limit()));
    }

    #[test]
    fn test_smt_pair_is_symmetric() {
        let topo = CpuTopology::detect();
        if let Some((a, b)) = topo.first_smt_pair() {
            assert_ne!(a, b);
            assert_eq!(topo.smt_sibling_of(a), Some(b));
            assert_eq!(topo.smt_sibling_of(b), Some(a));
        }
    }

    #[test]
    fn test_distinct_cores_are_distinct() {
        let topo = CpuTopology::detect();
        let n = topo.physical_cores().min(4);
        let cpus = topo.distinct_cores(n).unwrap();
        assert_eq!(cpus.len(), n);
        for (i, &a) in cpus.iter().enumerate() {
            assert!(topo.contains(a));
            for &b in &cpus[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(topo.distinct_cores(topo.physical_cores() + 1).is_none());
    }

    #[test]
    fn test_flat_fallback_has_no_smt() {
        let topo = CpuTopology::flat(4);
        assert_eq!(topo.logical_cpus(), 4);
        assert_eq!(topo.physical_cores(), 4);
        assert!(!topo.has_smt());
        assert!(topo.first_smt_pair().is_none());
        assert_eq!(topo.smt_sibling_of(2), None);
    }
}
