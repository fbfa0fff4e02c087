//! Thread-to-CPU pinning.
//!
//! Every experiment depends on workers staying on the logical CPUs chosen
//! for them, so binding failures are surfaced as typed errors instead of
//! being retried. Verification reads back the scheduler's placement with
//! [`current_cpu`]; for a thread that bound itself the read-back is exact,
//! while a freshly remote-bound thread may still report its old CPU until
//! the scheduler migrates it.

use crate::error::{BenchError, Result};

/// Logical CPU id as exposed by the OS scheduler
pub type CpuId = usize;

/// Pin the calling thread to a single logical CPU
#[cfg(target_os = "linux")]
pub fn bind_current_thread(cpu: CpuId) -> Result<()> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
    use std::mem;

    unsafe {
        let mut cpu_set: cpu_set_t = mem::zeroed();
        CPU_ZERO(&mut cpu_set);
        CPU_SET(cpu, &mut cpu_set);

        let result = sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &cpu_set);
        if result != 0 {
            return Err(BenchError::BindRejected {
                cpu,
                source: std::io::Error::last_os_error(),
            });
        }
    }

    log::debug!("bound current thread to cpu {}", cpu);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn bind_current_thread(cpu: CpuId) -> Result<()> {
    log::debug!("cpu pinning unavailable on this platform (cpu {})", cpu);
    Ok(())
}

/// Pin another thread to a single logical CPU via its join handle
#[cfg(target_os = "linux")]
pub fn bind_thread<T>(handle: &std::thread::JoinHandle<T>, cpu: CpuId) -> Result<()> {
    use libc::{cpu_set_t, pthread_setaffinity_np, CPU_SET, CPU_ZERO};
    use std::mem;
    use std::os::unix::thread::JoinHandleExt;

    unsafe {
        let mut cpu_set: cpu_set_t = mem::zeroed();
        CPU_ZERO(&mut cpu_set);
        CPU_SET(cpu, &mut cpu_set);

        // pthread_setaffinity_np reports the error as its return value
        let result =
            pthread_setaffinity_np(handle.as_pthread_t(), mem::size_of::<cpu_set_t>(), &cpu_set);
        if result != 0 {
            return Err(BenchError::bind_rejected(cpu, result));
        }
    }

    log::debug!("bound thread to cpu {}", cpu);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn bind_thread<T>(_handle: &std::thread::JoinHandle<T>, cpu: CpuId) -> Result<()> {
    log::debug!("cpu pinning unavailable on this platform (cpu {})", cpu);
    Ok(())
}

/// Logical CPU the calling thread is executing on, if the OS exposes it
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<CpuId> {
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        None
    } else {
        Some(cpu as CpuId)
    }
}

#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<CpuId> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_bind_and_verify_round_trip() {
        // Walk the detected ids rather than 0..n; online sets can have holes
        for &cpu in crate::topology::CpuTopology::detect().cpu_ids() {
            bind_current_thread(cpu).unwrap();
            assert_eq!(current_cpu(), Some(cpu));
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_bind_invalid_cpu_rejected() {
        // CPU ids far beyond the machine are refused by the kernel
        let err = bind_current_thread(1 << 20).unwrap_err();
        match err {
            BenchError::BindRejected { cpu, .. } => assert_eq!(cpu, 1 << 20),
            other => panic!("expected BindRejected, got {:?}", other),
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_bind_remote_thread() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        use std::sync::Arc;

        let target = crate::topology::CpuTopology::detect().cpu_ids()[0];
        let release = Arc::new(AtomicBool::new(false));
        let observed = Arc::new(AtomicUsize::new(usize::MAX));

        let worker = {
            let release = Arc::clone(&release);
            let observed = Arc::clone(&observed);
            std::thread::spawn(move || {
                while !release.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }
                // Re-read placement only after the binder released us
                if let Some(cpu) = current_cpu() {
                    observed.store(cpu, Ordering::Release);
                }
            })
        };

        bind_thread(&worker, target).unwrap();
        release.store(true, Ordering::Release);
        worker.join().unwrap();

        assert_eq!(observed.load(Ordering::Acquire), target);
    }
}
