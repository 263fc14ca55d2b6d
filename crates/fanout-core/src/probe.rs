//! Resident-memory probe for worker processes.
//!
//! The process strategy lets each worker report how much resident memory it
//! holds alongside every result. The engine only forwards these snapshots;
//! aggregation into a running per-pid total is the caller's business.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Mapping from an OS process id to a resident-memory measurement in megabytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    by_pid: FxHashMap<u32, f64>,
}

impl MemorySnapshot {
    /// Snapshot with a single entry.
    pub fn single(pid: u32, resident_mb: f64) -> Self {
        let mut by_pid = FxHashMap::default();
        by_pid.insert(pid, resident_mb);
        Self { by_pid }
    }

    /// Measurement for a given pid, if present.
    pub fn get(&self, pid: u32) -> Option<f64> {
        self.by_pid.get(&pid).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.by_pid.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.by_pid.is_empty()
    }

    /// Iterate over (pid, resident_mb) entries.
    pub fn entries(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.by_pid.iter().map(|(&pid, &mb)| (pid, mb))
    }

    /// Fold another snapshot into this one, keeping the latest measurement
    /// per pid. Caller-side aggregation across a whole batch uses this.
    pub fn merge(&mut self, other: &MemorySnapshot) {
        for (pid, mb) in other.entries() {
            self.by_pid.insert(pid, mb);
        }
    }
}

/// Measure the resident memory of a process in megabytes.
///
/// `pid` of `None` measures the calling process. Only supported where
/// `/proc` exposes per-process memory; everywhere else this fails with
/// [`Error::Unsupported`] rather than silently returning nothing.
#[cfg(target_os = "linux")]
pub fn resident_memory_mb(pid: Option<u32>) -> Result<MemorySnapshot> {
    let pid = pid.unwrap_or_else(std::process::id);
    let statm = std::fs::read_to_string(format!("/proc/{}/statm", pid))?;

    // Second field of statm is resident size in pages.
    let resident_pages: u64 = statm
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| Error::Execution(format!("malformed statm for pid {}: {:?}", pid, statm)))?;

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return Err(Error::Execution("sysconf(_SC_PAGESIZE) failed".to_string()));
    }

    let resident_mb = (resident_pages * page_size as u64) as f64 / (1024.0 * 1024.0);
    Ok(MemorySnapshot::single(pid, resident_mb))
}

/// Measure the resident memory of a process in megabytes.
///
/// Not supported on this target; always fails with [`Error::Unsupported`].
#[cfg(not(target_os = "linux"))]
pub fn resident_memory_mb(_pid: Option<u32>) -> Result<MemorySnapshot> {
    Err(Error::Unsupported(
        "resident-memory probe requires /proc".to_string(),
    ))
}
