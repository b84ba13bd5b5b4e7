//! Resource sampling behind a trait so tests can drive synthetic load.

use std::path::Path;
use sysinfo::{ProcessesToUpdate, System};

/// One snapshot of the signals the governor steers on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub rss_bytes: u64,
}

/// Source of resource measurements. The production implementation reads
/// sysinfo and statvfs; tests substitute scripted values.
pub trait ResourceSampler: Send {
    fn sample(&mut self) -> ResourceSample;

    /// Bytes available on the filesystem holding `path`.
    fn free_disk_bytes(&mut self, path: &Path) -> u64;
}

/// sysinfo-backed sampler for CPU %, memory %, and process RSS.
pub struct SystemSampler {
    sys: System,
    pid: Option<sysinfo::Pid>,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self) -> ResourceSample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let cpu_percent = self.sys.global_cpu_usage();
        let total = self.sys.total_memory();
        let mem_percent = if total == 0 {
            0.0
        } else {
            (self.sys.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        let rss_bytes = self
            .pid
            .and_then(|pid| {
                self.sys
                    .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                self.sys.process(pid).map(|p| p.memory())
            })
            .unwrap_or(0);

        ResourceSample {
            cpu_percent,
            mem_percent,
            rss_bytes,
        }
    }

    fn free_disk_bytes(&mut self, path: &Path) -> u64 {
        statvfs_available(path)
    }
}

/// Available bytes under `path` via statvfs; permissive on failure so a
/// probe error never wedges the pipeline (the transfer itself will surface
/// real disk errors).
#[cfg(unix)]
pub fn statvfs_available(path: &Path) -> u64 {
    use std::os::unix::ffi::OsStrExt;

    let Ok(cpath) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return u64::MAX;
    };
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut stat) };
    if rc != 0 {
        return u64::MAX;
    }
    (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn statvfs_available(_path: &Path) -> u64 {
    u64::MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statvfs_reports_space_for_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let free = statvfs_available(dir.path());
        assert!(free > 0);
    }

    #[test]
    fn system_sampler_produces_sane_percentages() {
        let mut sampler = SystemSampler::new();
        let s = sampler.sample();
        assert!(s.cpu_percent >= 0.0);
        assert!((0.0..=100.0).contains(&s.mem_percent));
    }
}
