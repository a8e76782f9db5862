//! Advisory environment checks. They warn; they never stop a run.

use crate::config::RunConfig;
use crate::output;
use crate::scanner::ScanType;
use tracing::warn;

/// Headroom kept between the worker count and the open-file limit.
const FD_HEADROOM: u64 = 100;

/// Check if running with root/admin privileges.
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Soft limit on open file descriptors, if the platform has one.
pub fn open_file_limit() -> Option<u64> {
    #[cfg(unix)]
    {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
        if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
            return None;
        }
        Some(limit.rlim_cur as u64)
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Whether `workers` concurrent probes come too close to `limit` descriptors.
fn near_fd_limit(workers: usize, limit: u64) -> bool {
    workers as u64 >= limit.saturating_sub(FD_HEADROOM)
}

/// Warn about settings that are likely to misbehave on this host.
pub fn warn_about_environment(config: &RunConfig, quiet: bool) {
    if let Some(limit) = open_file_limit() {
        if near_fd_limit(config.workers, limit) {
            warn!(workers = config.workers, limit, "worker count is close to the open-file limit");
            if !quiet {
                output::print_warning(&format!(
                    "{} workers against an open-file limit of {}; raise it with `ulimit -n`.",
                    config.workers, limit
                ));
            }
        }
    }

    if config.scan_type == ScanType::Syn && !config.dry_run && !is_root() {
        warn!("syn scan selected without root privileges");
        if !quiet {
            output::print_warning("syn scan requires root/sudo privileges for raw socket access.");
        }
    }
}
