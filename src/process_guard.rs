//! Process lifecycle helpers for child processes
//!
//! - Children are spawned in their own process group with a parent-death
//!   signal, so a crashed runner does not leave orphans behind.
//! - Liveness can be probed without waiting on a child.
//! - Temporary artifacts are owned by a [`TempScope`] and removed on every
//!   exit path that unwinds normally.
//! - SIGINT/SIGTERM only raise a flag; a second signal terminates.
//!
//! The runner never kills its own children. Once launched, a task runs to
//! completion.

use nix::libc;
use nix::sys::signal;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Exit status used when a second interrupt forces termination
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: only async-signal-safe calls (setpgid, prctl) run between
        // fork and exec.
        unsafe {
            self.pre_exec(|| {
                // PGID = child PID
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::from)?;

                // Child gets SIGTERM if the runner dies first
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

/// Check if a process is still alive (not dead or zombie)
pub fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Zombies still accept signals but are not running.
    // Field 3 of /proc/<pid>/stat is the state.
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // The command name may contain spaces; the state follows the last ')'
        if let Some(rest) = stat.rsplit_once(')').map(|(_, rest)| rest) {
            if let Some(state) = rest.split_whitespace().next() {
                return !matches!(state, "Z" | "X");
            }
        }
    }

    // No /proc: kill(0) succeeded, assume alive
    true
}

/// Install SIGINT/SIGTERM handlers that set the returned flag.
///
/// The first signal only sets the flag, letting callers stop before the next
/// unit of work. A second signal while the flag is set exits with
/// [`INTERRUPTED_EXIT_CODE`].
pub fn install_interrupt_flag() -> std::io::Result<Arc<AtomicBool>> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::flag;

    let interrupted = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        // Order matters: the conditional shutdown must see the flag before
        // the plain handler sets it.
        flag::register_conditional_shutdown(sig, INTERRUPTED_EXIT_CODE, Arc::clone(&interrupted))?;
        flag::register(sig, Arc::clone(&interrupted))?;
    }
    tracing::debug!("Interrupt handlers installed for SIGINT and SIGTERM");
    Ok(interrupted)
}

/// RAII owner of temporary files.
///
/// Every tracked path that has not been released is removed on drop, so a
/// failed or abandoned operation cannot leave partial artifacts behind.
#[derive(Debug, Default)]
pub struct TempScope {
    paths: Vec<PathBuf>,
}

impl TempScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `path`; returns it for convenience.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }

    /// Stop tracking `path` (it was committed or moved away).
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }
}

impl Drop for TempScope {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed temporary file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove temporary file {}: {}", path.display(), e),
            }
        }
    }
}
