//! Pre-exec hardening for the engine process.
//!
//! Applied after `fork()` but before `exec()`:
//! 1. **Die with parent** (optional): `PR_SET_PDEATHSIG(SIGKILL)` so the
//!    engine does not outlive the launching thread.
//! 2. **FD cleanup**: mark all inherited file descriptors ≥ 3 close-on-exec.
//!
//! Descriptors are flagged rather than closed so the pipe std uses to report
//! a failed `exec()` stays usable until the exec succeeds.

use std::process::Command;

/// Install pre-exec hooks on the command.
///
/// On non-Unix platforms this is a no-op.
#[cfg(not(unix))]
pub fn apply(_cmd: &mut Command, _die_with_parent: bool) {}

/// Install pre-exec hooks on the command.
#[cfg(unix)]
pub fn apply(cmd: &mut Command, die_with_parent: bool) {
    use std::os::unix::process::CommandExt;

    // SAFETY: all operations inside are async-signal-safe syscalls.
    unsafe {
        cmd.pre_exec(move || {
            #[cfg(target_os = "linux")]
            if die_with_parent {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
            }
            #[cfg(not(target_os = "linux"))]
            let _ = die_with_parent;

            cloexec_inherited_fds();
            Ok(())
        });
    }
}

/// Set `FD_CLOEXEC` on all file descriptors >= 3.
///
/// The piped stdout is dup'ed onto fd 1 before this runs, so it survives.
#[cfg(unix)]
fn cloexec_inherited_fds() {
    // close_range(3, u32::MAX, CLOSE_RANGE_CLOEXEC) is available on Linux 5.11+.
    #[cfg(target_os = "linux")]
    {
        /// `CLOSE_RANGE_CLOEXEC` from `<linux/close_range.h>`.
        const CLOSE_RANGE_CLOEXEC: u32 = 1 << 2;
        // SAFETY: close_range is an async-signal-safe syscall.
        let ret = unsafe {
            libc::syscall(libc::SYS_close_range, 3_u32, u32::MAX, CLOSE_RANGE_CLOEXEC)
        };
        if ret == 0 {
            return;
        }
    }

    // SAFETY: sysconf and fcntl are async-signal-safe.
    let max_fd = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let limit = i32::try_from(max_fd).ok().filter(|&n| n > 0).unwrap_or(1024);
    for fd in 3..limit {
        unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    }
}
