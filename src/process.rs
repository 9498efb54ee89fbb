//! Process-group signalling helpers.

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;

/// Signals the process group led by `pid`, falling back to the single
/// process when the group cannot be signalled.
///
/// Requires the process to have been spawned with `process_group(0)` so that
/// its PGID equals its PID. Returns `true` if either signal was delivered.
/// A target that no longer exists is not treated as an error.
pub(crate) fn signal_group(pid: u32, signal: Signal) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    let target = Pid::from_raw(raw);

    match killpg(target, signal) {
        Ok(()) => true,
        Err(group_err) => match kill(target, signal) {
            Ok(()) => {
                tracing::debug!(
                    pid,
                    ?signal,
                    error = %group_err,
                    "group signal failed, signalled process"
                );
                true
            }
            Err(Errno::ESRCH) => {
                tracing::debug!(pid, ?signal, "process already gone");
                false
            }
            Err(e) => {
                tracing::warn!(pid, ?signal, error = %e, "failed to signal process");
                false
            }
        },
    }
}
