//! Termination escalation
//!
//! Stops the supervised process by escalating through three mechanisms:
//! a graceful window-close request, a direct kill on the child handle, and
//! finally the OS task-termination utility keyed by image name. A separate
//! sweep removes same-named orphans that survived all three.
//!
//! Nothing here panics or propagates errors. Every failed step is logged
//! and the sequence moves on, so a Stop always runs to completion.

use std::process::{Child, Command};
use std::time::Duration;

use sysinfo::System;
use wait_timeout::ChildExt;

use crate::os::WindowControl;

/// How long each escalation step waits for the process to exit
const EXIT_WAIT: Duration = Duration::from_secs(1);

/// Escalate until the child is gone.
///
/// Step one is skipped when the process has no observable main window.
/// After the final step the child is reaped if it exited; a child that is
/// somehow still alive is left to the orphan sweep.
pub fn escalate(child: &mut Child, name: &str, window_control: &dyn WindowControl) {
    let pid = child.id();

    if let Some(window) = window_control.find_main_window(pid) {
        tracing::info!(pid, %name, "Requesting graceful close");
        if let Err(e) = window_control.request_close(window) {
            tracing::warn!(pid, error = %e, "Graceful close request failed");
        }
        match child.wait_timeout(EXIT_WAIT) {
            Ok(Some(status)) => {
                tracing::info!(pid, %status, "Process closed gracefully");
                return;
            }
            Ok(None) => {
                tracing::warn!(pid, "Process ignored close request");
            }
            Err(e) => {
                tracing::warn!(pid, error = %e, "Wait after close request failed");
            }
        }
    }

    tracing::info!(pid, %name, "Killing process");
    if let Err(e) = child.kill() {
        tracing::warn!(pid, error = %e, "Kill failed");
    }
    match child.wait_timeout(EXIT_WAIT) {
        Ok(Some(status)) => {
            tracing::info!(pid, %status, "Process killed");
            return;
        }
        Ok(None) => {
            tracing::warn!(pid, "Process survived kill, falling back to OS utility");
        }
        Err(e) => {
            tracing::warn!(pid, error = %e, "Wait after kill failed");
        }
    }

    kill_by_name(name);
    // Reap the child if the utility got it; otherwise the orphan sweep on
    // the next start attempt picks it up.
    if let Ok(Some(status)) = child.wait_timeout(EXIT_WAIT) {
        tracing::info!(pid, %status, "Process terminated by OS utility");
    }
}

/// Terminate every process with the given image name through the platform
/// task-termination utility.
#[cfg(windows)]
pub fn kill_by_name(name: &str) {
    if name.is_empty() {
        return;
    }

    let image = format!("{name}.exe");
    tracing::info!(%image, "Invoking taskkill");
    match Command::new("taskkill")
        .args(["/F", "/T", "/IM", &image])
        .output()
    {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            tracing::warn!(
                %image,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "taskkill reported failure"
            );
        }
        Err(e) => {
            tracing::error!(%image, error = %e, "Failed to invoke taskkill");
        }
    }
}

#[cfg(not(windows))]
pub fn kill_by_name(name: &str) {
    if name.is_empty() {
        return;
    }

    tracing::info!(%name, "Invoking pkill");
    match Command::new("pkill").args(["-KILL", "-x", name]).output() {
        // pkill exits 1 when no process matched, which is fine here.
        Ok(output) if output.status.code() == Some(0) || output.status.code() == Some(1) => {}
        Ok(output) => {
            tracing::warn!(
                %name,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "pkill reported failure"
            );
        }
        Err(e) => {
            tracing::error!(%name, error = %e, "Failed to invoke pkill");
        }
    }
}

/// Remove orphaned instances of the supervised executable.
///
/// Looks for live processes whose image name matches the cached display
/// name and removes them with the OS utility. Runs before every launch so
/// a crashed supervisor never leaves a previous child competing with the
/// new one.
pub fn sweep_orphans(system: &mut System, name: &str) {
    if name.is_empty() {
        return;
    }

    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let image = image_name(name);
    let orphans: Vec<u32> = system
        .processes_by_exact_name(image.as_ref())
        .map(|p| p.pid().as_u32())
        .collect();

    if orphans.is_empty() {
        return;
    }

    tracing::warn!(%name, count = orphans.len(), pids = ?orphans, "Removing orphaned processes");
    kill_by_name(name);
}

#[cfg(windows)]
fn image_name(name: &str) -> std::ffi::OsString {
    std::ffi::OsString::from(format!("{name}.exe"))
}

#[cfg(not(windows))]
fn image_name(name: &str) -> std::ffi::OsString {
    std::ffi::OsString::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_by_name_ignores_empty_and_unknown_names() {
        kill_by_name("");
        kill_by_name("vigil-no-such-process-name");
    }

    #[test]
    fn sweep_ignores_empty_and_unknown_names() {
        let mut system = System::new();
        sweep_orphans(&mut system, "");
        sweep_orphans(&mut system, "vigil-no-such-process-name");
    }

    #[cfg(unix)]
    #[test]
    fn escalate_kills_a_stubborn_child() {
        use crate::os::PlatformWindowControl;

        let mut child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");

        escalate(&mut child, "sleep-under-test", &PlatformWindowControl::new());

        // The child must be gone; try_wait on a reaped child reports the
        // exit status without blocking.
        match child.try_wait() {
            Ok(Some(status)) => assert!(!status.success()),
            Ok(None) => panic!("child survived escalation"),
            Err(_) => {} // Already reaped
        }
    }
}
