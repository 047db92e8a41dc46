use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Reports whether `pid` denotes a live process.
///
/// Non-positive PIDs are never alive and are rejected before any system
/// call. A permission error from the probe means the process exists but
/// belongs to someone else, which still counts as alive; only "no such
/// process" counts as dead.
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

/// Command line of `pid` as reported by the OS, when the platform exposes
/// one. Absence is a normal result, never an error.
pub fn title(pid: i32) -> Option<String> {
    if !is_alive(pid) {
        return None;
    }
    read_cmdline(pid)
}

#[cfg(target_os = "linux")]
fn read_cmdline(pid: i32) -> Option<String> {
    let raw = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    let text = String::from_utf8_lossy(&raw).replace('\0', " ");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(not(target_os = "linux"))]
fn read_cmdline(_pid: i32) -> Option<String> {
    None
}
