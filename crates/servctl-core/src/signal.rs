use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Signals this controller sends to the target master process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSignal {
    /// Finish in-flight work, then exit (QUIT).
    GracefulStop,
    /// Exit now (TERM).
    ForceStop,
    /// Unconditional kill, the escalation of last resort (KILL).
    Kill,
    /// Fork a replacement master and stand by (USR2).
    SpawnReplacement,
    /// Reopen log files (USR1).
    ReopenLogs,
}

impl ServerSignal {
    pub fn name(self) -> &'static str {
        match self {
            Self::GracefulStop => "QUIT",
            Self::ForceStop => "TERM",
            Self::Kill => "KILL",
            Self::SpawnReplacement => "USR2",
            Self::ReopenLogs => "USR1",
        }
    }

    fn as_nix(self) -> Signal {
        match self {
            Self::GracefulStop => Signal::SIGQUIT,
            Self::ForceStop => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
            Self::SpawnReplacement => Signal::SIGUSR2,
            Self::ReopenLogs => Signal::SIGUSR1,
        }
    }
}

impl fmt::Display for ServerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one best-effort signal delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The target exited before the signal arrived.
    TargetGone,
    /// The target exists but signalling it was not permitted.
    Denied,
}

/// Sends `signal` to `pid`. Delivery races with process exit; failures are
/// reported in the result and never abort the caller.
pub fn send(signal: ServerSignal, pid: i32) -> Delivery {
    match kill(Pid::from_raw(pid), Some(signal.as_nix())) {
        Ok(()) => Delivery::Delivered,
        Err(Errno::ESRCH) => Delivery::TargetGone,
        Err(_) => Delivery::Denied,
    }
}

#[cfg(test)]
mod tests {
    use super::{send, Delivery, ServerSignal};

    #[test]
    fn signal_names_match_the_wire_convention() {
        assert_eq!(ServerSignal::GracefulStop.name(), "QUIT");
        assert_eq!(ServerSignal::ForceStop.name(), "TERM");
        assert_eq!(ServerSignal::Kill.name(), "KILL");
        assert_eq!(ServerSignal::SpawnReplacement.name(), "USR2");
        assert_eq!(ServerSignal::ReopenLogs.name(), "USR1");
    }

    #[test]
    fn force_stop_terminates_a_live_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("60")
            .spawn()
            .unwrap_or_else(|err| panic!("spawn sleep: {err}"));
        let pid = child.id() as i32;

        assert_eq!(send(ServerSignal::ForceStop, pid), Delivery::Delivered);

        let status = child
            .wait()
            .unwrap_or_else(|err| panic!("wait for child: {err}"));
        assert!(!status.success());
    }

    #[test]
    fn signalling_a_reaped_child_reports_target_gone() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .unwrap_or_else(|err| panic!("spawn true: {err}"));
        let pid = child.id() as i32;
        child
            .wait()
            .unwrap_or_else(|err| panic!("wait for child: {err}"));

        assert_eq!(send(ServerSignal::ReopenLogs, pid), Delivery::TargetGone);
    }
}
