use std::io::Write;
use std::time::Duration;

use crate::config::Config;
use crate::error::ControlError;
use crate::health::HealthCheck;
use crate::poll::wait_until;
use crate::signal::{Delivery, ServerSignal};
use crate::system::{PidFileKind, System};

/// Drives the lifecycle operations against a [`System`].
///
/// All real state lives in the PID files and the OS process table; the
/// controller re-reads both at every decision point instead of caching.
pub struct Controller<'a> {
    config: &'a Config,
    system: &'a dyn System,
}

/// Phases of the upgrade state machine. Each phase reconciles against the
/// PID files and process table on entry before acting.
#[derive(Debug)]
enum UpgradePhase {
    Preflight,
    Baseline,
    Trigger { old_pid: i32 },
    Detect { old_pid: i32 },
    Settle { old_pid: i32, new_pid: i32 },
    WatchTitle { old_pid: i32, new_pid: i32, baseline: String },
    HealthCheck { old_pid: i32, new_pid: i32 },
    Retire { old_pid: i32, new_pid: i32 },
    Verify { new_pid: i32 },
    ColdStart,
    Done { new_pid: i32 },
}

impl<'a> Controller<'a> {
    pub fn new(config: &'a Config, system: &'a dyn System) -> Self {
        Self { config, system }
    }

    /// Boots the server unless a live master already owns the PID file.
    pub fn start(&self, out: &mut dyn Write, err: &mut dyn Write) -> Result<(), ControlError> {
        if let Some(pid) = self.live_current_pid(err)? {
            say(out, format!("master already running with PID {pid}"));
            if let Some(check) = self.health_check() {
                if !self.system.check_health(&check) {
                    return Err(ControlError::Unhealthy(format!(
                        "master {pid} is running but {} never answered",
                        check.url,
                    )));
                }
                say(out, "health check passed");
            }
            return Ok(());
        }

        self.system.verify_config_files()?;
        self.system.launch_server()?;
        self.system.sleep(self.config.settle_delay);

        let pid = match self.live_current_pid(err)? {
            Some(pid) => pid,
            None => {
                return Err(ControlError::Launch(
                    "command finished but no live master appeared behind the PID file".to_string(),
                ))
            }
        };

        if !self.config.start_wait.is_zero() {
            say(
                out,
                format!(
                    "waiting {}s for the application to finish booting",
                    self.config.start_wait.as_secs(),
                ),
            );
            self.system.sleep(self.config.start_wait);
        }

        if let Some(check) = self.health_check() {
            if !self.system.check_health(&check) {
                return Err(ControlError::Unhealthy(format!(
                    "master {pid} started but {} never answered; leaving it running",
                    check.url,
                )));
            }
        }

        say(out, format!("master started with PID {pid}"));
        Ok(())
    }

    /// Stops the master: QUIT when graceful, TERM otherwise, escalating to
    /// KILL once the deadline passes. An absent or stale PID file already
    /// counts as stopped.
    pub fn stop(
        &self,
        graceful: bool,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<(), ControlError> {
        let pid = match self.system.read_pid(PidFileKind::Current)? {
            None => {
                say(out, "master not running (no PID file)");
                return Ok(());
            }
            Some(pid) => pid,
        };
        if !self.system.is_alive(pid) {
            warn(err, format!("removing stale PID file (PID {pid} is gone)"));
            self.system.remove_pid_file(PidFileKind::Current)?;
            say(out, "master not running");
            return Ok(());
        }

        self.shutdown(pid, graceful, self.config.timeout, err);
        if self.system.read_pid(PidFileKind::Current)?.is_some() {
            self.system.remove_pid_file(PidFileKind::Current)?;
        }
        say(out, format!("master {pid} stopped"));
        Ok(())
    }

    /// Stop followed by start. A stop failure is reported but does not
    /// block the start attempt.
    pub fn restart(
        &self,
        graceful: bool,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<(), ControlError> {
        if let Err(error) = self.stop(graceful, out, err) {
            warn(err, format!("stop failed ({error}); starting anyway"));
        }
        self.start(out, err)
    }

    /// Replaces the running master with zero downtime, falling back to a
    /// cold start when the replacement never arrives or fails its health
    /// check.
    pub fn upgrade(&self, out: &mut dyn Write, err: &mut dyn Write) -> Result<(), ControlError> {
        let mut phase = UpgradePhase::Preflight;
        loop {
            phase = match phase {
                UpgradePhase::Preflight => {
                    if let Some(old) = self.system.read_pid(PidFileKind::OldBinary)? {
                        if self.system.is_alive(old) {
                            warn(
                                err,
                                format!(
                                    "unfinished upgrade detected; stopping leftover old master {old}"
                                ),
                            );
                            self.shutdown(old, false, self.config.timeout, err);
                        } else {
                            warn(
                                err,
                                format!("removing stale old-binary PID file (PID {old} is gone)"),
                            );
                        }
                        self.system.remove_pid_file(PidFileKind::OldBinary)?;
                    }
                    UpgradePhase::Baseline
                }

                UpgradePhase::Baseline => match self.live_current_pid(err)? {
                    Some(old_pid) => UpgradePhase::Trigger { old_pid },
                    None => {
                        say(out, "master not running; performing a cold start");
                        UpgradePhase::ColdStart
                    }
                },

                UpgradePhase::Trigger { old_pid } => {
                    self.send_logged(ServerSignal::SpawnReplacement, old_pid, err);
                    say(out, format!("asked master {old_pid} to fork a replacement"));
                    UpgradePhase::Detect { old_pid }
                }

                UpgradePhase::Detect { old_pid } => match self.detect_replacement(old_pid)? {
                    Some(new_pid) => UpgradePhase::Settle { old_pid, new_pid },
                    None => {
                        warn(
                            err,
                            format!(
                                "no replacement master appeared within {}s; rolling back to a cold start",
                                self.config.timeout.as_secs(),
                            ),
                        );
                        self.shutdown(old_pid, false, self.config.timeout, err);
                        UpgradePhase::ColdStart
                    }
                },

                UpgradePhase::Settle { old_pid, new_pid } => {
                    say(out, format!("replacement master {new_pid} detected"));
                    let baseline = if self.config.watch_proctitle {
                        self.system.process_title(new_pid)
                    } else {
                        None
                    };
                    if !self.config.start_wait.is_zero() {
                        say(
                            out,
                            format!(
                                "waiting {}s for the replacement to finish loading",
                                self.config.start_wait.as_secs(),
                            ),
                        );
                        self.system.sleep(self.config.start_wait);
                    }
                    match baseline {
                        Some(baseline) => UpgradePhase::WatchTitle {
                            old_pid,
                            new_pid,
                            baseline,
                        },
                        None => UpgradePhase::HealthCheck { old_pid, new_pid },
                    }
                }

                UpgradePhase::WatchTitle {
                    old_pid,
                    new_pid,
                    baseline,
                } => {
                    let changed = wait_until(
                        self.config.timeout,
                        self.config.poll_interval,
                        || {
                            self.system
                                .process_title(new_pid)
                                .is_some_and(|title| title != baseline)
                        },
                        |interval| self.system.sleep(interval),
                    );
                    if !changed {
                        warn(
                            err,
                            format!(
                                "process title of {new_pid} never changed; assuming it finished loading"
                            ),
                        );
                    }
                    UpgradePhase::HealthCheck { old_pid, new_pid }
                }

                UpgradePhase::HealthCheck { old_pid, new_pid } => match self.health_check() {
                    Some(check) if !self.system.check_health(&check) => {
                        warn(
                            err,
                            format!(
                                "replacement master {new_pid} failed the health check; rolling back to a cold start"
                            ),
                        );
                        self.shutdown(new_pid, false, self.config.poll_interval, err);
                        self.shutdown(old_pid, false, self.config.poll_interval, err);
                        UpgradePhase::ColdStart
                    }
                    _ => UpgradePhase::Retire { old_pid, new_pid },
                },

                UpgradePhase::Retire { old_pid, new_pid } => {
                    self.shutdown(old_pid, true, self.config.timeout, err);
                    if let Some(leftover) = self.system.read_pid(PidFileKind::OldBinary)? {
                        if !self.system.is_alive(leftover) {
                            self.system.remove_pid_file(PidFileKind::OldBinary)?;
                        }
                    }
                    say(out, format!("old master {old_pid} retired"));
                    UpgradePhase::Verify { new_pid }
                }

                UpgradePhase::Verify { new_pid } => {
                    if let Some(check) = self.health_check() {
                        if !self.system.check_health(&check) {
                            // The old master is already gone; no rollback
                            // is possible at this point.
                            return Err(ControlError::Unhealthy(format!(
                                "upgrade finished but {} never answered; \
                                 replacement master {new_pid} is left running",
                                check.url,
                            )));
                        }
                    }
                    UpgradePhase::Done { new_pid }
                }

                UpgradePhase::ColdStart => return self.start(out, err),

                UpgradePhase::Done { new_pid } => {
                    say(out, format!("upgrade complete; master PID {new_pid}"));
                    return Ok(());
                }
            };
        }
    }

    /// Asks the master to reopen its log files; no wait afterwards.
    pub fn reopen_logs(
        &self,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<(), ControlError> {
        match self.live_current_pid(err)? {
            None => {
                say(out, "master not running (no PID file)");
                Ok(())
            }
            Some(pid) => {
                self.send_logged(ServerSignal::ReopenLogs, pid, err);
                say(out, format!("asked master {pid} to reopen its logs"));
                Ok(())
            }
        }
    }

    /// Reports whether the master is running. The stale branch removes the
    /// leftover file before reporting.
    pub fn status(&self, out: &mut dyn Write, _err: &mut dyn Write) -> Result<bool, ControlError> {
        match self.system.read_pid(PidFileKind::Current)? {
            None => {
                say(out, "master not running (no PID file)");
                Ok(false)
            }
            Some(pid) if self.system.is_alive(pid) => {
                say(out, format!("master running with PID {pid}"));
                Ok(true)
            }
            Some(pid) => {
                self.system.remove_pid_file(PidFileKind::Current)?;
                say(
                    out,
                    format!("master not running (stale PID file for dead PID {pid} removed)"),
                );
                Ok(false)
            }
        }
    }

    /// The current PID file's value when it names a live process. A stale
    /// file is removed, once, before reporting "not running".
    fn live_current_pid(&self, err: &mut dyn Write) -> Result<Option<i32>, ControlError> {
        match self.system.read_pid(PidFileKind::Current)? {
            None => Ok(None),
            Some(pid) if self.system.is_alive(pid) => Ok(Some(pid)),
            Some(pid) => {
                warn(err, format!("removing stale PID file (PID {pid} is gone)"));
                self.system.remove_pid_file(PidFileKind::Current)?;
                Ok(None)
            }
        }
    }

    /// Waits for the current PID file to name something other than
    /// `old_pid`. Read errors inside the poll are treated as "not yet";
    /// the final read propagates them.
    fn detect_replacement(&self, old_pid: i32) -> Result<Option<i32>, ControlError> {
        let appeared = wait_until(
            self.config.timeout,
            self.config.poll_interval,
            || {
                matches!(
                    self.system.read_pid(PidFileKind::Current),
                    Ok(Some(pid)) if pid != old_pid
                )
            },
            |interval| self.system.sleep(interval),
        );
        if !appeared {
            return Ok(None);
        }
        Ok(self
            .system
            .read_pid(PidFileKind::Current)?
            .filter(|pid| *pid != old_pid))
    }

    /// Signals `pid` to exit and waits for it to go away, escalating to
    /// KILL when the deadline passes. Descendants are not tracked; the
    /// escalation is a single-PID kill.
    fn shutdown(&self, pid: i32, graceful: bool, timeout: Duration, err: &mut dyn Write) {
        let signal = if graceful {
            ServerSignal::GracefulStop
        } else {
            ServerSignal::ForceStop
        };
        self.send_logged(signal, pid, err);
        let died = wait_until(
            timeout,
            self.config.poll_interval,
            || !self.system.is_alive(pid),
            |interval| self.system.sleep(interval),
        );
        if !died {
            warn(
                err,
                format!(
                    "PID {pid} still alive after {}s; sending KILL",
                    timeout.as_secs(),
                ),
            );
            self.send_logged(ServerSignal::Kill, pid, err);
        }
    }

    fn send_logged(&self, signal: ServerSignal, pid: i32, err: &mut dyn Write) {
        match self.system.send_signal(signal, pid) {
            Delivery::Delivered => {}
            Delivery::TargetGone => {
                warn(err, format!("{signal} to PID {pid}: process already gone"));
            }
            Delivery::Denied => {
                warn(
                    err,
                    format!("{signal} to PID {pid}: not permitted; proceeding"),
                );
            }
        }
    }

    fn health_check(&self) -> Option<HealthCheck> {
        HealthCheck::from_config(self.config)
    }
}

fn say(out: &mut dyn Write, message: impl AsRef<str>) {
    let _ = writeln!(out, "{}", message.as_ref());
}

fn warn(err: &mut dyn Write, message: impl AsRef<str>) {
    let _ = writeln!(err, "warning: {}", message.as_ref());
}
