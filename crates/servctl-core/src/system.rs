use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs::File;
use std::time::Duration;

use crate::config::Config;
use crate::error::ControlError;
use crate::health::{self, HealthCheck};
use crate::launch;
use crate::pidfile::PidFile;
use crate::process;
use crate::signal::{self, Delivery, ServerSignal};

/// Which of the two PID files an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileKind {
    Current,
    OldBinary,
}

/// The controller's window onto the outside world: process table, PID
/// files, the launch command, and the health endpoint.
pub trait System {
    fn is_alive(&self, pid: i32) -> bool;
    fn process_title(&self, pid: i32) -> Option<String>;
    fn send_signal(&self, signal: ServerSignal, pid: i32) -> Delivery;
    fn read_pid(&self, kind: PidFileKind) -> Result<Option<i32>, ControlError>;
    fn remove_pid_file(&self, kind: PidFileKind) -> Result<(), ControlError>;
    /// Checks that the server and rackup config files are readable.
    fn verify_config_files(&self) -> Result<(), ControlError>;
    fn launch_server(&self) -> Result<(), ControlError>;
    fn check_health(&self, check: &HealthCheck) -> bool;
    fn sleep(&self, duration: Duration);
}

/// Production implementation backed by the OS.
pub struct OsSystem {
    config: Config,
}

impl OsSystem {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn pid_file(&self, kind: PidFileKind) -> PidFile {
        let current = PidFile::new(self.config.pid_file_path());
        match kind {
            PidFileKind::Current => current,
            PidFileKind::OldBinary => current.old_binary(),
        }
    }
}

impl System for OsSystem {
    fn is_alive(&self, pid: i32) -> bool {
        process::is_alive(pid)
    }

    fn process_title(&self, pid: i32) -> Option<String> {
        process::title(pid)
    }

    fn send_signal(&self, signal: ServerSignal, pid: i32) -> Delivery {
        signal::send(signal, pid)
    }

    fn read_pid(&self, kind: PidFileKind) -> Result<Option<i32>, ControlError> {
        self.pid_file(kind).read()
    }

    fn remove_pid_file(&self, kind: PidFileKind) -> Result<(), ControlError> {
        self.pid_file(kind).remove()
    }

    fn verify_config_files(&self) -> Result<(), ControlError> {
        for path in [
            self.config.server_config_path(),
            self.config.rackup_config_path(),
        ] {
            File::open(&path)
                .map_err(|err| ControlError::Config(format!("{}: {err}", path.display())))?;
        }
        Ok(())
    }

    fn launch_server(&self) -> Result<(), ControlError> {
        launch::spawn_server(&self.config)
    }

    fn check_health(&self, check: &HealthCheck) -> bool {
        health::check(check)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Side effects recorded by [`InMemorySystem`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    Signal(ServerSignal, i32),
    Launch,
    HealthCheck,
    RemovePidFile(PidFileKind),
}

/// Scripted stand-in for [`OsSystem`] used by controller and CLI tests.
///
/// Stop signals kill their target unless the PID is listed in
/// `ignores_stop_signals`; KILL always works. A fork signal brings up
/// `replacement_pid` and shuffles the PID files the way a real master
/// would. Process death never touches the files; the controller owns
/// their cleanup.
#[derive(Debug)]
pub struct InMemorySystem {
    pub alive: RefCell<BTreeSet<i32>>,
    pub current_pid_file: RefCell<Option<i32>>,
    pub old_binary_pid_file: RefCell<Option<i32>>,
    pub titles: RefCell<BTreeMap<i32, String>>,
    /// Consumed front-to-back by `check_health`; once empty, `healthy`
    /// answers instead.
    pub health_results: RefCell<VecDeque<bool>>,
    pub healthy: Cell<bool>,
    pub ignores_stop_signals: RefCell<BTreeSet<i32>>,
    /// PID the master forks on a replacement signal; `None` simulates a
    /// fork that never happens.
    pub replacement_pid: Cell<Option<i32>>,
    /// Title installed for the replacement at fork time.
    pub replacement_title: RefCell<Option<String>>,
    /// Applied (once) at the next `sleep`, for proctitle-watch tests.
    pub title_flip_on_sleep: RefCell<Option<(i32, String)>>,
    /// PID that appears, file and process, after a successful launch.
    pub launch_brings_up: Cell<Option<i32>>,
    pub launch_error: RefCell<Option<String>>,
    pub config_error: RefCell<Option<String>>,
    pub events: RefCell<Vec<SystemEvent>>,
    pub sleeps: Cell<usize>,
}

impl Default for InMemorySystem {
    fn default() -> Self {
        Self {
            alive: RefCell::new(BTreeSet::new()),
            current_pid_file: RefCell::new(None),
            old_binary_pid_file: RefCell::new(None),
            titles: RefCell::new(BTreeMap::new()),
            health_results: RefCell::new(VecDeque::new()),
            healthy: Cell::new(true),
            ignores_stop_signals: RefCell::new(BTreeSet::new()),
            replacement_pid: Cell::new(None),
            replacement_title: RefCell::new(None),
            title_flip_on_sleep: RefCell::new(None),
            launch_brings_up: Cell::new(None),
            launch_error: RefCell::new(None),
            config_error: RefCell::new(None),
            events: RefCell::new(Vec::new()),
            sleeps: Cell::new(0),
        }
    }
}

impl InMemorySystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// A system with one live master behind the current PID file.
    pub fn with_running_master(pid: i32) -> Self {
        let system = Self::new();
        system.alive.borrow_mut().insert(pid);
        *system.current_pid_file.borrow_mut() = Some(pid);
        system
    }

    pub fn events(&self) -> Vec<SystemEvent> {
        self.events.borrow().clone()
    }

    fn record(&self, event: SystemEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl System for InMemorySystem {
    fn is_alive(&self, pid: i32) -> bool {
        pid > 0 && self.alive.borrow().contains(&pid)
    }

    fn process_title(&self, pid: i32) -> Option<String> {
        if !self.is_alive(pid) {
            return None;
        }
        self.titles.borrow().get(&pid).cloned()
    }

    fn send_signal(&self, signal: ServerSignal, pid: i32) -> Delivery {
        self.record(SystemEvent::Signal(signal, pid));
        if !self.is_alive(pid) {
            return Delivery::TargetGone;
        }
        match signal {
            ServerSignal::GracefulStop | ServerSignal::ForceStop => {
                if !self.ignores_stop_signals.borrow().contains(&pid) {
                    self.alive.borrow_mut().remove(&pid);
                }
            }
            ServerSignal::Kill => {
                self.alive.borrow_mut().remove(&pid);
            }
            ServerSignal::SpawnReplacement => {
                if let Some(new_pid) = self.replacement_pid.get() {
                    self.alive.borrow_mut().insert(new_pid);
                    if let Some(title) = self.replacement_title.borrow().clone() {
                        self.titles.borrow_mut().insert(new_pid, title);
                    }
                    *self.old_binary_pid_file.borrow_mut() = Some(pid);
                    *self.current_pid_file.borrow_mut() = Some(new_pid);
                }
            }
            ServerSignal::ReopenLogs => {}
        }
        Delivery::Delivered
    }

    fn read_pid(&self, kind: PidFileKind) -> Result<Option<i32>, ControlError> {
        Ok(match kind {
            PidFileKind::Current => *self.current_pid_file.borrow(),
            PidFileKind::OldBinary => *self.old_binary_pid_file.borrow(),
        })
    }

    fn remove_pid_file(&self, kind: PidFileKind) -> Result<(), ControlError> {
        self.record(SystemEvent::RemovePidFile(kind));
        match kind {
            PidFileKind::Current => *self.current_pid_file.borrow_mut() = None,
            PidFileKind::OldBinary => *self.old_binary_pid_file.borrow_mut() = None,
        }
        Ok(())
    }

    fn verify_config_files(&self) -> Result<(), ControlError> {
        match self.config_error.borrow().clone() {
            Some(message) => Err(ControlError::Config(message)),
            None => Ok(()),
        }
    }

    fn launch_server(&self) -> Result<(), ControlError> {
        self.record(SystemEvent::Launch);
        if let Some(message) = self.launch_error.borrow().clone() {
            return Err(ControlError::Launch(message));
        }
        if let Some(pid) = self.launch_brings_up.get() {
            self.alive.borrow_mut().insert(pid);
            *self.current_pid_file.borrow_mut() = Some(pid);
        }
        Ok(())
    }

    fn check_health(&self, _check: &HealthCheck) -> bool {
        self.record(SystemEvent::HealthCheck);
        let scripted = self.health_results.borrow_mut().pop_front();
        scripted.unwrap_or_else(|| self.healthy.get())
    }

    fn sleep(&self, _duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        if let Some((pid, title)) = self.title_flip_on_sleep.borrow_mut().take() {
            self.titles.borrow_mut().insert(pid, title);
        }
    }
}
