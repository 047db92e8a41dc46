#![allow(clippy::unwrap_used)]

use servctl_cli::control::run_for_test;
use servctl_core::signal::ServerSignal;
use servctl_core::system::{InMemorySystem, PidFileKind, SystemEvent};

fn position(events: &[SystemEvent], wanted: &SystemEvent) -> usize {
    events
        .iter()
        .position(|event| event == wanted)
        .unwrap_or_else(|| panic!("event {wanted:?} not found in {events:?}"))
}

#[test]
fn start_launches_once_and_prints_the_pid() {
    let system = InMemorySystem::new();
    system.launch_brings_up.set(Some(1234));

    let out = run_for_test(&["start", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("master started with PID 1234"));

    let launches = system
        .events()
        .iter()
        .filter(|event| **event == SystemEvent::Launch)
        .count();
    assert_eq!(launches, 1);
}

#[test]
fn start_with_live_master_and_no_health_url_skips_the_launch() {
    let system = InMemorySystem::with_running_master(7);

    let out = run_for_test(&["start", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("master already running with PID 7"));
    assert!(!out.stdout.contains("master started"));
    assert!(system.events().is_empty());
}

#[test]
fn start_reports_configuration_errors() {
    let system = InMemorySystem::new();
    *system.config_error.borrow_mut() = Some("/srv/app/config/unicorn.rb: no such file".to_string());

    let out = run_for_test(&["start", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("configuration error"));
    assert!(system.events().is_empty());
}

#[test]
fn start_reports_launch_failure_distinctly() {
    let system = InMemorySystem::new();

    let out = run_for_test(&["start", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("launch failed"));
}

#[test]
fn stop_sends_quit_and_succeeds() {
    let system = InMemorySystem::with_running_master(7);

    let out = run_for_test(&["stop", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("master 7 stopped"));
    assert_eq!(
        system.events()[0],
        SystemEvent::Signal(ServerSignal::GracefulStop, 7),
    );
}

#[test]
fn force_stop_sends_term() {
    let system = InMemorySystem::with_running_master(7);

    let out = run_for_test(&["force-stop", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert_eq!(
        system.events()[0],
        SystemEvent::Signal(ServerSignal::ForceStop, 7),
    );
}

#[test]
fn stop_escalates_to_kill_when_the_master_hangs_on() {
    let system = InMemorySystem::with_running_master(7);
    system.ignores_stop_signals.borrow_mut().insert(7);

    let out = run_for_test(&["stop", "-a", "/srv/app", "-t", "0"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stderr.contains("sending KILL"));

    let events = system.events();
    let quit = position(&events, &SystemEvent::Signal(ServerSignal::GracefulStop, 7));
    let kill = position(&events, &SystemEvent::Signal(ServerSignal::Kill, 7));
    assert!(quit < kill);
}

#[test]
fn stop_with_no_pid_file_reports_already_stopped() {
    let system = InMemorySystem::new();

    let out = run_for_test(&["stop", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0);
    assert!(out.stdout.contains("master not running (no PID file)"));
}

#[test]
fn restart_retires_the_old_master_before_launching() {
    let system = InMemorySystem::with_running_master(7);
    system.launch_brings_up.set(Some(8));

    let out = run_for_test(&["restart", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("master started with PID 8"));

    let events = system.events();
    let quit = position(&events, &SystemEvent::Signal(ServerSignal::GracefulStop, 7));
    let launch = position(&events, &SystemEvent::Launch);
    assert!(quit < launch);
}

#[test]
fn force_restart_uses_term_for_the_stop_half() {
    let system = InMemorySystem::with_running_master(7);
    system.launch_brings_up.set(Some(8));

    let out = run_for_test(&["force-restart", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert_eq!(
        system.events()[0],
        SystemEvent::Signal(ServerSignal::ForceStop, 7),
    );
}

#[test]
fn upgrade_replaces_the_master_in_place() {
    let system = InMemorySystem::with_running_master(41);
    system.replacement_pid.set(Some(42));

    let out = run_for_test(
        &["upgrade", "-a", "/srv/app", "--no-proctitle-watch"],
        &system,
    );
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("upgrade complete; master PID 42"));
    assert_eq!(*system.current_pid_file.borrow(), Some(42));
    assert!(!system.events().contains(&SystemEvent::Launch));
}

#[test]
fn upgrade_with_stale_pid_file_mirrors_start() {
    let system = InMemorySystem::new();
    *system.current_pid_file.borrow_mut() = Some(41);
    system.launch_brings_up.set(Some(7));

    let out = run_for_test(&["upgrade", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("master started with PID 7"));

    let events = system.events();
    let removed = position(&events, &SystemEvent::RemovePidFile(PidFileKind::Current));
    let launch = position(&events, &SystemEvent::Launch);
    assert!(removed < launch);
}

#[test]
fn upgrade_rolls_back_to_a_cold_start_when_the_fork_never_happens() {
    let system = InMemorySystem::with_running_master(41);
    system.ignores_stop_signals.borrow_mut().insert(41);
    system.launch_brings_up.set(Some(43));

    let out = run_for_test(
        &["upgrade", "-a", "/srv/app", "-t", "0", "--no-proctitle-watch"],
        &system,
    );
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stderr.contains("no replacement master appeared"));

    let events = system.events();
    let force = position(&events, &SystemEvent::Signal(ServerSignal::ForceStop, 41));
    let launch = position(&events, &SystemEvent::Launch);
    assert!(force < launch);
}

#[test]
fn upgrade_rolls_back_both_masters_on_a_failed_health_check() {
    let system = InMemorySystem::with_running_master(41);
    system.replacement_pid.set(Some(42));
    system.health_results.borrow_mut().push_back(false);
    system.launch_brings_up.set(Some(43));

    let out = run_for_test(
        &[
            "upgrade",
            "-a",
            "/srv/app",
            "--no-proctitle-watch",
            "--health-check-url",
            "http://localhost:8080/health",
        ],
        &system,
    );
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stderr.contains("failed the health check"));

    let events = system.events();
    let stop_new = position(&events, &SystemEvent::Signal(ServerSignal::ForceStop, 42));
    let stop_old = position(&events, &SystemEvent::Signal(ServerSignal::ForceStop, 41));
    let launch = position(&events, &SystemEvent::Launch);
    assert!(stop_new < launch);
    assert!(stop_old < launch);
}

#[test]
fn upgrade_final_health_check_failure_exits_1_with_the_master_running() {
    let system = InMemorySystem::with_running_master(41);
    system.replacement_pid.set(Some(42));
    system.health_results.borrow_mut().push_back(true);
    system.health_results.borrow_mut().push_back(false);

    let out = run_for_test(
        &[
            "upgrade",
            "-a",
            "/srv/app",
            "--no-proctitle-watch",
            "--health-check-url",
            "http://localhost:8080/health",
        ],
        &system,
    );
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("left running"));
    assert_eq!(*system.current_pid_file.borrow(), Some(42));
}

#[test]
fn reopen_logs_signals_usr1_without_waiting() {
    let system = InMemorySystem::with_running_master(7);

    let out = run_for_test(&["reopen-logs", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert_eq!(
        system.events(),
        vec![SystemEvent::Signal(ServerSignal::ReopenLogs, 7)],
    );
}

#[test]
fn status_with_no_pid_file_is_a_failure_exit() {
    let system = InMemorySystem::new();

    let out = run_for_test(&["status", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 1);
    assert!(out.stdout.contains("master not running (no PID file)"));
}

#[test]
fn status_with_stale_pid_file_heals_and_fails() {
    let system = InMemorySystem::new();
    *system.current_pid_file.borrow_mut() = Some(41);

    let out = run_for_test(&["status", "-a", "/srv/app"], &system);
    assert_eq!(out.exit_code, 1);
    assert!(out.stdout.contains("stale PID file"));
    assert_eq!(
        system.events(),
        vec![SystemEvent::RemovePidFile(PidFileKind::Current)],
    );
}
