use std::io::Write;
use std::time::Duration;

use servctl_core::config::{Config, RAILS_SERVER_BIN};
use servctl_core::controller::Controller;
use servctl_core::system::{OsSystem, System};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The seven lifecycle subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    Start,
    Stop,
    ForceStop,
    Restart,
    ForceRestart,
    Upgrade,
    ReopenLogs,
    Status,
}

impl LifecycleCommand {
    fn from_str(token: &str) -> Option<Self> {
        match token {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "force-stop" => Some(Self::ForceStop),
            "restart" => Some(Self::Restart),
            "force-restart" => Some(Self::ForceRestart),
            "upgrade" => Some(Self::Upgrade),
            "reopen-logs" => Some(Self::ReopenLogs),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ParsedArgs {
    command: LifecycleCommand,
    config: Config,
}

pub fn run_for_test(args: &[&str], system: &dyn System) -> CommandOutput {
    let owned_args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run_with_system(&owned_args, system, &mut stdout, &mut stderr);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

/// Parses `args`, builds the OS-backed system, and runs the requested
/// operation.
pub fn run_from_env(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if wants_version(args) {
        let _ = writeln!(stdout, "servctl version {}", crate::get_version());
        return 0;
    }
    match parse_args(args) {
        Ok(parsed) => {
            let system = OsSystem::new(parsed.config.clone());
            run_parsed(&parsed, &system, stdout, stderr)
        }
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            1
        }
    }
}

/// Same as [`run_from_env`] but against a caller-provided [`System`].
pub fn run_with_system(
    args: &[String],
    system: &dyn System,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    if wants_version(args) {
        let _ = writeln!(stdout, "servctl version {}", crate::get_version());
        return 0;
    }
    match parse_args(args) {
        Ok(parsed) => run_parsed(&parsed, system, stdout, stderr),
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            1
        }
    }
}

fn wants_version(args: &[String]) -> bool {
    args.first()
        .is_some_and(|token| token == "-v" || token == "--version")
}

fn run_parsed(
    parsed: &ParsedArgs,
    system: &dyn System,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let controller = Controller::new(&parsed.config, system);
    let result = match parsed.command {
        LifecycleCommand::Start => controller.start(stdout, stderr),
        LifecycleCommand::Stop => controller.stop(true, stdout, stderr),
        LifecycleCommand::ForceStop => controller.stop(false, stdout, stderr),
        LifecycleCommand::Restart => controller.restart(true, stdout, stderr),
        LifecycleCommand::ForceRestart => controller.restart(false, stdout, stderr),
        LifecycleCommand::Upgrade => controller.upgrade(stdout, stderr),
        LifecycleCommand::ReopenLogs => controller.reopen_logs(stdout, stderr),
        LifecycleCommand::Status => {
            return match controller.status(stdout, stderr) {
                Ok(true) => 0,
                Ok(false) => 1,
                Err(error) => {
                    let _ = writeln!(stderr, "{error}");
                    1
                }
            };
        }
    };
    match result {
        Ok(()) => 0,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            1
        }
    }
}

fn parse_args(args: &[String]) -> Result<ParsedArgs, String> {
    let mut command: Option<LifecycleCommand> = None;
    let mut app_dir = String::new();
    let mut environment = String::new();
    let mut bundler_cmd = String::new();
    let mut server_config = String::new();
    let mut rackup_config = String::new();
    let mut pid_file = String::new();
    let mut health_url = String::new();
    let mut health_content = String::new();
    let mut timeout: Option<Duration> = None;
    let mut health_timeout: Option<Duration> = None;
    let mut start_wait: Option<Duration> = None;
    let mut rails = false;
    let mut watch_proctitle = true;

    let mut index = 0usize;
    while let Some(token) = args.get(index) {
        match token.as_str() {
            "-h" | "--help" | "help" => return Err(HELP_TEXT.to_string()),
            "-a" | "--app-dir" => {
                app_dir = take_value(args, index, "--app-dir")?;
                index += 2;
            }
            "-e" | "--environment" => {
                environment = take_value(args, index, "--environment")?;
                index += 2;
            }
            "--bundler-cmd" => {
                bundler_cmd = take_value(args, index, "--bundler-cmd")?;
                index += 2;
            }
            "-c" | "--server-config" => {
                server_config = take_value(args, index, "--server-config")?;
                index += 2;
            }
            "--rackup-config" => {
                rackup_config = take_value(args, index, "--rackup-config")?;
                index += 2;
            }
            "-p" | "--pid-file" => {
                pid_file = take_value(args, index, "--pid-file")?;
                index += 2;
            }
            "-t" | "--timeout" => {
                timeout = Some(parse_seconds(&take_value(args, index, "--timeout")?, token)?);
                index += 2;
            }
            "--health-check-url" => {
                health_url = take_value(args, index, "--health-check-url")?;
                index += 2;
            }
            "--health-check-content" => {
                health_content = take_value(args, index, "--health-check-content")?;
                index += 2;
            }
            "--health-check-timeout" => {
                health_timeout = Some(parse_seconds(
                    &take_value(args, index, "--health-check-timeout")?,
                    token,
                )?);
                index += 2;
            }
            "--start-wait" => {
                start_wait = Some(parse_seconds(
                    &take_value(args, index, "--start-wait")?,
                    token,
                )?);
                index += 2;
            }
            "--rails" => {
                rails = true;
                index += 1;
            }
            "--no-proctitle-watch" => {
                watch_proctitle = false;
                index += 1;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("error: unknown argument: '{flag}'"));
            }
            value => {
                if command.is_some() {
                    return Err(format!(
                        "error: accepts exactly one command, got extra '{value}'"
                    ));
                }
                command = Some(LifecycleCommand::from_str(value).ok_or_else(|| {
                    format!(
                        "error: unknown command '{value}' (valid: start stop force-stop \
                         restart force-restart upgrade reopen-logs status)"
                    )
                })?);
                index += 1;
            }
        }
    }

    let command = command.ok_or_else(|| HELP_TEXT.to_string())?;
    if app_dir.trim().is_empty() {
        return Err("error: --app-dir is required".to_string());
    }

    let mut config = Config::new(app_dir);
    if rails {
        config.server_bin = RAILS_SERVER_BIN.to_string();
    }
    if !environment.is_empty() {
        config.environment = environment;
    }
    if !bundler_cmd.is_empty() {
        config.bundler_cmd = bundler_cmd;
    }
    if !server_config.is_empty() {
        config.server_config = Some(server_config.into());
    }
    if !rackup_config.is_empty() {
        config.rackup_config = Some(rackup_config.into());
    }
    if !pid_file.is_empty() {
        config.pid_file = Some(pid_file.into());
    }
    if !health_url.is_empty() {
        config.health_url = Some(health_url);
    }
    if !health_content.is_empty() {
        config.health_content = Some(health_content);
    }
    if let Some(timeout) = timeout {
        config.timeout = timeout;
    }
    if let Some(health_timeout) = health_timeout {
        config.health_timeout = health_timeout;
    }
    if let Some(start_wait) = start_wait {
        config.start_wait = start_wait;
    }
    config.watch_proctitle = watch_proctitle;

    Ok(ParsedArgs { command, config })
}

fn take_value(args: &[String], index: usize, flag: &str) -> Result<String, String> {
    args.get(index + 1)
        .cloned()
        .ok_or_else(|| format!("error: missing value for {flag}"))
}

fn parse_seconds(value: &str, flag: &str) -> Result<Duration, String> {
    let seconds = value
        .parse::<u64>()
        .map_err(|_| format!("error: invalid value for {flag}: '{value}'"))?;
    Ok(Duration::from_secs(seconds))
}

const HELP_TEXT: &str = "\
Control the lifecycle of a forking application server

Usage:
  servctl <command> -a <app-dir> [flags]

Commands:
  start          Boot the server unless it is already running
  stop           Ask the master to finish its work and exit
  force-stop     Terminate the master immediately
  restart        stop, then start
  force-restart  force-stop, then start
  upgrade        Replace the running master with zero downtime
  reopen-logs    Ask the master to reopen its log files
  status         Report whether the master is running

Flags:
  -a, --app-dir string              application directory (required)
  -e, --environment string          server environment (default \"production\")
  -c, --server-config string        server config file (default <app-dir>/config/<bin>.rb)
      --rackup-config string        rackup config file (default <app-dir>/config.ru)
  -p, --pid-file string             PID file (default <app-dir>/shared/pids/<bin>.pid)
  -t, --timeout int                 seconds to wait for process transitions (default 60)
      --bundler-cmd string          wrapper used to launch the server (default \"bundle exec\")
      --rails                       drive the Rails variant of the server binary
      --health-check-url string     URL polled until the server answers
      --health-check-content string substring the health response body must contain
      --health-check-timeout int    seconds before a health check fails (default 60)
      --start-wait int              seconds to sleep before health-checking a fresh master
      --no-proctitle-watch          do not watch the process title during upgrades
  -h, --help                        help for servctl
  -v, --version                     version for servctl

Exit codes:
  0: Operation succeeded
  1: Operation failed or bad invocation";
