use std::process::{Command, Stdio};

use crate::config::Config;
use crate::error::ControlError;

/// Renders the shell command that boots the server as a daemon.
pub fn launch_command(config: &Config) -> String {
    format!(
        "cd {} && {} {} -E {} -D -c {} {}",
        config.app_dir.display(),
        config.bundler_cmd,
        config.server_bin,
        config.environment,
        config.server_config_path().display(),
        config.rackup_config_path().display(),
    )
}

/// Runs the launch command with our stdio detached. The server daemonizes
/// itself, so the wrapper is expected to exit promptly; a non-zero exit is
/// a launch failure.
pub fn spawn_server(config: &Config) -> Result<(), ControlError> {
    let command = launch_command(config);
    let status = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| ControlError::Launch(format!("{command}: {err}")))?;
    if !status.success() {
        return Err(ControlError::Launch(format!(
            "{command}: exit status {}",
            status.code().unwrap_or(-1),
        )));
    }
    Ok(())
}
