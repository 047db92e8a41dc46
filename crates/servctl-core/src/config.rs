use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_BIN: &str = "unicorn";
pub const RAILS_SERVER_BIN: &str = "unicorn_rails";
pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_BUNDLER_CMD: &str = "bundle exec";

/// Immutable per-invocation configuration, resolved once by the CLI.
///
/// Config file, rackup and PID file locations are computed lazily from the
/// application directory unless overridden.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_dir: PathBuf,
    pub environment: String,
    pub server_bin: String,
    pub bundler_cmd: String,
    pub server_config: Option<PathBuf>,
    pub rackup_config: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    /// Deadline for process transitions: death waits, replacement
    /// detection, proctitle watching.
    pub timeout: Duration,
    pub health_url: Option<String>,
    pub health_content: Option<String>,
    /// Overall window for one health-check run.
    pub health_timeout: Duration,
    /// Limit for a single HTTP attempt inside that window.
    pub health_attempt_timeout: Duration,
    /// Extra sleep before health-checking a freshly booted master.
    pub start_wait: Duration,
    pub watch_proctitle: bool,
    pub poll_interval: Duration,
    /// Pause between issuing the launch command and expecting a PID file.
    pub settle_delay: Duration,
}

impl Config {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            server_bin: DEFAULT_SERVER_BIN.to_string(),
            bundler_cmd: DEFAULT_BUNDLER_CMD.to_string(),
            server_config: None,
            rackup_config: None,
            pid_file: None,
            timeout: Duration::from_secs(60),
            health_url: None,
            health_content: None,
            health_timeout: Duration::from_secs(60),
            health_attempt_timeout: Duration::from_secs(5),
            start_wait: Duration::ZERO,
            watch_proctitle: true,
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
        }
    }

    pub fn pid_file_path(&self) -> PathBuf {
        match &self.pid_file {
            Some(path) => path.clone(),
            None => self
                .app_dir
                .join("shared")
                .join("pids")
                .join(format!("{}.pid", self.server_bin)),
        }
    }

    pub fn server_config_path(&self) -> PathBuf {
        match &self.server_config {
            Some(path) => path.clone(),
            None => self
                .app_dir
                .join("config")
                .join(format!("{}.rb", self.server_bin)),
        }
    }

    pub fn rackup_config_path(&self) -> PathBuf {
        match &self.rackup_config {
            Some(path) => path.clone(),
            None => self.app_dir.join("config.ru"),
        }
    }
}
