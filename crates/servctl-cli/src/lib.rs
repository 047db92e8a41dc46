//! servctl: command-line lifecycle controller for a forking application
//! server.

pub mod control;

use std::sync::OnceLock;

static VERSION: OnceLock<String> = OnceLock::new();

/// Set the version string for `--version` output.
pub fn set_version(version: &str) {
    let _ = VERSION.set(version.to_string());
}

pub(crate) fn get_version() -> &'static str {
    VERSION.get().map(|s| s.as_str()).unwrap_or("dev")
}

/// Entry point for the `servctl` binary.
pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    control::run_from_env(&args, &mut stdout, &mut stderr)
}
