use std::path::PathBuf;

use thiserror::Error;

/// Failure classes for lifecycle operations.
///
/// Transient probe failures (a signal racing a process exit, one HTTP
/// attempt timing out) never surface here; they are swallowed and retried
/// by the enclosing poll.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Missing or unreadable configuration. Fatal; nothing is attempted.
    #[error("configuration error: {0}")]
    Config(String),

    /// The launch command failed, or it succeeded and no live master
    /// appeared behind the PID file afterwards.
    #[error("launch failed: {0}")]
    Launch(String),

    /// A configured health check never passed inside its window.
    #[error("health check failed: {0}")]
    Unhealthy(String),

    /// The PID file exists but cannot be read or holds garbage.
    #[error("pid file {path}: {reason}")]
    PidFile { path: PathBuf, reason: String },
}
