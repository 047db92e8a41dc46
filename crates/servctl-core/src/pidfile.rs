use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ControlError;

/// Suffix of the marker file that exists only while an upgrade is in
/// flight, holding the PID of the master being replaced.
pub const OLD_BINARY_SUFFIX: &str = ".oldbin";

/// One PID file on disk: the current master's, or its old-binary sibling.
///
/// The file is written by the launched server itself; this side only ever
/// reads it and removes it once stale or no longer needed.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The old-binary sibling of this file.
    pub fn old_binary(&self) -> Self {
        let mut raw = self.path.clone().into_os_string();
        raw.push(OLD_BINARY_SUFFIX);
        Self {
            path: PathBuf::from(raw),
        }
    }

    /// Reads the stored PID. An absent file is `None`; an unreadable file
    /// or one holding anything but a positive decimal is an error.
    pub fn read(&self) -> Result<Option<i32>, ControlError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ControlError::PidFile {
                    path: self.path.clone(),
                    reason: err.to_string(),
                })
            }
        };
        let trimmed = raw.trim();
        let pid = trimmed.parse::<i32>().map_err(|_| ControlError::PidFile {
            path: self.path.clone(),
            reason: format!("invalid content {trimmed:?}"),
        })?;
        if pid <= 0 {
            return Err(ControlError::PidFile {
                path: self.path.clone(),
                reason: format!("non-positive pid {pid}"),
            });
        }
        Ok(Some(pid))
    }

    /// Removes the file. A file that is already gone is not an error.
    pub fn remove(&self) -> Result<(), ControlError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ControlError::PidFile {
                path: self.path.clone(),
                reason: err.to_string(),
            }),
        }
    }
}
