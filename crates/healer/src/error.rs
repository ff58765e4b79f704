//! Error types for the stack monitor.
//!
//! None of these escape a scheduler cycle: each is converted into an issue
//! or status on the stack it concerns.

use std::path::PathBuf;

use thiserror::Error;

/// A stack key that cannot name a directory directly under the data root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid stack key {key:?}: {reason}")]
pub struct InvalidStackKey {
    pub key: String,
    pub reason: &'static str,
}

/// A call into the stack controller failed.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    InvalidKey(#[from] InvalidStackKey),

    /// The controller process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The controller ran but reported failure.
    #[error("{command} exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    /// The call did not finish in time.
    #[error("{command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// The controller output could not be understood.
    #[error("unreadable output from {command}: {reason}")]
    Parse { command: String, reason: String },

    /// Filesystem access under the data root failed.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The history store could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Invalid monitor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("cannot determine data root: set AGENTFORGE_HOME or HOME")]
    NoDataRoot,
}
