use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use chess_reference::RulesError;

use crate::report::RunReport;

/// Failures talking to an engine process.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {waited:?}")]
    Timeout {
        program: String,
        waited: Duration,
        /// Error-stream lines collected before the process was killed
        diagnostics: Vec<String>,
    },

    #[error("{program} exited unexpectedly")]
    Exited {
        program: String,
        diagnostics: Vec<String>,
    },

    #[error("engine session is closed; restart it first")]
    NotRunning,

    #[error("malformed reply {reply:?} to {request:?}: {reason}")]
    Format {
        request: String,
        reply: String,
        reason: String,
    },

    #[error("opponent has no move in {fen}")]
    NoMove { fen: String },
}

impl EngineError {
    /// Whether the session is unusable until it is restarted.
    ///
    /// Format errors leave the session in sync (one request, one reply) and
    /// are reported against the item that triggered them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Format { .. } | EngineError::NoMove { .. })
    }

    /// Error-stream output captured on the fatal path, if any.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            EngineError::Timeout { diagnostics, .. } | EngineError::Exited { diagnostics, .. } => {
                diagnostics
            }
            _ => &[],
        }
    }
}

/// Failures of a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("test name {0:?} is registered twice")]
    DuplicateTest(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: {reason}")]
    Fixture {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A fatal engine error ended the run; the results gathered so far are kept.
    #[error("run aborted: {source}")]
    Aborted {
        report: Box<RunReport>,
        #[source]
        source: EngineError,
    },
}
