//! Error types for configuration loading, transports and the engine

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the assessment configuration.
///
/// All of these are fatal: they are surfaced before any monitoring starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("target name must not be empty")]
    EmptyTargetName,

    #[error("requirement {index} of {scope} has an invalid target: {reason}")]
    InvalidTarget {
        scope: String,
        index: usize,
        reason: String,
    },

    #[error("requirement {index} of {scope} has a negative tolerance")]
    NegativeTolerance { scope: String, index: usize },

    #[error("{scope} has an invalid duration for '{field}'")]
    InvalidDuration { scope: String, field: &'static str },

    #[error("unknown metric '{0}' (expected execution_time, number_of_messages or frequency)")]
    UnknownMetric(String),

    #[error("channel '{0}' is configured more than once")]
    DuplicateChannel(String),

    #[error("metric '{0}' is configured more than once")]
    DuplicateMetric(String),
}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport could not answer right now; the caller may retry.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The transport is gone for good.
    #[error("transport disconnected")]
    Disconnected,
}

/// Errors that end an assessment engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}
