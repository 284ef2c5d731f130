//! Fatal error types for the co-simulation engine.
//!
//! Only the fatal kinds named in the error handling design are represented
//! here: configuration errors, unreadable trace/config/BB-info files, and
//! internal invariant violations. Transient conditions (cache MSHR full,
//! reorder window full, memory refusal, offload queue full) are never
//! represented as `SimError` — they are plain `bool`/outcome-enum returns
//! consumed by the same tick that produced them and retried locally.

use std::path::PathBuf;

/// Fatal errors that abort the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A required config key was missing, or a config value is outside its
    /// valid domain (e.g. an unsupported `standard`).
    #[error("configuration error: {0}")]
    Config(String),

    /// The config file could not be opened or parsed as JSON.
    #[error("failed to load config file {path}: {source}")]
    ConfigFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O or JSON error.
        #[source]
        source: ConfigFileError,
    },

    /// Every trace file named on the command line failed to open, leaving
    /// zero assigned cores.
    #[error("no trace file could be opened; {count} core(s) left unassigned")]
    NoTraceAssigned {
        /// Number of cores that ended up unassigned.
        count: usize,
    },

    /// A BB-info descriptor file required by a stricter policy could not be
    /// read. By default a missing BB-info file only degrades the
    /// Co-Simulation heuristic and does not raise this error.
    #[error("failed to load BB-info file {path}: {source}")]
    BbInfoFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An internal invariant was violated: negative in-flight counts, a
    /// reorder-window overflow, a callback with no matching MSHR, or any
    /// other condition indicating an engine bug rather than a modeled
    /// hardware limit.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Wraps the two failure modes of reading a config file so [`SimError::ConfigFile`]
/// has one concrete source type regardless of which step failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// The file could not be read from disk.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The file was read but did not parse as valid JSON matching [`crate::config::Config`].
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
