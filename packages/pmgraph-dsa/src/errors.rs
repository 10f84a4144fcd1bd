//! Error types for pmgraph-dsa
//!
//! Only recoverable conditions are errors: malformed input modules, queries
//! for graphs a stage never computed, bad configuration and I/O.
//! Analysis invariant violations panic instead.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for data-structure analysis operations
#[derive(Debug, Error)]
pub enum DsaError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The program module is malformed
    #[error("Invalid module: {0}")]
    InvalidModule(String),

    /// A stage was asked for a graph it does not hold
    #[error("No graph computed for function '{function}' in the {stage} stage")]
    MissingGraph { function: String, stage: String },

    /// Lookup by name failed
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DsaError {
    /// Create an invalid-module error
    pub fn invalid_module(msg: impl Into<String>) -> Self {
        DsaError::InvalidModule(msg.into())
    }

    /// Create a missing-graph error
    pub fn missing_graph(function: impl Into<String>, stage: impl ToString) -> Self {
        DsaError::MissingGraph {
            function: function.into(),
            stage: stage.to_string(),
        }
    }
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, DsaError>;
