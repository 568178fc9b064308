//! Error types for the avoidance core.

use thiserror::Error;

/// Avoidance core error type.
///
/// The planner itself never fails a cycle; errors arise only from
/// configuration handling.
#[derive(Error, Debug)]
pub enum AvoidanceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for AvoidanceError {
    fn from(e: toml::de::Error) -> Self {
        AvoidanceError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AvoidanceError>;
