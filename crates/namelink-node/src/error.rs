//! Error types for the node orchestrator.

use crate::face::FaceError;

/// Errors that can occur while building or starting the daemon.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("name error: {0}")]
    Name(#[from] namelink_core::NameError),
    #[error("face error: {0}")]
    Face(#[from] FaceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("node already running")]
    AlreadyRunning,
}
