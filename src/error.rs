//! Error types for Replayflow.
//!
//! All errors in Replayflow are represented by the `ReplayflowError` enum,
//! which provides specific variants for the capture, graph, selector and
//! replay layers.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Replayflow operations.
///
/// Each variant represents a specific category of error that can occur
/// while capturing, editing, persisting or replaying a step graph.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum ReplayflowError {
    /// Engine-level errors (startup, runtime wiring).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// A caller referenced something that does not exist or supplied
    /// malformed data. The graph is left unmodified.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Every primary and alternative locator strategy failed.
    #[error("element not found at step {step}: {selector}")]
    ElementNotFound {
        step: usize,
        selector: String,
    },

    /// Shadow-root traversal exceeded the configured depth.
    #[error("shadow traversal exceeded max depth {0}")]
    ShadowTraversalLimit(usize),

    /// A replay command arrived in a state that does not accept it.
    #[error("cannot {command} while {state}")]
    InvalidTransition {
        state: String,
        command: String,
    },

    /// Capture and replay are mutually exclusive; the requested operation
    /// conflicts with the one in progress.
    #[error("{0}")]
    Busy(String),

    /// A raw capture event was malformed and dropped.
    #[error("capture: {0}")]
    Capture(String),

    /// Replay target errors while executing an action.
    #[error("{0}")]
    Target(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl ReplayflowError {
    /// Whether the error only concerns a single replay step.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, ReplayflowError::ElementNotFound { .. } | ReplayflowError::ShadowTraversalLimit(_))
    }
}

impl From<ReplayflowError> for String {
    fn from(val: ReplayflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for ReplayflowError {
    fn from(error: std::io::Error) -> Self {
        ReplayflowError::IoError(error.to_string())
    }
}

impl From<ReplayflowError> for std::io::Error {
    fn from(val: ReplayflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for ReplayflowError {
    fn from(_: FromUtf8Error) -> Self {
        ReplayflowError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for ReplayflowError {
    fn from(error: serde_json::Error) -> Self {
        ReplayflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for ReplayflowError {
    fn from(error: toml::de::Error) -> Self {
        ReplayflowError::Config(error.to_string())
    }
}
