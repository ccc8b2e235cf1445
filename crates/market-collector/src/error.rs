//! Error types for the collector.
//!
//! Network-facing clients return `anyhow::Result`; these typed errors cover the
//! failures that escape the controller.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SessionState;

/// Top-level error returned by `SessionController`.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Record file could not be opened or written. Fatal for the session.
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http client error: {0}")]
    Client(#[from] anyhow::Error),
}

/// Record file errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Illegal `MarketSession` state change.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}
