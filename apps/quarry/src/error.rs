//! Errors surfaced by the command-line host.

use quarry_core::{QuarryError, StoreError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("database already exists at {0} (use --force to recreate)")]
    AlreadyExists(PathBuf),

    #[error("no {kind} with id '{id}' in the scene")]
    UnknownEntity { kind: &'static str, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Quarry(#[from] QuarryError),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
