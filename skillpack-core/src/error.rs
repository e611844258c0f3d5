//! Error types for asset installation and tracking
//!
//! Errors fall into four groups: validation problems with a bundle or its
//! metadata, operations a client cannot perform, filesystem failures, and
//! files on disk that cannot be parsed. Validation errors are always raised
//! before anything on disk is touched.

use std::path::PathBuf;
use thiserror::Error;

use crate::asset::AssetType;
use crate::client::ClientId;

#[derive(Error, Debug)]
pub enum SkillpackError {
    /// Malformed or incomplete metadata, missing bundle file, type mismatch
    #[error("Validation error: {0}")]
    Validation(String),

    /// No handler exists for this (client, type) pair
    #[error("{client} does not support {asset_type} assets")]
    Unsupported {
        client: ClientId,
        asset_type: AssetType,
    },

    /// The client has no native name for a canonical hook event
    #[error("{client} does not support hook event '{event}'")]
    UnsupportedEvent { client: ClientId, event: String },

    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file exists but cannot be parsed. Never reset silently.
    #[error("Failed to parse {path}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Path error: {0}")]
    Path(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SkillpackError>;

impl SkillpackError {
    pub fn validation(message: impl Into<String>) -> Self {
        SkillpackError::Validation(message.into())
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SkillpackError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SkillpackError::Validation(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            SkillpackError::Unsupported { .. } | SkillpackError::UnsupportedEvent { .. }
        )
    }
}

/// Extension for attaching a path to `std::io::Result`
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| SkillpackError::io(path, e))
    }
}
