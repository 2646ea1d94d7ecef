//! Error taxonomy shared by every pipeline stage.

use std::path::{Path, PathBuf};

use ipk_schema::MetadataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackagerError {
    /// Bad invocation or inputs: no or ambiguous application directory,
    /// empty directory list, colliding identities.
    #[error("Input error: {0}")]
    Input(String),

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    #[error("Failed to transform {}: {message}", path.display())]
    Transform { path: PathBuf, message: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    UnlocatedIo(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),
}

impl PackagerError {
    /// Attach the offending path to an I/O failure.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn transform(path: impl AsRef<Path>, msg: impl std::fmt::Display) -> Self {
        Self::Transform {
            path: path.as_ref().to_path_buf(),
            message: msg.to_string(),
        }
    }

    /// Returns `true` for failures caused by the caller's inputs rather than the filesystem.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

/// Extension for tagging `io::Result`s with the path they concern.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T, PackagerError>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T, PackagerError> {
        self.map_err(|e| PackagerError::io(path, e))
    }
}

pub type Result<T, E = PackagerError> = std::result::Result<T, E>;
