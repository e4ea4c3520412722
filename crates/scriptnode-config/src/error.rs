//! Error types for configuration operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::deprecation::DeprecationError;
use crate::validation::ValidationError;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Failed to parse or serialize JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension names no known format
    #[error("unsupported file format: '{0}' (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),

    /// An engine setting is out of range
    #[error("invalid engine setting '{name}': {reason}")]
    InvalidSetting {
        /// Setting name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A network includes one that is not flagged for compilation
    #[error("{network} includes {include}, which is not flagged for compilation")]
    InvalidInclude {
        /// Including network.
        network: String,
        /// Included network.
        include: String,
    },

    /// Two networks include each other
    #[error("Cyclic reference: {0} && {1}")]
    CyclicReference(String, String),

    /// Structural validation failed
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Deprecated node configurations were found
    #[error(transparent)]
    Deprecated(#[from] DeprecationError),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn read_file_factory_produces_correct_variant() {
        let err = ConfigError::read_file("/some/path", mock_io_err());
        assert!(
            matches!(err, ConfigError::ReadFile { ref path, .. } if path == std::path::Path::new("/some/path"))
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn cyclic_reference_message() {
        let err = ConfigError::CyclicReference("a".into(), "b".into());
        assert_eq!(err.to_string(), "Cyclic reference: a && b");
    }

    #[test]
    fn invalid_include_message() {
        let err = ConfigError::InvalidInclude {
            network: "main".into(),
            include: "fx".into(),
        };
        assert_eq!(
            err.to_string(),
            "main includes fx, which is not flagged for compilation"
        );
    }

    #[test]
    fn unsupported_format_names_the_path() {
        let err = ConfigError::UnsupportedFormat("net.xml".into());
        assert!(err.to_string().contains("net.xml"));
    }
}
