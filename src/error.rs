use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification every registry failure maps onto.
///
/// Callers (request handlers, the CLI) branch on the kind, never on the
/// concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Internal,
}

/// Registry error type with miette diagnostics.
#[derive(Error, Debug, Diagnostic)]
pub enum RegistryError {
    #[error("Not found: {0}")]
    #[diagnostic(code(registry::not_found))]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(registry::invalid_argument),
        help("Check the module snapshot for exactly one recognized config file")
    )]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(registry::internal_error))]
    Internal(String),

    #[error("Decode error: {0}")]
    #[diagnostic(code(registry::decode_error))]
    Decode(String),

    #[error("Database error: {0}")]
    #[diagnostic(
        code(registry::database_error),
        help("Check database connection and schema integrity")
    )]
    Database(String),

    #[error("Index error: {0}")]
    #[diagnostic(code(registry::index_error))]
    Index(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(registry::config_error))]
    Config(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(registry::io_error))]
    Io(#[from] std::io::Error),

    #[error("IO error: {message}")]
    #[diagnostic(code(registry::io_error_detailed))]
    IoDetailed {
        message: String,
        path: Option<PathBuf>,
    },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Prefix the message with `context`, keeping the variant.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            RegistryError::NotFound(m) => RegistryError::NotFound(format!("{}: {}", context, m)),
            RegistryError::InvalidArgument(m) => {
                RegistryError::InvalidArgument(format!("{}: {}", context, m))
            }
            RegistryError::Internal(m) => RegistryError::Internal(format!("{}: {}", context, m)),
            RegistryError::Decode(m) => RegistryError::Decode(format!("{}: {}", context, m)),
            RegistryError::IoDetailed { message, path } => RegistryError::IoDetailed {
                message: format!("{}: {}", context, message),
                path,
            },
            other => other,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        RegistryError::NotFound(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RegistryError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RegistryError::Internal(message.into())
    }

    pub fn decode_error(message: impl Into<String>) -> Self {
        RegistryError::Decode(message.into())
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        RegistryError::Database(message.into())
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        RegistryError::Index(message.into())
    }

    pub fn io_error(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        RegistryError::IoDetailed {
            message: message.into(),
            path,
        }
    }
}

impl From<tantivy::TantivyError> for RegistryError {
    fn from(error: tantivy::TantivyError) -> Self {
        RegistryError::Index(error.to_string())
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(error: sqlx::Error) -> Self {
        RegistryError::Database(error.to_string())
    }
}

impl From<config::ConfigError> for RegistryError {
    fn from(error: config::ConfigError) -> Self {
        RegistryError::Config(error.to_string())
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(error: tokio::task::JoinError) -> Self {
        RegistryError::Internal(format!("background task failed: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RegistryError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            RegistryError::invalid_argument("x").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(RegistryError::internal("x").kind(), ErrorKind::Internal);
        assert_eq!(RegistryError::decode_error("x").kind(), ErrorKind::Internal);
        assert_eq!(RegistryError::database_error("x").kind(), ErrorKind::Internal);
        assert_eq!(
            RegistryError::io_error("x", None).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_with_context() {
        let error = RegistryError::not_found("acme/payments");
        let with_context = error.with_context("resolving dependencies");

        match with_context {
            RegistryError::NotFound(message) => {
                assert!(message.contains("resolving dependencies"));
                assert!(message.contains("acme/payments"));
            }
            other => panic!("Expected NotFound variant, got {:?}", other),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: RegistryError = io_error.into();

        assert!(matches!(error, RegistryError::Io(_)));
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_display() {
        let error = RegistryError::invalid_argument("two config files");
        let display = format!("{}", error);
        assert!(display.contains("Invalid argument"));
        assert!(display.contains("two config files"));
    }
}
