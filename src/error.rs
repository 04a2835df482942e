use serde::Serialize;
use thiserror::Error;

use crate::infrastructure::DirectoryError;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Identity not found: {0}")]
    NotFound(String),

    #[error("Ambiguous match for '{key}': {count} directory objects matched")]
    AmbiguousMatch { key: String, count: usize },

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Directory timeout: {0}")]
    DirectoryTimeout(String),

    #[error("Recursion limit exceeded while expanding '{group}' at depth {depth}")]
    RecursionLimitExceeded { group: String, depth: usize },

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Serializable error for JSON reports
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for CommandError {
    fn from(err: &AppError) -> Self {
        CommandError {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        CommandError::from(self).serialize(serializer)
    }
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AmbiguousMatch { .. } => "AMBIGUOUS_MATCH",
            AppError::GroupNotFound(_) => "GROUP_NOT_FOUND",
            AppError::DirectoryTimeout(_) => "DIRECTORY_TIMEOUT",
            AppError::RecursionLimitExceeded { .. } => "RECURSION_LIMIT_EXCEEDED",
            AppError::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::IoError(_) => "IO_ERROR",
            AppError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Ambiguous matches are a data-quality problem in the directory, not a
    /// failure of the run. Callers log them as warnings.
    pub fn is_data_quality(&self) -> bool {
        matches!(self, AppError::AmbiguousMatch { .. })
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Timeout(msg) => AppError::DirectoryTimeout(msg),
            DirectoryError::NoSuchObject(msg) => AppError::NotFound(msg),
            DirectoryError::Ambiguous { name, count } => AppError::AmbiguousMatch { key: name, count },
            DirectoryError::Unavailable(msg) => AppError::DirectoryUnavailable(msg),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_error_mapping() {
        let err: AppError = DirectoryError::Timeout("chain query".to_string()).into();
        assert_eq!(err.error_code(), "DIRECTORY_TIMEOUT");

        let err: AppError = DirectoryError::Unavailable("bind refused".to_string()).into();
        assert_eq!(err.error_code(), "DIRECTORY_UNAVAILABLE");

        let err: AppError = DirectoryError::NoSuchObject("CN=Gone,DC=ex,DC=edu".to_string()).into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = DirectoryError::Ambiguous {
            name: "Staff".to_string(),
            count: 2,
        }
        .into();
        assert!(matches!(err, AppError::AmbiguousMatch { ref key, count: 2 } if key == "Staff"));
        assert!(err.is_data_quality());
    }

    #[test]
    fn test_ambiguous_is_data_quality() {
        let err = AppError::AmbiguousMatch {
            key: "jdoe".to_string(),
            count: 2,
        };
        assert!(err.is_data_quality());
        assert!(!AppError::NotFound("jdoe".to_string()).is_data_quality());
    }

    #[test]
    fn test_serializes_code_and_message() {
        let err = AppError::RecursionLimitExceeded {
            group: "AllStaff".to_string(),
            depth: 21,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "RECURSION_LIMIT_EXCEEDED");
        assert!(json["message"].as_str().unwrap().contains("AllStaff"));
    }
}
