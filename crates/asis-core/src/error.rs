use thiserror::Error;

/// Top-level error type for the ASIS workspace.
///
/// Subsystem crates define their own error enums and convert from
/// `AsisError` so that storage and config failures propagate with `?`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AsisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service error: {0}")]
    Service(String),
}

impl From<toml::de::Error> for AsisError {
    fn from(err: toml::de::Error) -> Self {
        AsisError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AsisError {
    fn from(err: toml::ser::Error) -> Self {
        AsisError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AsisError {
    fn from(err: serde_json::Error) -> Self {
        AsisError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for ASIS operations.
pub type Result<T> = std::result::Result<T, AsisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AsisError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = AsisError::NotFound("task 42".to_string());
        assert_eq!(err.to_string(), "Not found: task 42");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AsisError = io_err.into();
        assert!(matches!(err, AsisError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let asis_err: AsisError = err.unwrap_err().into();
        assert!(matches!(asis_err, AsisError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let asis_err: AsisError = err.unwrap_err().into();
        assert!(matches!(asis_err, AsisError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(format!("got {}", value))
        }

        assert_eq!(inner().unwrap(), "got 42");
    }
}
