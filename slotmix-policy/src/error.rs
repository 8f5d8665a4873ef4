//! Error types for slotmix-policy

use thiserror::Error;

/// Error type for policy operations
///
/// The selection path never returns these to its caller: collaborator
/// failures are logged and replaced with a default value. Only caller
/// input (configuration, constraint updates) surfaces an error.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// An external collaborator (record store, evaluator, generator) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// A rotation constraint was outside its allowed range
    #[error("Invalid rotation constraint: {0}")]
    InvalidConstraint(String),

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PolicyError::Collaborator("record store offline".into());
        assert!(err.to_string().contains("record store offline"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PolicyError = io_err.into();
        assert!(matches!(err, PolicyError::Io(_)));
    }

    #[test]
    fn test_error_from_toml() {
        let parse_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: PolicyError = parse_err.into();
        assert!(matches!(err, PolicyError::ConfigParse(_)));
    }
}
