use thiserror::Error;

/// Errors raised while loading or validating the transfer configuration.
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    /// A value is missing, malformed or out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The `.env` file could not be read or parsed.
    #[error("Environment file error: {0}")]
    EnvFile(String),
}
