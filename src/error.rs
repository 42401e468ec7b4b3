use thiserror::Error;

/// Failures raised by the landmark geometry helpers.
///
/// Detector and capture failures are not represented here; they travel as
/// `anyhow::Error` untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl HandError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        HandError::InvalidInput(msg.into())
    }
}

pub type Result<T, E = HandError> = std::result::Result<T, E>;
