use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `AtendoError` values.
pub enum AtendoError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("session {0} is not connected")]
    NotConnected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl AtendoError {
    /// Stable reason code used in gateway error payloads and logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotConnected(_) => "not_connected",
            Self::Transport(_) => "transport_error",
            Self::Validation(_) => "validation_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Wraps a store failure; keeps the anyhow chain as display text.
    pub fn storage(error: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{error:#}"))
    }
}
