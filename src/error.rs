use thiserror::Error;

use crate::monitor::template::TemplateError;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("SSH connection inactive: {0}")]
    SessionInactive(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// True for failures caused by the SSH session rather than the request.
    pub fn is_session_failure(&self) -> bool {
        matches!(
            self,
            MonitorError::Authentication(_)
                | MonitorError::Connectivity(_)
                | MonitorError::SessionInactive(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
