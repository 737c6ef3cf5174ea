//! Façade error taxonomy.
//!
//! Validation and not-found failures carry the `(status, payload)` pair the
//! calling HTTP layer turns into an aborted request.

use crate::model::entity::EntityError;
use crate::session::SessionError;

pub type FacadeResult<T> = Result<T, FacadeError>;

pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    /// Every violation message, in rule order.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{entity}: {message}")]
    NotFound {
        entity: &'static str,
        message: String,
    },
    /// Malformed call; a programming error rather than client input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<EntityError> for FacadeError {
    fn from(value: EntityError) -> Self {
        Self::Session(SessionError::Entity(value))
    }
}

impl FacadeError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => STATUS_BAD_REQUEST,
            Self::NotFound { .. } => STATUS_NOT_FOUND,
            Self::InvalidArgument(_) | Self::Session(_) => STATUS_INTERNAL_ERROR,
        }
    }

    /// Response body: a JSON array of messages for validation failures, the
    /// plain message otherwise.
    pub fn payload(&self) -> String {
        match self {
            Self::Validation(messages) => serde_json::Value::from(messages.clone()).to_string(),
            Self::NotFound { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
