use thiserror::Error;
use warp::http::StatusCode;

/// Failure taxonomy for the domain operations. Every variant maps onto the
/// HTTP status the handlers answer with; store failures collapse into
/// `Internal`.
#[derive(Error, Debug)]
pub enum ClassroomError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ClassroomError {
    pub fn status(&self) -> StatusCode {
        match self {
            ClassroomError::Validation(_) => StatusCode::BAD_REQUEST,
            ClassroomError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ClassroomError::Forbidden(_) => StatusCode::FORBIDDEN,
            ClassroomError::NotFound(_) => StatusCode::NOT_FOUND,
            ClassroomError::Conflict(_) => StatusCode::CONFLICT,
            ClassroomError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ClassroomError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ClassroomError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ClassroomError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ClassroomError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ClassroomError::Conflict(msg.into())
    }
}
