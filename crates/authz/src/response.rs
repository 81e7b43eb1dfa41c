//! JSON error bodies for the route layer.
//!
//! Two shapes are rendered, and clients depend on the split:
//!
//! - authorization failures: `{"success": false, "error": 401, "code": "token_expired", "description": "Token expired."}`
//! - framework failures: `{"success": false, "error": 404, "message": "Page not found"}`

use serde::Serialize;

use crate::error::AuthError;

/// Body rendered for an [`AuthError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthErrorBody {
    /// Always `false`.
    pub success: bool,
    /// HTTP status.
    pub error: u16,
    /// Machine-readable error code.
    pub code: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

impl From<&AuthError> for AuthErrorBody {
    fn from(err: &AuthError) -> Self {
        Self {
            success: false,
            error: err.status_code(),
            code: err.code(),
            description: err.description(),
        }
    }
}

impl AuthError {
    /// The JSON body for this error.
    #[must_use]
    pub fn to_body(&self) -> AuthErrorBody {
        AuthErrorBody::from(self)
    }
}

/// Errors raised by the web framework rather than the authorization core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FrameworkError {
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 422
    UnprocessableEntity,
}

impl FrameworkError {
    /// HTTP status.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::UnprocessableEntity => 422,
        }
    }

    /// Message sent to clients. Existing clients match on these strings,
    /// spelling included.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad request",
            Self::NotFound => "Page not found",
            Self::MethodNotAllowed => "Invalid method",
            Self::UnprocessableEntity => "Unprocessable recource",
        }
    }

    /// Maps a status code back to a framework error.
    #[must_use]
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(Self::BadRequest),
            404 => Some(Self::NotFound),
            405 => Some(Self::MethodNotAllowed),
            422 => Some(Self::UnprocessableEntity),
            _ => None,
        }
    }

    /// The JSON body for this error.
    #[must_use]
    pub fn to_body(self) -> MessageBody {
        MessageBody { success: false, error: self.status_code(), message: self.message() }
    }
}

/// Body rendered for a [`FrameworkError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageBody {
    /// Always `false`.
    pub success: bool,
    /// HTTP status.
    pub error: u16,
    /// Human-readable message.
    pub message: &'static str,
}
