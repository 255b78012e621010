//! HTTP error responses.
//!
//! Every variant renders one fixed plain-text body. Internal error text is
//! logged by the caller and never reaches a response.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use keyrelay_authn::{AuthError, ErrorKind, ExchangeError, ExchangeStage};

/// A rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    /// The request body is not a well-formed assertion.
    BadRequest,
    /// Authentication failed. Deliberately indistinguishable across causes.
    Unauthorized,
    /// Missing parameter on `/getkey`, or an invalid session token.
    Forbidden,
    /// Unknown identity on `/getkey`.
    NotFound,
    /// A dependency could not answer.
    Unavailable,
    /// Something on our side broke.
    Internal,
}

impl ApiError {
    /// HTTP status of this error.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The constant response body.
    #[must_use]
    pub fn body(self) -> &'static str {
        match self {
            Self::BadRequest => "malformed request\n",
            Self::Unauthorized => "unauthorized\n",
            Self::Forbidden => "forbidden\n",
            Self::NotFound => "not found\n",
            Self::Unavailable => "service unavailable\n",
            Self::Internal => "internal error\n",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], self.body())
            .into_response()
    }
}

impl From<&ExchangeError> for ApiError {
    fn from(err: &ExchangeError) -> Self {
        match err.kind() {
            ErrorKind::MissingParameter => Self::BadRequest,
            ErrorKind::Malformed if err.stage == ExchangeStage::ReceivedAssertion => Self::BadRequest,
            // Unparseable key material served by the directory is its fault, not the client's.
            ErrorKind::Malformed
                if matches!(err.error, AuthError::InvalidKey { .. } | AuthError::Directory(_)) =>
            {
                Self::Unavailable
            },
            ErrorKind::Unavailable => Self::Unavailable,
            // Anything else malformed after the lookup must not reveal that the identity exists.
            ErrorKind::Malformed
            | ErrorKind::NotFound
            | ErrorKind::SignatureError
            | ErrorKind::Expired
            | ErrorKind::NotYetValid => Self::Unauthorized,
            _ => Self::Internal,
        }
    }
}
