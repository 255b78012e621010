//! The token exchange HTTP service.
//!
//! ```text
//! POST /login   body = client assertion
//!   200  session token (application/jwt)
//!   400  not an assertion, or no issuer
//!   401  any authentication failure (one constant body)
//!   503  key directory unavailable or serving bad keys
//!   500  issuance failed
//!
//! POST /        body = session token
//!   200  protected payload
//!   403  any validation failure (one constant body)
//! ```

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use keyrelay_authn::{SessionValidator, TokenExchanger};

use crate::{error::ApiError, facts::random_fact};

/// Media type of an issued session token.
pub const JWT_CONTENT_TYPE: &str = "application/jwt";

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 8 * 1024;

/// Shared handles of the exchange service.
#[derive(Debug, Clone)]
pub struct ExchangeState {
    exchanger: Arc<TokenExchanger>,
    validator: Arc<SessionValidator>,
}

impl ExchangeState {
    /// Bundles an exchanger and the validator for the tokens it issues.
    pub fn new(exchanger: TokenExchanger, validator: SessionValidator) -> Self {
        Self { exchanger: Arc::new(exchanger), validator: Arc::new(validator) }
    }
}

/// Routes of the exchange service.
pub fn router(state: ExchangeState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/", post(protected))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn login(State(state): State<ExchangeState>, body: Bytes) -> Result<Response, ApiError> {
    let assertion = std::str::from_utf8(&body).map_err(|_| {
        tracing::info!("login body is not UTF-8");
        ApiError::BadRequest
    })?;

    match state.exchanger.exchange(assertion.trim()).await {
        Ok(session) => Ok(([(header::CONTENT_TYPE, JWT_CONTENT_TYPE)], session.token).into_response()),
        Err(err) => Err(ApiError::from(&err)),
    }
}

#[tracing::instrument(skip_all)]
async fn protected(State(state): State<ExchangeState>, body: Bytes) -> Result<&'static str, ApiError> {
    let token = std::str::from_utf8(&body).map_err(|_| ApiError::Forbidden)?;

    state.validator.validate(token.trim()).map_err(|e| {
        tracing::info!(kind = %e.kind(), error = %e, "session token rejected");
        ApiError::Forbidden
    })?;

    Ok(random_fact())
}
