//! The key directory HTTP service.
//!
//! ```text
//! GET /getkey?identity=<id>
//!   200  PEM public key (application/x-pem-file)
//!   403  identity missing or empty
//!   404  identity unknown or not a valid identity
//!   500  stored key unreadable or unparseable
//! ```

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use keyrelay_keydir::{DirectoryError, Identity, KeyDirectory};
use serde::Deserialize;

use crate::error::ApiError;

/// Media type of a served key.
pub const PEM_CONTENT_TYPE: &str = "application/x-pem-file";

#[derive(Clone)]
struct DirectoryState {
    directory: Arc<dyn KeyDirectory>,
}

#[derive(Debug, Deserialize)]
struct GetKeyParams {
    identity: Option<String>,
}

/// Routes of the key directory service over `directory`.
pub fn router(directory: Arc<dyn KeyDirectory>) -> Router {
    Router::new().route("/getkey", get(getkey)).with_state(DirectoryState { directory })
}

#[tracing::instrument(skip_all, fields(identity = tracing::field::Empty))]
async fn getkey(
    State(state): State<DirectoryState>,
    Query(params): Query<GetKeyParams>,
) -> Result<Response, ApiError> {
    let raw = params.identity.as_deref().unwrap_or_default();
    if raw.is_empty() {
        tracing::info!("getkey without identity");
        return Err(ApiError::Forbidden);
    }
    tracing::Span::current().record("identity", raw);

    let identity = Identity::parse(raw).map_err(|e| {
        tracing::info!(error = %e, "rejected identity");
        ApiError::NotFound
    })?;

    match state.directory.lookup(&identity).await {
        Ok(record) => {
            tracing::info!(algorithm = %record.algorithm(), "served key");
            Ok(([(header::CONTENT_TYPE, PEM_CONTENT_TYPE)], record.public_key_pem().to_owned())
                .into_response())
        },
        Err(e @ (DirectoryError::NotFound { .. } | DirectoryError::InvalidIdentity { .. })) => {
            tracing::info!(error = %e, "unknown identity");
            Err(ApiError::NotFound)
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to load key");
            Err(ApiError::Internal)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use keyrelay_authn::testutil::ALICE_PUBLIC_KEY;
    use keyrelay_keydir::FileKeyDirectory;
    use rstest::rstest;
    use tower::ServiceExt;

    use super::*;

    fn file_router() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alice.key.pub"), ALICE_PUBLIC_KEY).unwrap();
        std::fs::write(dir.path().join("broken.key.pub"), "not a key").unwrap();
        let router = router(Arc::new(FileKeyDirectory::new(dir.path())));
        (dir, router)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response =
            router.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_serves_registered_key() {
        let (_dir, router) = file_router();

        let (status, content_type, body) = get(router, "/getkey?identity=alice").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(PEM_CONTENT_TYPE));
        assert_eq!(body.trim(), ALICE_PUBLIC_KEY.trim());
    }

    #[rstest]
    #[case::missing("/getkey", StatusCode::FORBIDDEN)]
    #[case::empty("/getkey?identity=", StatusCode::FORBIDDEN)]
    #[case::unknown("/getkey?identity=bob", StatusCode::NOT_FOUND)]
    #[case::traversal("/getkey?identity=..%2Falice", StatusCode::NOT_FOUND)]
    #[case::absolute("/getkey?identity=%2Fetc%2Fpasswd", StatusCode::NOT_FOUND)]
    #[case::unparseable("/getkey?identity=broken", StatusCode::INTERNAL_SERVER_ERROR)]
    #[tokio::test]
    async fn test_rejections(#[case] uri: &str, #[case] expected: StatusCode) {
        let (_dir, router) = file_router();

        let (status, content_type, body) = get(router, uri).await;

        assert_eq!(status, expected);
        assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
        assert!(!body.contains("alice"), "body must not echo input: {body}");
    }
}
