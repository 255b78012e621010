//! HTTP client for the key directory service.
//!
//! Speaks the directory service protocol:
//!
//! ```text
//! GET {base_url}/getkey?identity=<identity>
//!   200  body = PEM public key
//!   404  identity unknown
//!   other / transport error / timeout → Unavailable
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{
    directory::KeyDirectory,
    error::{DirectoryError, DirectoryResult},
    identity::Identity,
    record::KeyRecord,
};

/// Path of the lookup endpoint relative to the service base URL.
pub const GETKEY_PATH: &str = "/getkey";

/// Default request timeout for a single lookup.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a key document; anything larger is not a public key.
const MAX_KEY_BYTES: usize = 16 * 1024;

/// [`KeyDirectory`] backed by a remote directory service.
#[derive(Debug, Clone)]
pub struct HttpKeyDirectory {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpKeyDirectory {
    /// Creates a client for the service at `base_url` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> DirectoryResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] if the HTTP client cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> DirectoryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::unavailable_with_source("failed to build HTTP client", e))?;

        Ok(Self { client, endpoint: format!("{}{GETKEY_PATH}", base_url.trim_end_matches('/')) })
    }

    /// The full lookup URL, without query string.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    #[tracing::instrument(skip(self), fields(identity = %identity, endpoint = %self.endpoint))]
    async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("identity", identity.as_str())])
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() { "lookup timed out" } else { "request failed" };
                DirectoryError::unavailable_with_source(message, e)
            })?;

        match response.status() {
            StatusCode::OK => {},
            StatusCode::NOT_FOUND => return Err(DirectoryError::not_found(identity.as_str())),
            status => {
                tracing::warn!(%status, "unexpected key directory response");
                return Err(DirectoryError::unavailable(format!(
                    "key directory answered {status}"
                )));
            },
        }

        let body = read_bounded(response, identity).await?;

        let pem = std::str::from_utf8(&body)
            .map_err(|_| DirectoryError::malformed(identity.as_str(), "key is not UTF-8"))?;

        KeyRecord::from_pem(identity.clone(), pem)
    }
}

/// Reads the response body, giving up as soon as it exceeds [`MAX_KEY_BYTES`].
async fn read_bounded(mut response: reqwest::Response, identity: &Identity) -> DirectoryResult<Vec<u8>> {
    let too_large = || DirectoryError::malformed(identity.as_str(), "key document too large");

    if response.content_length().is_some_and(|len| len > MAX_KEY_BYTES as u64) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| DirectoryError::unavailable_with_source("failed to read response", e))?
    {
        if body.len() + chunk.len() > MAX_KEY_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let a = HttpKeyDirectory::new("http://localhost:5010").unwrap();
        let b = HttpKeyDirectory::new("http://localhost:5010/").unwrap();

        assert_eq!(a.endpoint(), "http://localhost:5010/getkey");
        assert_eq!(b.endpoint(), "http://localhost:5010/getkey");
    }
}
