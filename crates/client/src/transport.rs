//! HTTP transport.
//!
//! [`Transport`] is the seam between the session logic and the network: it
//! sends exactly the request it is given and reports the raw status and body.
//! It knows nothing about tokens beyond attaching `ApiRequest::bearer`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::endpoint::Endpoint;

/// Errors that prevent a request from producing a response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other HTTP-level failure.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// The endpoint URL could not be built from the base URL.
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    /// The request body could not be encoded.
    #[error("request body could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Http(e)
        }
    }
}

/// A request on its way to the server.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    /// Access token sent as `Authorization: Bearer <token>`.
    pub bearer: Option<SecretString>,
    /// Set once the request has been resubmitted after a token refresh.
    pub retried: bool,
}

impl ApiRequest {
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            bearer: None,
            retried: false,
        }
    }

    /// The `Authorization` header value this request will carry, if any.
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        self.bearer
            .as_ref()
            .map(|token| format!("Bearer {}", token.expose_secret()))
    }

    /// The follow-up request sent after a successful refresh.
    #[must_use]
    pub fn into_retry(self, access_token: SecretString) -> Self {
        Self {
            endpoint: self.endpoint,
            bearer: Some(access_token),
            retried: true,
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Human-readable error text: the body's `message` or `error` field, the
    /// raw body, or the status reason, in that order of preference.
    #[must_use]
    pub fn error_message(&self) -> String {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            #[serde(default)]
            message: Option<String>,
            #[serde(default)]
            error: Option<String>,
        }

        if let Ok(ErrorBody { message, error }) = self.json::<ErrorBody>()
            && let Some(text) = message.or(error)
        {
            return text;
        }

        let body = self.body.trim();
        if body.is_empty() {
            self.status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        } else {
            body.to_string()
        }
    }
}

/// Sends requests to the class server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` once and return whatever the server answered.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<HttpTransportInner>,
}

struct HttpTransportInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a transport reusing an existing `reqwest` client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // Endpoint paths are joined relative to the base, so keep any path prefix.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            inner: Arc::new(HttpTransportInner { client, base_url }),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Absolute URL for `endpoint`, including its query string.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be joined onto the base URL.
    pub fn url_for(&self, endpoint: &Endpoint) -> Result<Url, url::ParseError> {
        let mut url = self
            .inner
            .base_url
            .join(endpoint.path().trim_start_matches('/'))?;

        let query = endpoint.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(
        skip_all,
        fields(method = %request.endpoint.method(), path = request.endpoint.path(), retried = request.retried)
    )]
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.endpoint)?;
        let mut builder = self.inner.client.request(request.endpoint.method(), url);

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = request.endpoint.body()? {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(%status, "Response received");
        Ok(ApiResponse { status, body })
    }
}
