//! Error types surfaced to callers of the client.

use classbook_core::ValidationError;
use reqwest::StatusCode;
use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

/// Errors returned by session and class operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Form input rejected before any request was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Login or sign-up rejected by the server.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The session could not be refreshed; the user must log in again.
    #[error("Session expired: {0}")]
    SessionExpired(ExpiryReason),

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// The server answered with a non-success status.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status returned by the server.
        status: StatusCode,
        /// Message extracted from the response body.
        message: String,
    },

    /// Reading or writing persisted session state failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// A success response did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The operation needs a signed-in user and there is none.
    #[error("Not logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// Whether the caller should send the user back to the login flow.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::NotLoggedIn)
    }
}

/// Why the refresh protocol gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpiryReason {
    /// No refresh token was stored.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The refresh endpoint explicitly rejected the refresh token.
    #[error("refresh token rejected (HTTP {0})")]
    RefreshRejected(StatusCode),

    /// The refresh call failed without a verdict on the token.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}
