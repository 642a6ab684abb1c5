//! Refresh-and-retry.
//!
//! A 401 on an authenticated request sends the stored refresh token to
//! `/auth/token`. Refreshes are serialized behind `refresh_gate`. A request
//! that waited on the gate while another refresh ran shares its outcome: it
//! reuses the new access token, or fails with the same reason without calling
//! the server again.

use std::str::FromStr;
use std::sync::atomic::Ordering;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::SessionManager;
use super::credentials::{clear_session, load_credentials, save_tokens};
use crate::endpoint::{Endpoint, RefreshRequest, TokenPairResponse};
use crate::error::{ClientError, ExpiryReason};
use crate::transport::{ApiRequest, ApiResponse};

/// What to do with stored credentials when the server rejects the refresh
/// token with a 4xx.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshRejectedPolicy {
    /// Remove both tokens and the cached profile.
    #[default]
    ClearSession,
    /// Leave the store untouched.
    KeepSession,
}

impl RefreshRejectedPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClearSession => "logout",
            Self::KeepSession => "keep",
        }
    }
}

impl std::fmt::Display for RefreshRejectedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown refresh-rejected policy `{0}` (expected `logout` or `keep`)")]
pub struct UnknownPolicy(String);

impl FromStr for RefreshRejectedPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logout" | "clear" => Ok(Self::ClearSession),
            "keep" => Ok(Self::KeepSession),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl SessionManager {
    /// Obtain a usable access token after the server answered 401 to a
    /// request sent with `sent_with`.
    #[instrument(skip_all)]
    pub(super) async fn refresh_after_unauthorized(
        &self,
        sent_with: Option<&SecretString>,
    ) -> Result<SecretString, ClientError> {
        let seen_generation = self.inner.refresh_generation.load(Ordering::Acquire);
        let mut last_failure = self.inner.refresh_gate.lock().await;
        let credentials = load_credentials(self.inner.store.as_ref()).await?;

        if let Some(current) = &credentials.access_token {
            let superseded =
                sent_with.is_none_or(|sent| sent.expose_secret() != current.expose_secret());
            if superseded {
                debug!("Access token already replaced, retrying without refresh");
                return Ok(current.clone());
            }
        }

        let refreshed_while_waiting =
            self.inner.refresh_generation.load(Ordering::Acquire) != seen_generation;
        if let Some(reason) = last_failure.as_ref().filter(|_| refreshed_while_waiting) {
            debug!(%reason, "Refresh failed while waiting, not retrying it");
            return Err(ClientError::SessionExpired(reason.clone()));
        }

        let outcome = self.exchange_refresh_token(credentials.refresh_token).await;
        *last_failure = match &outcome {
            Err(ClientError::SessionExpired(reason)) => Some(reason.clone()),
            _ => None,
        };
        self.inner.refresh_generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Trade the refresh token for a new pair. Caller holds `refresh_gate`.
    async fn exchange_refresh_token(
        &self,
        refresh_token: Option<SecretString>,
    ) -> Result<SecretString, ClientError> {
        let store = self.inner.store.as_ref();
        let Some(refresh_token) = refresh_token else {
            warn!("No refresh token stored, clearing session");
            clear_session(store).await?;
            return Err(ClientError::SessionExpired(ExpiryReason::NoRefreshToken));
        };

        let request = ApiRequest::new(Endpoint::RefreshToken(RefreshRequest {
            refresh_token: refresh_token.clone(),
        }));
        let response = match self.inner.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh did not reach the server");
                return Err(ClientError::SessionExpired(ExpiryReason::RefreshFailed(
                    e.to_string(),
                )));
            }
        };

        if response.is_success() {
            return self.store_refreshed_pair(&response, refresh_token).await;
        }

        let status = response.status;
        if status.is_client_error() {
            warn!(%status, policy = %self.inner.on_refresh_rejected, "Refresh token rejected");
            if self.inner.on_refresh_rejected == RefreshRejectedPolicy::ClearSession {
                clear_session(store).await?;
            }
            return Err(ClientError::SessionExpired(ExpiryReason::RefreshRejected(
                status,
            )));
        }

        warn!(%status, "Token refresh failed");
        Err(ClientError::SessionExpired(ExpiryReason::RefreshFailed(
            format!("HTTP {status}: {}", response.error_message()),
        )))
    }

    async fn store_refreshed_pair(
        &self,
        response: &ApiResponse,
        previous_refresh_token: SecretString,
    ) -> Result<SecretString, ClientError> {
        let pair: TokenPairResponse = response.json().map_err(|e| {
            ClientError::SessionExpired(ExpiryReason::RefreshFailed(format!(
                "unreadable token response: {e}"
            )))
        })?;

        if pair.access_token.is_empty() {
            return Err(ClientError::SessionExpired(ExpiryReason::RefreshFailed(
                "token response carried no access token".to_string(),
            )));
        }

        let access_token = SecretString::from(pair.access_token);
        let refresh_token = pair
            .refresh_token
            .filter(|token| !token.is_empty())
            .map_or(previous_refresh_token, SecretString::from);

        save_tokens(self.inner.store.as_ref(), &access_token, &refresh_token).await?;
        info!("Access token refreshed");
        Ok(access_token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::endpoint::{LIST_CLASSES_PATH, LOGIN_PATH, LoginRequest, REFRESH_PATH};
    use crate::store::{ACCESS_TOKEN_KEY, MemoryStore, REFRESH_TOKEN_KEY, USER_KEY};
    use crate::testing::{MockTransport, Reply, session_with, stored};

    const USER_JSON: &str = r#"{"id":1,"name":"Ada"}"#;

    fn full_session() -> [(&'static str, &'static str); 3] {
        [
            (ACCESS_TOKEN_KEY, "t_old"),
            (REFRESH_TOKEN_KEY, "r1"),
            (USER_KEY, USER_JSON),
        ]
    }

    fn list() -> Endpoint {
        Endpoint::ListClasses { date: None }
    }

    #[tokio::test]
    async fn test_refresh_then_retry_with_new_token() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::json(
                StatusCode::OK,
                json!({"accessToken": "t_new", "refreshToken": "r2"}),
            ),
            Reply::json(StatusCode::OK, json!([])),
        ]);
        let (session, store) = session_with(&transport, &full_session());

        let response = session.send(list()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "[]");

        let sent = transport.sent();
        assert_eq!(
            transport.sent_paths(),
            vec![LIST_CLASSES_PATH, REFRESH_PATH, LIST_CLASSES_PATH]
        );
        assert_eq!(sent[0].authorization().as_deref(), Some("Bearer t_old"));
        assert_eq!(sent[1].authorization(), None);
        assert_eq!(
            sent[1].endpoint.body().unwrap().unwrap(),
            json!({"refreshToken": "r1"})
        );
        assert_eq!(sent[2].authorization().as_deref(), Some("Bearer t_new"));
        assert!(sent[2].retried);

        assert_eq!(stored(&store, ACCESS_TOKEN_KEY).await.as_deref(), Some("t_new"));
        assert_eq!(stored(&store, REFRESH_TOKEN_KEY).await.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::json(StatusCode::OK, json!({"accessToken": "t_new"})),
            Reply::json(StatusCode::OK, json!([])),
        ]);
        let (session, store) = session_with(&transport, &full_session());

        session.send(list()).await.unwrap();
        assert_eq!(stored(&store, ACCESS_TOKEN_KEY).await.as_deref(), Some("t_new"));
        assert_eq!(stored(&store, REFRESH_TOKEN_KEY).await.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_returned_unmodified() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::json(
                StatusCode::OK,
                json!({"accessToken": "t_new", "refreshToken": "r2"}),
            ),
            Reply::json(StatusCode::UNAUTHORIZED, json!({"message": "still no"})),
        ]);
        let (session, _store) = session_with(&transport, &full_session());

        let response = session.send(list()).await.unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.error_message(), "still no");
        assert_eq!(transport.count(REFRESH_PATH), 1);
        assert_eq!(transport.count(LIST_CLASSES_PATH), 2);
    }

    #[tokio::test]
    async fn test_exempt_unauthorized_does_not_refresh() {
        let transport = MockTransport::scripted([Reply::json(
            StatusCode::UNAUTHORIZED,
            json!({"message": "Invalid credentials"}),
        )]);
        let (session, store) = session_with(&transport, &full_session());

        let login = Endpoint::Login(LoginRequest {
            email: classbook_core::Email::parse("ada@example.com").unwrap(),
            password: SecretString::from("password1"),
        });
        let response = session.send(login).await.unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(transport.sent_paths(), vec![LOGIN_PATH]);
        assert_eq!(transport.sent()[0].authorization(), None);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_clears_session_without_refresh_call() {
        let transport = MockTransport::scripted([Reply::status(StatusCode::UNAUTHORIZED)]);
        let (session, store) =
            session_with(&transport, &[(ACCESS_TOKEN_KEY, "t_old"), (USER_KEY, USER_JSON)]);

        let err = session.send(list()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::SessionExpired(ExpiryReason::NoRefreshToken)
        ));
        assert_eq!(transport.count(REFRESH_PATH), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session_by_default() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::status(StatusCode::FORBIDDEN),
        ]);
        let (session, store) = session_with(&transport, &full_session());

        let err = session.send(list()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::SessionExpired(ExpiryReason::RefreshRejected(StatusCode::FORBIDDEN))
        ));
        assert!(err.requires_login());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_session_when_configured() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::status(StatusCode::UNAUTHORIZED),
        ]);
        let store = Arc::new(MemoryStore::with_entries(full_session()));
        let session = SessionManager::with_policy(
            transport.clone(),
            store.clone(),
            RefreshRejectedPolicy::KeepSession,
        );

        let err = session.send(list()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::SessionExpired(ExpiryReason::RefreshRejected(_))
        ));
        assert_eq!(stored(&store, ACCESS_TOKEN_KEY).await.as_deref(), Some("t_old"));
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_unreachable_refresh_keeps_tokens() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::ConnectionRefused,
        ]);
        let (session, store) = session_with(&transport, &full_session());

        let err = session.send(list()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::SessionExpired(ExpiryReason::RefreshFailed(_))
        ));
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_refresh_server_error_keeps_tokens() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::json(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "maintenance"})),
        ]);
        let (session, store) = session_with(&transport, &full_session());

        let err = session.send(list()).await.unwrap_err();
        match err {
            ClientError::SessionExpired(ExpiryReason::RefreshFailed(message)) => {
                assert!(message.contains("maintenance"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stored(&store, REFRESH_TOKEN_KEY).await.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_requests_share_one_refresh() {
        let transport = MockTransport::new(|request| match request.endpoint.path() {
            REFRESH_PATH => Reply::json(
                StatusCode::OK,
                json!({"accessToken": "t_new", "refreshToken": "r2"}),
            ),
            _ if request.authorization().as_deref() == Some("Bearer t_new") => {
                Reply::json(StatusCode::OK, json!([]))
            }
            _ => Reply::status(StatusCode::UNAUTHORIZED),
        });
        let (session, store) = session_with(&transport, &full_session());

        let (first, second) = tokio::join!(session.send(list()), session.send(list()));

        assert_eq!(first.unwrap().status, StatusCode::OK);
        assert_eq!(second.unwrap().status, StatusCode::OK);
        assert_eq!(transport.count(REFRESH_PATH), 1);
        assert_eq!(transport.count(LIST_CLASSES_PATH), 4);
        assert_eq!(stored(&store, ACCESS_TOKEN_KEY).await.as_deref(), Some("t_new"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_a_failed_refresh() {
        let transport = MockTransport::new(|request| match request.endpoint.path() {
            REFRESH_PATH => Reply::json(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"message": "maintenance"}),
            ),
            _ => Reply::status(StatusCode::UNAUTHORIZED),
        });
        let (session, store) = session_with(&transport, &full_session());

        let (first, second, third) = tokio::join!(
            session.send(list()),
            session.send(list()),
            session.send(list())
        );

        for result in [first, second, third] {
            assert!(matches!(
                result.unwrap_err(),
                ClientError::SessionExpired(ExpiryReason::RefreshFailed(_))
            ));
        }
        assert_eq!(transport.count(REFRESH_PATH), 1);
        assert_eq!(transport.count(LIST_CLASSES_PATH), 3);
        assert_eq!(stored(&store, REFRESH_TOKEN_KEY).await.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_a_rejected_refresh() {
        let transport = MockTransport::new(|_| Reply::status(StatusCode::UNAUTHORIZED));
        let store = Arc::new(MemoryStore::with_entries(full_session()));
        let session = SessionManager::with_policy(
            transport.clone(),
            store.clone(),
            RefreshRejectedPolicy::KeepSession,
        );

        let (first, second) = tokio::join!(session.send(list()), session.send(list()));

        for result in [first, second] {
            assert!(matches!(
                result.unwrap_err(),
                ClientError::SessionExpired(ExpiryReason::RefreshRejected(StatusCode::UNAUTHORIZED))
            ));
        }
        assert_eq!(transport.count(REFRESH_PATH), 1);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_later_request_retries_after_failed_refresh() {
        let transport = MockTransport::scripted([
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::status(StatusCode::BAD_GATEWAY),
            Reply::status(StatusCode::UNAUTHORIZED),
            Reply::json(
                StatusCode::OK,
                json!({"accessToken": "t_new", "refreshToken": "r2"}),
            ),
            Reply::json(StatusCode::OK, json!([])),
        ]);
        let (session, store) = session_with(&transport, &full_session());

        let err = session.send(list()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::SessionExpired(ExpiryReason::RefreshFailed(_))
        ));

        let response = session.send(list()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(transport.count(REFRESH_PATH), 2);
        assert_eq!(stored(&store, ACCESS_TOKEN_KEY).await.as_deref(), Some("t_new"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "logout".parse::<RefreshRejectedPolicy>().unwrap(),
            RefreshRejectedPolicy::ClearSession
        );
        assert_eq!(
            " KEEP ".parse::<RefreshRejectedPolicy>().unwrap(),
            RefreshRejectedPolicy::KeepSession
        );
        assert!("sometimes".parse::<RefreshRejectedPolicy>().is_err());
        assert_eq!(RefreshRejectedPolicy::default().to_string(), "logout");
    }
}
