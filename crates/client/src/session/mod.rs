//! Authentication session.
//!
//! [`SessionManager`] is the single owner of the stored token pair and the
//! cached user profile. Every server call goes through [`SessionManager::send`],
//! which composes three steps:
//!
//! 1. [`decorate_request`](SessionManager::decorate_request) attaches the stored
//!    access token to non-exempt requests.
//! 2. The transport sends the request once.
//! 3. [`handle_response`](SessionManager::handle_response) passes the response
//!    through, or on a first 401 refreshes the token pair and asks for a retry.
//!
//! A request is retried at most once.

mod credentials;
mod refresh;
mod sweeper;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use classbook_core::validation::{validate_login, validate_signup};
use classbook_core::{UserId, UserProfile};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub use credentials::CredentialPair;
pub use refresh::{RefreshRejectedPolicy, UnknownPolicy};
pub use sweeper::DEFAULT_SWEEP_INTERVAL;

use crate::config::ClientConfig;
use crate::endpoint::{
    Endpoint, LoginRequest, LoginResponse, LogoutRequest, SignupRequest, SignupResponse,
};
use crate::error::{ClientError, ExpiryReason};
use crate::store::{FileStore, KeyValueStore};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Result of inspecting a response.
#[derive(Debug)]
pub enum ResponseOutcome {
    /// Hand the response to the caller.
    Complete(ApiResponse),
    /// Send this request again.
    Retry(ApiRequest),
}

/// Snapshot of the stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Both tokens are stored.
    pub authenticated: bool,
    /// Exactly one token is stored.
    pub partial: bool,
    /// Cached profile, if any.
    pub user: Option<UserProfile>,
}

/// Owns the authentication session and sends requests on its behalf.
///
/// Cheap to clone; clones share the transport, store and refresh gate.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    /// Held for the duration of a token refresh. Holds why the last refresh
    /// failed, if it did.
    refresh_gate: Mutex<Option<ExpiryReason>>,
    /// Number of refresh attempts completed. Written under `refresh_gate`.
    refresh_generation: AtomicU64,
    on_refresh_rejected: RefreshRejectedPolicy,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("on_refresh_rejected", &self.inner.on_refresh_rejected)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a session manager with the default refresh-rejected policy.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_policy(transport, store, RefreshRejectedPolicy::default())
    }

    #[must_use]
    pub fn with_policy(
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        on_refresh_rejected: RefreshRejectedPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(SessionManagerInner {
                transport,
                store,
                refresh_gate: Mutex::new(None),
                refresh_generation: AtomicU64::new(0),
                on_refresh_rejected,
            }),
        }
    }

    /// Build an HTTP transport and file store from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.api_url.clone(), config.http_timeout)?;
        let store = FileStore::new(&config.state_file);
        debug!(
            base_url = %transport.base_url(),
            state_file = %store.path().display(),
            "Session backends ready"
        );
        Ok(Self::with_policy(
            Arc::new(transport),
            Arc::new(store),
            config.on_refresh_rejected,
        ))
    }

    #[must_use]
    pub fn refresh_rejected_policy(&self) -> RefreshRejectedPolicy {
        self.inner.on_refresh_rejected
    }

    // =========================================================================
    // Account operations
    // =========================================================================

    /// Log in and persist the returned token pair and profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for malformed input (no request is
    /// made) and `ClientError::AuthenticationFailed` if the server rejects the
    /// credentials, in which case stored state is untouched.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<UserProfile, ClientError> {
        let email = validate_login(email, password.expose_secret())?;
        let response = self
            .send(Endpoint::Login(LoginRequest {
                email,
                password: password.clone(),
            }))
            .await?;

        if !response.is_success() {
            warn!(status = %response.status, "Login rejected");
            return Err(ClientError::AuthenticationFailed(response.error_message()));
        }

        let login: LoginResponse = response.json()?;
        credentials::save_session(
            self.inner.store.as_ref(),
            &SecretString::from(login.access_token),
            &SecretString::from(login.refresh_token),
            &login.user,
        )
        .await?;

        info!(user_id = %login.user.id, "Logged in");
        Ok(login.user)
    }

    /// Register an account. The user still has to log in afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for malformed input and
    /// `ClientError::AuthenticationFailed` if the server refuses the account.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<UserProfile, ClientError> {
        let email = validate_signup(name, email, password.expose_secret())?;
        let response = self
            .send(Endpoint::Signup(SignupRequest {
                name: name.trim().to_string(),
                email,
                password: password.clone(),
            }))
            .await?;

        if !response.is_success() {
            warn!(status = %response.status, "Sign-up rejected");
            return Err(ClientError::AuthenticationFailed(response.error_message()));
        }

        let signup: SignupResponse = response.json()?;
        info!(user_id = %signup.user.id, "Account created");
        Ok(signup.user)
    }

    /// Log out the cached user.
    ///
    /// The server is notified best-effort; the session is cleared locally
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ClientError> {
        match credentials::load_user(self.inner.store.as_ref()).await {
            Ok(Some(user)) => self.notify_logout(user.id).await,
            Ok(None) => warn!("No cached user profile, skipping server logout"),
            Err(e) => warn!(error = %e, "Could not read cached user profile"),
        }
        self.clear_local_session().await
    }

    /// Log out `user_id`, clearing the local session regardless of the
    /// server's answer.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be cleared.
    #[instrument(skip(self))]
    pub async fn logout_user(&self, user_id: UserId) -> Result<(), ClientError> {
        self.notify_logout(user_id).await;
        self.clear_local_session().await
    }

    async fn notify_logout(&self, user_id: UserId) {
        match self
            .send(Endpoint::Logout(LogoutRequest { user_id }))
            .await
        {
            Ok(response) if response.is_success() => debug!("Server acknowledged logout"),
            Ok(response) => warn!(status = %response.status, "Server rejected logout"),
            Err(e) => warn!(error = %e, "Logout notification failed"),
        }
    }

    async fn clear_local_session(&self) -> Result<(), ClientError> {
        credentials::clear_session(self.inner.store.as_ref()).await?;
        info!("Logged out");
        Ok(())
    }

    // =========================================================================
    // Session state
    // =========================================================================

    /// Cached profile of the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn current_user(&self) -> Result<Option<UserProfile>, ClientError> {
        Ok(credentials::load_user(self.inner.store.as_ref()).await?)
    }

    /// Whether both tokens are stored. A lone token does not count.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn is_authenticated(&self) -> Result<bool, ClientError> {
        Ok(credentials::load_credentials(self.inner.store.as_ref())
            .await?
            .is_complete())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn status(&self) -> Result<SessionStatus, ClientError> {
        let store = self.inner.store.as_ref();
        let pair = credentials::load_credentials(store).await?;
        Ok(SessionStatus {
            authenticated: pair.is_complete(),
            partial: pair.is_partial(),
            user: credentials::load_user(store).await?,
        })
    }

    // =========================================================================
    // Request pipeline
    // =========================================================================

    /// Attach the stored access token to a non-exempt request.
    ///
    /// A store read failure is logged and the request goes out undecorated;
    /// the server's 401 then drives the usual refresh path.
    pub async fn decorate_request(&self, mut request: ApiRequest) -> ApiRequest {
        if request.endpoint.is_auth_exempt() {
            return request;
        }

        match credentials::load_access_token(self.inner.store.as_ref()).await {
            Ok(Some(token)) => request.bearer = Some(token),
            Ok(None) => debug!("No access token stored"),
            Err(e) => warn!(error = %e, "Could not read access token"),
        }
        request
    }

    /// Decide what to do with `response` to `request`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SessionExpired` if a 401 could not be recovered
    /// by refreshing.
    pub async fn handle_response(
        &self,
        request: ApiRequest,
        response: ApiResponse,
    ) -> Result<ResponseOutcome, ClientError> {
        if response.status != StatusCode::UNAUTHORIZED
            || request.retried
            || request.endpoint.is_auth_exempt()
        {
            return Ok(ResponseOutcome::Complete(response));
        }

        debug!(path = request.endpoint.path(), "Access token rejected");
        let access_token = self
            .refresh_after_unauthorized(request.bearer.as_ref())
            .await?;
        Ok(ResponseOutcome::Retry(request.into_retry(access_token)))
    }

    /// Send `endpoint`, refreshing the session and retrying once if the
    /// access token has expired.
    ///
    /// Any status the protocol does not handle is returned as-is; callers
    /// decide what a non-2xx means for them.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Network` if the server cannot be reached and
    /// `ClientError::SessionExpired` if the session could not be refreshed.
    #[instrument(skip_all, fields(path = endpoint.path()))]
    pub async fn send(&self, endpoint: Endpoint) -> Result<ApiResponse, ClientError> {
        let mut request = self.decorate_request(ApiRequest::new(endpoint)).await;
        loop {
            let response = self.inner.transport.send(&request).await?;
            match self.handle_response(request, response).await? {
                ResponseOutcome::Complete(response) => return Ok(response),
                ResponseOutcome::Retry(retry) => request = retry,
            }
        }
    }
}
