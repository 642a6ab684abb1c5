//! Reading and writing the persisted session.
//!
//! The token pair is written in a single batched store call and cleared the
//! same way. An empty stored string counts as absent.

use classbook_core::UserProfile;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::error::ClientError;
use crate::store::{
    ACCESS_TOKEN_KEY, KeyValueStore, REFRESH_TOKEN_KEY, SESSION_KEYS, StoreError, USER_KEY,
};

/// The stored access/refresh token pair.
#[derive(Debug, Clone, Default)]
pub struct CredentialPair {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
}

impl CredentialPair {
    /// Both tokens are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// Exactly one of the tokens is present.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.access_token.is_some() != self.refresh_token.is_some()
    }
}

async fn load_secret(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<SecretString>, StoreError> {
    Ok(store
        .get(key)
        .await?
        .filter(|value| !value.is_empty())
        .map(SecretString::from))
}

pub(crate) async fn load_access_token(
    store: &dyn KeyValueStore,
) -> Result<Option<SecretString>, StoreError> {
    load_secret(store, ACCESS_TOKEN_KEY).await
}

pub(crate) async fn load_credentials(
    store: &dyn KeyValueStore,
) -> Result<CredentialPair, StoreError> {
    Ok(CredentialPair {
        access_token: load_secret(store, ACCESS_TOKEN_KEY).await?,
        refresh_token: load_secret(store, REFRESH_TOKEN_KEY).await?,
    })
}

pub(crate) async fn save_tokens(
    store: &dyn KeyValueStore,
    access_token: &SecretString,
    refresh_token: &SecretString,
) -> Result<(), StoreError> {
    store
        .set_many(&[
            (ACCESS_TOKEN_KEY, access_token.expose_secret()),
            (REFRESH_TOKEN_KEY, refresh_token.expose_secret()),
        ])
        .await
}

pub(crate) async fn save_session(
    store: &dyn KeyValueStore,
    access_token: &SecretString,
    refresh_token: &SecretString,
    user: &UserProfile,
) -> Result<(), ClientError> {
    let user_json = serde_json::to_string(user)?;
    store
        .set_many(&[
            (ACCESS_TOKEN_KEY, access_token.expose_secret()),
            (REFRESH_TOKEN_KEY, refresh_token.expose_secret()),
            (USER_KEY, user_json.as_str()),
        ])
        .await?;
    Ok(())
}

/// Remove the tokens and the cached profile.
pub(crate) async fn clear_session(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.remove_many(&SESSION_KEYS).await
}

/// Remove only the token pair, leaving the cached profile.
pub(crate) async fn clear_tokens(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store
        .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
        .await
}

/// The cached profile. A profile that no longer parses is treated as absent.
pub(crate) async fn load_user(
    store: &dyn KeyValueStore,
) -> Result<Option<UserProfile>, StoreError> {
    let Some(raw) = store.get(USER_KEY).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(user) => Ok(Some(user)),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable cached user profile");
            Ok(None)
        }
    }
}
