//! Periodic cleanup of half-present token pairs.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{instrument, warn};

use super::SessionManager;
use super::credentials::{clear_tokens, load_credentials};
use crate::error::ClientError;

/// Default period of [`SessionManager::spawn_credential_sweeper`].
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

impl SessionManager {
    /// Remove the stored tokens if only one of them is present.
    ///
    /// The cached profile is left in place. Returns whether anything was
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    #[instrument(skip(self))]
    pub async fn sweep_partial_credentials(&self) -> Result<bool, ClientError> {
        let _gate = self.inner.refresh_gate.lock().await;
        let store = self.inner.store.as_ref();
        let pair = load_credentials(store).await?;
        if !pair.is_partial() {
            return Ok(false);
        }

        warn!(
            has_access_token = pair.access_token.is_some(),
            has_refresh_token = pair.refresh_token.is_some(),
            "Clearing incomplete token pair"
        );
        clear_tokens(store).await?;
        Ok(true)
    }

    /// Run [`sweep_partial_credentials`](Self::sweep_partial_credentials)
    /// every `period` until the returned handle is aborted.
    ///
    /// The first sweep happens one full period after spawning.
    ///
    /// # Panics
    ///
    /// The spawned task panics if `period` is zero.
    #[must_use]
    pub fn spawn_credential_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = session.sweep_partial_credentials().await {
                    warn!(error = %e, "Credential sweep failed");
                }
            }
        })
    }
}
