//! Shared slot holding the live bearer credential.
//!
//! The cell has a single writer (the [`TokenManager`](crate::TokenManager)) and any number
//! of readers (clones of the [`Client`](crate::Client)). The authorization header is
//! rendered once per credential and swapped as a whole, so readers never see a token
//! paired with the wrong type.

use crate::client_error::CrmRequestError;
use crate::token_record::TokenRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Longest a request waits for a scheduled refresh to replace an expired credential.
const EXPIRED_WAIT: Duration = Duration::from_secs(30);

/// Credential as seen by request call sites.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveCredential {
    authorization: String,
    expires_at: Instant,
}

impl LiveCredential {
    fn from_record(record: &TokenRecord) -> LiveCredential {
        LiveCredential {
            authorization: record.authorization(),
            expires_at: Instant::now() + record.lifetime(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialState {
    /// No exchange has succeeded yet.
    Unauthenticated,
    Authenticated(Arc<LiveCredential>),
    /// A refresh failed or the refresh task stopped. Terminal until restart.
    Revoked(String),
}

#[derive(Clone)]
pub struct CredentialCell {
    state: Arc<watch::Sender<CredentialState>>,
}

impl Default for CredentialCell {
    fn default() -> Self {
        CredentialCell::new()
    }
}

impl CredentialCell {
    pub fn new() -> CredentialCell {
        let (state, _) = watch::channel(CredentialState::Unauthenticated);

        CredentialCell {
            state: Arc::new(state),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CredentialState {
        self.state.borrow().clone()
    }

    /// Header value to send with the next CRM request.
    ///
    /// An expired credential is never handed out: the call waits for the scheduled
    /// refresh (or a revocation) to replace it instead.
    pub async fn authorization(&self) -> Result<String, CrmRequestError> {
        let mut updates = self.state.subscribe();

        loop {
            {
                let state = updates.borrow_and_update();
                match &*state {
                    CredentialState::Unauthenticated => {
                        return Err(CrmRequestError::NotAuthenticated)
                    }
                    CredentialState::Revoked(reason) => {
                        return Err(CrmRequestError::AuthenticationLost(reason.clone()))
                    }
                    CredentialState::Authenticated(live) if !live.is_expired() => {
                        return Ok(live.authorization.clone())
                    }
                    CredentialState::Authenticated(_) => {
                        debug!("credential expired, waiting for the scheduled refresh");
                    }
                }
            }

            match tokio::time::timeout(EXPIRED_WAIT, updates.changed()).await {
                Ok(Ok(())) => continue,
                _ => {
                    return Err(CrmRequestError::AuthenticationLost(String::from(
                        "credential expired and was not refreshed",
                    )))
                }
            }
        }
    }

    /// Replace the live credential with one built from `record`.
    pub(crate) fn install(&self, record: &TokenRecord) {
        let live = LiveCredential::from_record(record);
        self.state
            .send_replace(CredentialState::Authenticated(Arc::new(live)));
    }

    pub(crate) fn revoke(&self, reason: impl Into<String>) {
        self.state.send_replace(CredentialState::Revoked(reason.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(access_token: &str, expires_in: u64) -> TokenRecord {
        TokenRecord {
            access_token: access_token.to_string(),
            refresh_token: String::from("refresh"),
            token_type: String::from("Bearer"),
            expires_in,
        }
    }

    #[tokio::test]
    async fn starts_unauthenticated() {
        let cell = CredentialCell::new();

        assert_eq!(cell.state(), CredentialState::Unauthenticated);
        assert!(matches!(
            cell.authorization().await,
            Err(CrmRequestError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn install_replaces_header_as_a_whole() {
        let cell = CredentialCell::new();
        cell.install(&record("first", 3600));
        cell.install(&record("second", 3600));

        assert_eq!(cell.authorization().await.unwrap(), "Bearer second");
    }

    #[tokio::test]
    async fn revoked_cell_reports_reason() {
        let cell = CredentialCell::new();
        cell.install(&record("first", 3600));
        cell.revoke("refresh token revoked");

        match cell.authorization().await {
            Err(CrmRequestError::AuthenticationLost(reason)) => {
                assert_eq!(reason, "refresh token revoked")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_credential_waits_for_refresh() {
        let cell = CredentialCell::new();
        cell.install(&record("stale", 5));
        tokio::time::advance(Duration::from_secs(6)).await;

        let reader = cell.clone();
        let pending = tokio::spawn(async move { reader.authorization().await });
        tokio::task::yield_now().await;
        cell.install(&record("fresh", 3600));

        assert_eq!(pending.await.unwrap().unwrap(), "Bearer fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_credential_without_refresh_gives_up() {
        let cell = CredentialCell::new();
        cell.install(&record("stale", 5));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(matches!(
            cell.authorization().await,
            Err(CrmRequestError::AuthenticationLost(_))
        ));
    }
}
