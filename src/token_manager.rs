//! OAuth2 credential lifecycle against the amoCRM token endpoint.
//!
//! The manager starts `Unauthenticated`, becomes authenticated through a one-time
//! authorization code exchange, and from then on keeps itself authenticated by
//! exchanging the latest refresh token `expires_in - 10` seconds after every successful
//! exchange. A failed refresh is terminal: the credential cell is revoked and the
//! operator has to restart the process with a fresh code.

use crate::client::Client;
use crate::client_error::CrmRequestError;
use crate::credentials::CredentialCell;
use crate::token_record::{Grant, TokenRecord, TokenRequest};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Token endpoint, relative to the CRM base URL.
pub const TOKEN_PATH: &str = "oauth2/access_token";

/// The one-time authorization code could not be exchanged. Fatal at startup.
#[derive(Debug, Error)]
#[error("authorization code exchange failed: {0}")]
pub struct AuthExchangeError(#[source] pub CrmRequestError);

/// The scheduled refresh failed. Authentication is lost process-wide.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("no credential to refresh")]
    NotAuthenticated,

    #[error("refresh token exchange failed: {0}")]
    Exchange(#[source] CrmRequestError),

    #[error("refresh task ended abnormally: {0}")]
    Task(String),
}

/// OAuth2 client registration used for every exchange.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

pub struct TokenManager {
    client: Client,
    settings: OAuthSettings,
    // Held for the whole exchange, so at most one exchange is in flight and a refresh
    // always reads the refresh token stored by the previous one.
    current: Mutex<Option<TokenRecord>>,
}

impl TokenManager {
    /// `client` must share its [`CredentialCell`] with every client the credential is
    /// meant for; this manager is the only writer of that cell.
    pub fn new(client: Client, settings: OAuthSettings) -> TokenManager {
        TokenManager {
            client,
            settings,
            current: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &CredentialCell {
        self.client.credentials()
    }

    /// Exchange the one-time authorization code for the first credential.
    ///
    /// On success the credential is already applied to the cell, and the returned delay
    /// is when the first refresh is due.
    pub async fn exchange_code(&self, code: &str) -> Result<Duration, AuthExchangeError> {
        let mut current = self.current.lock().await;
        let grant = Grant::AuthorizationCode(code.to_string());
        let record = self.exchange(&grant).await.map_err(AuthExchangeError)?;

        Ok(self.apply(&mut current, record))
    }

    /// Exchange the most recent refresh token for a new credential.
    pub async fn refresh(&self) -> Result<Duration, RefreshError> {
        let mut current = self.current.lock().await;
        let refresh_token = match current.as_ref() {
            Some(record) => record.refresh_token.clone(),
            None => return Err(RefreshError::NotAuthenticated),
        };

        let grant = Grant::RefreshToken(refresh_token);
        let record = self
            .exchange(&grant)
            .await
            .map_err(RefreshError::Exchange)?;

        Ok(self.apply(&mut current, record))
    }

    /// Start the recurring refresh task. The first refresh fires after `first_delay`,
    /// each following one after the delay derived from the newest credential.
    pub fn spawn_refresh(self: &Arc<Self>, first_delay: Duration) -> RefreshHandle {
        let (stop, stopped) = oneshot::channel();
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.run_refresh(first_delay, stopped).await });

        RefreshHandle { stop, task }
    }

    async fn run_refresh(
        &self,
        mut delay: Duration,
        mut stopped: oneshot::Receiver<()>,
    ) -> Result<(), RefreshError> {
        loop {
            debug!(refresh_in_secs = delay.as_secs(), "credential refresh scheduled");

            tokio::select! {
                _ = &mut stopped => {
                    info!("credential refresh stopped");
                    self.credentials().revoke("credential refresh stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.refresh().await {
                Ok(next) => delay = next,
                Err(refresh_error) => {
                    error!(
                        error = %refresh_error,
                        "credential refresh failed; CRM calls will fail until restarted with a new authorization code"
                    );
                    self.credentials().revoke(refresh_error.to_string());
                    return Err(refresh_error);
                }
            }
        }
    }

    async fn exchange(&self, grant: &Grant) -> Result<TokenRecord, CrmRequestError> {
        let body = TokenRequest::new(
            &self.settings.client_id,
            &self.settings.client_secret,
            &self.settings.redirect_uri,
            grant,
        );

        self.client.post_anonymous(TOKEN_PATH, &body).await
    }

    fn apply(&self, current: &mut Option<TokenRecord>, record: TokenRecord) -> Duration {
        self.credentials().install(&record);
        let delay = record.refresh_delay();

        info!(
            access_token = %record.abbreviated_access_token(),
            expires_in = record.expires_in,
            refresh_in_secs = delay.as_secs(),
            "credential installed"
        );

        *current = Some(record);
        delay
    }
}

/// Handle to the running refresh task. Dropping it stops the task as well.
pub struct RefreshHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), RefreshError>>,
}

impl RefreshHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it. Returns the refresh error if the task had
    /// already ended because of one.
    pub async fn shutdown(self) -> Result<(), RefreshError> {
        // The receiver is gone when the task already returned.
        let _ = self.stop.send(());

        match self.task.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(RefreshError::Task(join_error.to_string())),
        }
    }
}
