//! # amocrm-gateway
//!
//! HTTP gateway in front of the amoCRM v4 REST API. It keeps one OAuth2 credential alive
//! for the lifetime of the process and reconciles inbound identities into CRM contacts,
//! attaching a new lead to each one.
//!
//! You can read more about amoCRM OAuth2 here:
//! [https://www.amocrm.com/developers/content/oauth/step-by-step](https://www.amocrm.com/developers/content/oauth/step-by-step)
//!
//! ### Example
//!
//! ```no_run
//! use amocrm_gateway::{Client, ContactIdentity, CredentialCell, OAuthSettings, Reconciler, TokenManager};
//! use std::sync::Arc;
//! use url::Url;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Url::parse("https://example.amocrm.ru")?, CredentialCell::new());
//! let manager = Arc::new(TokenManager::new(
//!     client.clone(),
//!     OAuthSettings {
//!         client_id: String::from("YOUR_CLIENT_ID"),
//!         client_secret: String::from("YOUR_CLIENT_SECRET"),
//!         redirect_uri: String::from("https://example.com/oauth"),
//!     },
//! ));
//!
//! let first_refresh = manager.exchange_code("ONE_TIME_CODE").await?;
//! let refresh = manager.spawn_refresh(first_refresh);
//!
//! let outcome = Reconciler::new(client)
//!     .reconcile(&ContactIdentity::new("Jane", "jane@example.com", "+15550100"))
//!     .await?;
//! println!("lead {} for contact {}", outcome.lead.id, outcome.contact.id);
//!
//! refresh.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_error;
pub mod config;
mod credentials;
pub mod gateway;
pub mod models;
mod reconcile;
pub mod response;
mod token_manager;
mod token_record;

pub use client::Client;
pub use client_error::CrmRequestError;
pub use config::GatewayConfig;
pub use credentials::{CredentialCell, CredentialState, LiveCredential};
pub use models::{Contact, ContactIdentity, CustomFieldDescriptor, Lead, Reconciliation};
pub use reconcile::{Reconciler, Records};
pub use token_manager::{AuthExchangeError, OAuthSettings, RefreshError, RefreshHandle, TokenManager};
pub use token_record::{Grant, TokenRecord, TokenRequest};
