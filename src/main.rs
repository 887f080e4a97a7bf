//! Gateway entry-point: exchanges the startup authorization code, keeps the credential
//! refreshed and serves the HTTP API until shutdown.

use actix_web::{middleware::Logger, web, App, HttpServer};
use amocrm_gateway::gateway::{self, GatewayState};
use amocrm_gateway::{Client, CredentialCell, GatewayConfig, Reconciler, Records, TokenManager};
use clap::Parser;
use std::io;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let config = GatewayConfig::parse();
    info!(?config, "starting gateway");

    let client = Client::new(config.amo_url.clone(), CredentialCell::new());
    let manager = Arc::new(TokenManager::new(client.clone(), config.oauth()));

    // Without a credential every CRM call would fail, so a bad code aborts startup.
    let first_refresh = manager
        .exchange_code(&config.authorization_code)
        .await
        .map_err(|error| {
            error!(error = %error, "initial authorization failed");
            io::Error::other(error)
        })?;
    let refresh = manager.spawn_refresh(first_refresh);

    let state = web::Data::new(GatewayState {
        reconciler: Reconciler::new(client.clone()),
        records: Records::new(client),
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(gateway::configure)
    })
    .bind(config.bind_addr())?;

    info!(host = %config.host, port = config.port, "app started");
    let served = server.run().await;

    if refresh.is_finished() {
        warn!("credential refresh had already stopped before shutdown");
    }
    if let Err(error) = refresh.shutdown().await {
        error!(error = %error, "credential refresh ended with an error");
    }

    served
}
