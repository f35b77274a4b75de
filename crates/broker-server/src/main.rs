//! `auth-broker` binary.

use broker_auth::{
    CallbackCoordinator, ClientVerifier, CorsAllowlist, MemorySessionStore, ProviderKind,
};
use broker_clients::{OAuth2ProviderSdk, PortalClient};
use broker_server::{build_router, telemetry, AppState, BrokerConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The subscriber may not be installed yet.
        eprintln!("auth-broker: {}", e);
        error!(error = %e, "auth-broker stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = BrokerConfig::load()?;
    telemetry::init(config.log_json);

    if let Err(e) = config.services.validate_for_production() {
        warn!(error = %e, "service configuration is not production ready");
    }

    let services = &config.services;
    let portal = Arc::new(PortalClient::new(
        services.portal.clone(),
        services.exchange.clone(),
        services.timeout(),
    )?);
    let sdk = Arc::new(OAuth2ProviderSdk::new(services.timeout())?);

    let adapters: HashMap<ProviderKind, _> = config.build_adapters()?;
    if adapters.is_empty() {
        warn!("no identity provider configured");
    }
    for kind in adapters.keys() {
        info!(provider = %kind, "identity provider enabled");
    }

    let sessions = Arc::new(MemorySessionStore::new(chrono::Duration::minutes(
        config.session_minutes,
    )));
    let purge = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge.purge_expired().await;
            if purged > 0 {
                info!(purged, "expired sessions purged");
            }
        }
    });

    let cors = Arc::new(CorsAllowlist::new());
    let state = AppState {
        adapters: Arc::new(adapters),
        sdk,
        verifier: Arc::new(ClientVerifier::new(portal.clone(), cors.clone())),
        coordinator: Arc::new(CallbackCoordinator::new(portal, config.server_name.clone())),
        cors,
        sessions,
        base_path: config.normalized_base_path(),
        secure_cookies: config.secure_cookies,
    };

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, base_path = %state.base_path, "auth-broker listening");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
