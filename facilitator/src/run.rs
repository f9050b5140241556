use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use x402_chain_eip155::V1Eip155Exact;
use x402_facilitator_local::util::{SigDown, Telemetry};
use x402_facilitator_local::{FacilitatorLocal, handlers};
use x402_types::chain::{ChainRegistry, FromConfig};
use x402_types::scheme::{SchemeBlueprints, SchemeRegistry};

use crate::chain::ChainProvider;
use crate::config::Config;

/// Starts the facilitator and serves until SIGTERM or SIGINT.
///
/// Loads `.env`, installs logging, connects the configured chains and
/// registers the v1 `exact` scheme on each of them.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .is_err()
    {
        return Err("Failed to initialize rustls crypto provider".into());
    }

    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let chain_registry: ChainRegistry<ChainProvider> =
        ChainRegistry::from_config(config.chains()).await?;
    let scheme_blueprints = SchemeBlueprints::new().and_register(V1Eip155Exact);
    let scheme_registry = SchemeRegistry::build(&chain_registry, scheme_blueprints);
    if scheme_registry.is_empty() {
        tracing::warn!("No scheme handlers registered, every payment will be rejected");
    }

    let facilitator = FacilitatorLocal::new(scheme_registry);
    let axum_state = Arc::new(facilitator);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
