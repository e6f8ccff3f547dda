//! ABOUTME: Control API web layer: add/cancel/status/list plus health
//! ABOUTME: A thin Actix-web surface over `ag_pipeline::Registry`

use actix_web::HttpServer;
use ag_config::Config;
use ag_core::Result;
use ag_pipeline::Registry;
use std::sync::Arc;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod routing;

pub use routing::create_app;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
    pub rate_limit_config: middleware::ratelimit::RateLimitConfig,
    pub body_limits_config: middleware::bodylimits::BodyLimitsConfig,
}

/// Start the Control API server, serving until the process is killed.
pub async fn start_server(bind_addr: &str, state: AppState) -> Result<()> {
    tracing::info!(addr = %bind_addr, "starting control API server");

    HttpServer::new(move || create_app(state.clone()))
        .bind(bind_addr)
        .map_err(|e| ag_core::Error::Config(format!("failed to bind web server: {e}")))?
        .run()
        .await
        .map_err(|e| ag_core::Error::Config(format!("web server error: {e}")))?;

    Ok(())
}
