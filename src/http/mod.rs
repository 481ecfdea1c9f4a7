//! JSON API over the platform service, authenticated by a `session` cookie.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, patch, post, put},
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::application::PlatformService;
use crate::config::ServerConfig;

pub mod auth;
mod error;
pub mod routes;

pub struct AppState {
    pub service: PlatformService,
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/me", get(routes::me))
        .route("/tiers", post(routes::create_tier))
        .route("/tiers/{username}", get(routes::list_tiers))
        .route(
            "/subscriptions",
            get(routes::list_subscriptions).post(routes::subscribe),
        )
        .route("/subscriptions/{id}", patch(routes::update_subscription))
        .route("/earnings", get(routes::earnings))
        .route(
            "/bank-info",
            put(routes::put_bank_info)
                .get(routes::get_bank_info)
                .delete(routes::delete_bank_info),
        )
        .route(
            "/payouts",
            get(routes::list_payouts).post(routes::request_payout),
        )
        .route("/admin/payouts", get(routes::admin_list_payouts))
        .route("/admin/payouts/{id}/approve", post(routes::approve_payout))
        .route("/admin/payouts/{id}/reject", post(routes::reject_payout))
        .route("/admin/payouts/{id}/complete", post(routes::complete_payout))
        .route("/admin/subscriptions/renew", post(routes::run_renewals));

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c or SIGTERM.
pub async fn serve(service: PlatformService, config: &ServerConfig) -> Result<()> {
    let state = Arc::new(AppState { service });
    let app = router(state);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
