//! Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::routes;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors_allow_any = state.config.cors_allow_any();

    let mut app = Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/interactions", post(routes::interactions))
        .route("/api/doubt", post(routes::doubt))
        .route("/api/problem/solve", post(routes::guided))
        .route("/api/problem/progress", post(routes::guided))
        .route("/api/problem/hint", post(routes::hint))
        .route("/api/video/assist", post(routes::video))
        .route("/api/progress", post(routes::progress))
        .route(
            "/api/dashboard",
            get(routes::dashboard_get).post(routes::dashboard_post),
        );

    #[cfg(feature = "metrics")]
    {
        app = app
            .route("/metrics", get(routes::metrics))
            .route_layer(axum::middleware::from_fn(crate::metrics::track_requests));
    }

    app = app.layer(TraceLayer::new_for_http());
    if cors_allow_any {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.with_state(state)
}

/// Serve until Ctrl+C.
pub async fn start_server(state: Arc<AppState>, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("learnroute listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to install Ctrl+C handler; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
