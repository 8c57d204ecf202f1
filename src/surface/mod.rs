//! Control surface — Axum JSON API for the foreground.
//!
//! Exposes registry operations (add/toggle/remove/snapshot) and the
//! advisory endpoint. The surface talks to the engine only through the
//! shared registry. CORS enabled for local development.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::AppState;

/// Start the control surface web server.
///
/// This spawns a background task — it doesn't block.
pub fn spawn_surface(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Control surface starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind control surface port");

        axum::serve(listener, app)
            .await
            .expect("Control surface server error");
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/api/equities",
            get(routes::list_equities).post(routes::add_equity),
        )
        .route("/api/equities/:symbol/toggle", post(routes::toggle_equity))
        .route("/api/equities/:symbol", delete(routes::remove_equity))
        .route("/api/quote/:symbol", get(routes::quote))
        .route("/api/ask", post(routes::ask_advisor))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}
