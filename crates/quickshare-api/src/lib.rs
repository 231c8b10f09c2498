//! Thin HTTP realization of the per-session IPC surface (§6) — a
//! same-process stand-in for the out-of-scope platform UI.
//!
//! This crate knows nothing about `NearbySocket`/`SessionController`
//! directly: it talks to the daemon through one command channel, via
//! `ApiState`'s channel field, so the dependency runs daemon → api and
//! never the other way around.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::{ApiState, DaemonCommand};

pub async fn serve(state: ApiState, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/sessions", get(handlers::handle_list_sessions))
        .route("/sessions/{id}", get(handlers::handle_get_session))
        .route("/sessions/{id}/accept", post(handlers::handle_accept))
        .route("/sessions/{id}/reject", post(handlers::handle_reject))
        .route("/connect", post(handlers::handle_connect))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await?;
    tracing::info!(bind_addr, port, "IPC API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
