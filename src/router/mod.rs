//! HTTP control plane: translates runtime-compatible requests into cluster
//! operations, redirecting per-container inspection traffic to the owning
//! engine (§4.6).

mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cluster::Cluster;

/// Shared state every handler closes over.
#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<Cluster>,
}

/// Every route pattern, registered both bare and under a version prefix, so
/// `GET /containers/json` and `GET /v1.41/containers/json` both resolve —
/// matching clients built against either shape of the wire protocol.
pub fn build_router(cluster: Arc<Cluster>) -> Router {
    let state = AppState { cluster };

    let routes = Router::new()
        .route("/_ping", get(handlers::ping))
        .route("/info", get(handlers::info))
        .route("/containers/json", get(handlers::list_containers))
        .route("/containers/ps", get(handlers::list_containers))
        .route("/containers/create", post(handlers::create_container))
        .route("/containers/:name/json", get(handlers::redirect_to_owner))
        .route("/containers/:name/export", get(handlers::redirect_to_owner))
        .route("/containers/:name/changes", get(handlers::redirect_to_owner))
        .route("/containers/:name/top", get(handlers::redirect_to_owner))
        .route("/containers/:name/logs", get(handlers::redirect_to_owner))
        .route("/containers/:name/start", post(handlers::start_container))
        .route("/containers/:name", delete(handlers::remove_container));

    // The version segment (e.g. "v1.41") is matched but never inspected —
    // every client-visible behavior is version-independent here.
    Router::new()
        .merge(routes.clone())
        .nest("/:version", routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
