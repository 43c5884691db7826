//! Route configuration.

use crate::auth::{auth_middleware, trace_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/v1/uploads", post(handlers::create_upload))
        .route(
            "/v1/uploads/{session_id}",
            get(handlers::get_upload).delete(handlers::abort_upload),
        )
        .route(
            "/v1/uploads/{session_id}/chunks/{index}",
            put(handlers::upload_chunk),
        )
        .route(
            "/v1/uploads/{session_id}/finalize",
            post(handlers::finalize_upload),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Health stays unauthenticated for load balancer probes.
    let mut router = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .merge(upload_routes);

    // When enabled, this endpoint must be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
