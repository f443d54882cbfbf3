use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use common::metrics;

use crate::handlers;
use crate::state::AppState;

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(metrics) => (StatusCode::OK, metrics),
        Err(e) => {
            tracing::error!(error = %e, "failed to gather metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("failed to gather metrics"),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(metrics_handler))
        .route(
            "/orders",
            get(handlers::list_orders::handle)
                .post(handlers::create_order::handle)
                .delete(handlers::clear_orders::handle),
        )
        .route(
            "/orders/:id",
            get(handlers::get_order::handle).delete(handlers::delete_order::handle),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
