use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState, websocket::execute_order_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Order stream
        .route("/api/orders/execute", get(execute_order_handler))
        // System endpoints
        .route("/api/health", get(handlers::health_handler))
        .route("/api/queue/stats", get(handlers::queue_stats_handler))
        .with_state(state)
        .layer(cors)
}
