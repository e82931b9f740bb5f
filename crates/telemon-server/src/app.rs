use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Builds the HTTP router.
///
/// Layer order, outermost first: gzip request decompression, response
/// compression, request logging. Handlers and the logger see plain bodies.
pub fn build_http_app(state: AppState) -> Router {
    api::metric_routes()
        .layer(middleware::from_fn(logging::request_logging))
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
        .with_state(state)
}
