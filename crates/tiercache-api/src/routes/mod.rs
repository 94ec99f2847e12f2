//! API routes

mod health;
mod keyval;
pub mod metrics;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, header},
    middleware::{map_request, map_response},
    response::Response,
};
use std::sync::Arc;
use tiercache_core::codec::{X_GZIP, server_header};
use tower_http::compression::CompressionLayer;

use crate::state::{AppState, MetricsHandle};

/// Create the main router
///
/// Service endpoints live under `/-/`; every other single-segment path is a
/// key.
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let max_body_size = state.settings.max_body_size;

    let mut router = Router::new()
        .merge(health::routes())
        .merge(keyval::routes())
        .with_state(state);

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CompressionLayer::new().gzip(true))
        // Must wrap the compression layer so it sees the rewritten header
        .layer(map_request(negotiate_gzip))
        .layer(map_response(stamp_server))
}

/// Treat `x-gzip` as `accept-encoding: gzip`
async fn negotiate_gzip(mut request: Request) -> Request {
    if request.headers().contains_key(X_GZIP) {
        request
            .headers_mut()
            .insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    }
    request
}

async fn stamp_server(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::SERVER, server_header());
    response
}
