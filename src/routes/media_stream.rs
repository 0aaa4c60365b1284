//! Media stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::core::telephony::MEDIA_STREAM_PATH;
use crate::handlers::media_stream::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream WebSocket router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade for the caller leg
///
/// # Protocol
///
/// Twilio Media Streams JSON frames in both directions. After `start`, the
/// gateway opens the AI leg and relays audio until either side closes.
///
/// Connection limits should be applied in main.rs where the state is available.
pub fn create_media_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
