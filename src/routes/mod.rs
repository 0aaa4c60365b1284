pub mod api;
pub mod media_stream;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// All routes with their state, before server-wide layers are applied.
///
/// The media stream route sits behind the connection limit middleware,
/// which needs `ConnectInfo<SocketAddr>`; serve the router with
/// `into_make_service_with_connect_info`.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    let media_stream_routes = media_stream::create_media_stream_router().layer(
        middleware::from_fn_with_state(state.clone(), connection_limit_middleware),
    );

    api::create_api_router()
        .merge(media_stream_routes)
        .with_state(state)
}
