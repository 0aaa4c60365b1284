//! Connection limit middleware for the caller media stream
//!
//! Every media stream holds one AI-leg connection for its whole lifetime, so
//! the number of concurrent streams is capped:
//! - Global maximum WebSocket connections
//! - Per-IP connection limits
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use hotline_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// Client IP of an admitted WebSocket upgrade.
///
/// The handler releases the slot with it once the call ends.
#[derive(Clone, Debug)]
pub struct ClientIp(pub IpAddr);

/// Middleware that enforces connection limits for WebSocket upgrades.
///
/// Returns 503 Service Unavailable when the global limit is reached and
/// 429 Too Many Requests when the per-IP limit is reached. Requests without
/// an `Upgrade: websocket` header pass through untouched.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIp(client_ip));
            let response = next.run(request).await;
            // A failed upgrade never reaches the socket task, so nothing else would release it
            if response.status() != StatusCode::SWITCHING_PROTOCOLS {
                state.release_connection(client_ip);
            }
            response
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting media stream: global limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting media stream: per-IP limit reached");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}
