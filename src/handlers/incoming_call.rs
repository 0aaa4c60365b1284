//! Call setup webhook.
//!
//! Twilio requests this endpoint when a call comes in. The answer is TwiML
//! that greets the caller and connects the call audio to the media stream
//! WebSocket of this server.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::telephony::{connect_stream_twiml, media_stream_url};
use crate::state::AppState;

/// Answer an incoming call with TwiML.
///
/// The stream URL uses the configured public host, falling back to the
/// request's `Host` header.
pub async fn incoming_call_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let host = state.config.public_host.clone().or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });

    let Some(host) = host else {
        warn!("Incoming call without Host header and no public host configured");
        return (StatusCode::BAD_REQUEST, "Missing Host header").into_response();
    };

    let stream_url = media_stream_url(&host);
    info!(stream_url = %stream_url, "Answering incoming call");

    let twiml = connect_stream_twiml(
        &state.config.call_greeting,
        &state.config.call_greeting_language,
        &stream_url,
    );

    ([(header::CONTENT_TYPE, "text/xml")], twiml).into_response()
}
