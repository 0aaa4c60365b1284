use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio::select;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::core::realtime::RealtimeEvent;
use crate::core::telephony::encode_frame;
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::bridge::{CallBridge, CallerRoute};

/// Maximum WebSocket frame size (1 MB); media frames are ~200 bytes
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Time allowed for the sender task to flush after the call ended
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Releases an admission slot when the call ends, or when the upgrade never happens.
struct ConnectionSlot {
    state: Arc<AppState>,
    ip: Option<IpAddr>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if let Some(ip) = self.ip.take() {
            self.state.release_connection(ip);
        }
    }
}

/// Media stream WebSocket handler
///
/// Upgrades the Twilio request to a WebSocket and bridges the call to the
/// AI backend until either leg closes.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let slot = ConnectionSlot {
        state: state.clone(),
        ip: client_ip.map(|Extension(ClientIp(ip))| ip),
    };
    let connection_id = Uuid::new_v4();
    info!(%connection_id, ip = ?slot.ip, "Media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| {
            handle_media_stream(socket, state, slot)
                .instrument(info_span!("media_stream", %connection_id))
        })
}

async fn handle_media_stream(socket: WebSocket, app_state: Arc<AppState>, _slot: ConnectionSlot) {
    info!("Caller connected");

    let (mut sender, mut receiver) = socket.split();
    let capacity = app_state.config.session_channel_capacity;
    let (caller_tx, mut caller_rx) = mpsc::channel::<CallerRoute>(capacity);
    let (ai_events_tx, mut ai_events_rx) = mpsc::channel::<RealtimeEvent>(capacity);

    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = caller_rx.recv().await {
            let result = match route {
                CallerRoute::Frame(frame) => match encode_frame(&frame) {
                    Ok(text) => sender.send(Message::Text(text.into())).await,
                    Err(e) => {
                        error!("Failed to encode caller frame: {}", e);
                        continue;
                    }
                },
                CallerRoute::Close => {
                    debug!("Closing caller WebSocket");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!("Failed to send caller frame: {}", e);
                break;
            }
        }
    });

    let mut bridge = CallBridge::new(app_state.clone(), caller_tx.clone(), ai_events_tx);

    let idle_timeout = app_state.config.idle_timeout();
    let mut last_activity = Instant::now();
    let mut caller_gone = false;

    loop {
        select! {
            msg = receiver.next() => {
                last_activity = Instant::now();

                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !bridge.handle_caller_text(text.as_str()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Ignoring binary caller frame: {} bytes", data.len());
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Caller disconnected");
                        caller_gone = true;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Caller WebSocket error: {}", e);
                        caller_gone = true;
                        break;
                    }
                }
            }
            opened = bridge.ai_leg_opened(), if bridge.is_ai_opening() => {
                if !opened {
                    break;
                }
            }
            Some(event) = ai_events_rx.recv() => {
                if !bridge.handle_ai_event(event).await {
                    break;
                }
            }
            _ = idle_deadline(idle_timeout, last_activity) => {
                warn!(
                    "No caller frames for {}s, ending call",
                    last_activity.elapsed().as_secs()
                );
                break;
            }
        }
    }

    bridge.shutdown().await;
    drop(bridge);

    if !caller_gone {
        let _ = caller_tx.send(CallerRoute::Close).await;
    }
    drop(caller_tx);

    if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        warn!("Caller sender did not finish in time, aborting");
        sender_task.abort();
    }

    info!("Media stream terminated");
}

/// Resolves once the caller has been silent for `timeout`; never without one.
async fn idle_deadline(timeout: Option<Duration>, last_activity: Instant) {
    match timeout {
        Some(timeout) => tokio::time::sleep_until(last_activity + timeout).await,
        None => std::future::pending().await,
    }
}
