//! Per-call bridge between the caller leg and the AI leg.
//!
//! [`CallBridge`] owns the [`CallSession`] and the AI-leg client of one call.
//! The socket task feeds it caller frames and AI events one at a time, so a
//! barge-in (truncate, clear, reset) never interleaves with other events of
//! the same call.
//!
//! The AI-leg handshake runs on its own task. Until [`CallBridge::ai_leg_opened`]
//! hands the connected client over, caller audio is dropped.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::core::interruption::{begin_interruption, complete_interruption, on_audio_delta};
use crate::core::realtime::{
    BoxedRealtime, FunctionCallRequest, RealtimeError, RealtimeEvent, RealtimeEventSender,
    RealtimeResult,
};
use crate::core::session::CallSession;
use crate::core::telephony::{StartMetadata, TwilioInbound, TwilioOutbound, decode_frame};
use crate::state::AppState;

/// Messages for the caller-leg sender task.
#[derive(Debug, Clone, PartialEq)]
pub enum CallerRoute {
    /// Frame to send to Twilio
    Frame(TwilioOutbound),
    /// Close the caller WebSocket
    Close,
}

/// Bridges one Twilio media stream to one AI-leg connection.
///
/// Every `handle_*` method returns `false` when the call has to end.
pub struct CallBridge {
    app_state: Arc<AppState>,
    session: Option<CallSession>,
    ai: Option<BoxedRealtime>,
    opening: Option<JoinHandle<RealtimeResult<BoxedRealtime>>>,
    caller_tx: mpsc::Sender<CallerRoute>,
    ai_events_tx: mpsc::Sender<RealtimeEvent>,
}

impl CallBridge {
    /// Create a bridge. Frames for the caller go to `caller_tx`; the AI leg
    /// delivers its events to `ai_events_tx` once opened.
    pub fn new(
        app_state: Arc<AppState>,
        caller_tx: mpsc::Sender<CallerRoute>,
        ai_events_tx: mpsc::Sender<RealtimeEvent>,
    ) -> Self {
        Self {
            app_state,
            session: None,
            ai: None,
            opening: None,
            caller_tx,
            ai_events_tx,
        }
    }

    /// Session state, once the stream has started.
    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    /// Whether the AI leg is currently held open.
    pub fn is_ai_open(&self) -> bool {
        self.ai.is_some()
    }

    /// Whether the AI-leg handshake is still in flight.
    pub fn is_ai_opening(&self) -> bool {
        self.opening.is_some()
    }

    fn stream_id(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.stream_id.as_str())
            .unwrap_or("-")
    }

    // =========================================================================
    // Caller leg
    // =========================================================================

    /// Handle one text frame from Twilio. Malformed frames are dropped.
    pub async fn handle_caller_text(&mut self, text: &str) -> bool {
        match decode_frame(text) {
            Ok(frame) => self.handle_caller_frame(frame).await,
            Err(e) => {
                warn!(stream_id = %self.stream_id(), error = %e, "Dropping malformed caller frame");
                true
            }
        }
    }

    /// Handle one decoded frame from Twilio.
    pub async fn handle_caller_frame(&mut self, frame: TwilioInbound) -> bool {
        match frame {
            TwilioInbound::Start { start } => self.on_stream_start(start).await,
            TwilioInbound::Media { media } => {
                let Some(session) = self.session.as_mut() else {
                    debug!("Media before stream start, dropping");
                    return true;
                };
                session.record_media_timestamp(media.timestamp);

                if let Some(ai) = self.ai.as_mut()
                    && ai.is_ready()
                    && let Err(e) = ai.send_audio(media.payload).await
                {
                    warn!(stream_id = %session.stream_id, error = %e, "Failed to forward caller audio");
                }
                true
            }
            TwilioInbound::Mark { mark } => {
                if let Some(session) = self.session.as_mut()
                    && !session.acknowledge_mark()
                {
                    debug!(stream_id = %session.stream_id, mark = %mark.name, "Mark without pending audio");
                }
                true
            }
            TwilioInbound::Stop => {
                info!(stream_id = %self.stream_id(), "Caller stream stopped");
                true
            }
            TwilioInbound::Connected => {
                debug!("Caller transport connected");
                true
            }
            TwilioInbound::Unknown => {
                debug!(stream_id = %self.stream_id(), "Ignoring unknown caller event");
                true
            }
        }
    }

    async fn on_stream_start(&mut self, start: StartMetadata) -> bool {
        if let Some(session) = self.session.as_mut() {
            info!(
                stream_id = %start.stream_sid,
                previous_stream_id = %session.stream_id,
                "Caller stream restarted"
            );
            session.restart(start.stream_sid, start.call_sid);
            return true;
        }

        info!(
            stream_id = %start.stream_sid,
            call_id = ?start.call_sid,
            "Caller stream started"
        );
        self.session = Some(CallSession::new(start.stream_sid, start.call_sid));

        if let Err(e) = self.start_ai_leg() {
            error!(stream_id = %self.stream_id(), error = %e, "Failed to create AI leg, ending call");
            return false;
        }
        true
    }

    /// Create the AI-leg client and start its handshake in the background.
    fn start_ai_leg(&mut self) -> RealtimeResult<()> {
        let config = self
            .app_state
            .config
            .realtime_config(self.app_state.tools.definitions());
        let ai = self.app_state.realtime_factory.create(config)?;

        let events = self.ai_events_tx.clone();
        let trigger = self.app_state.config.assistant_greeting_trigger.clone();
        self.opening = Some(tokio::spawn(
            open_ai_leg(ai, events, trigger).in_current_span(),
        ));
        Ok(())
    }

    /// Wait for the handshake started by `start` and take over the AI leg.
    ///
    /// Cancel safe, and pending forever when no handshake is in flight.
    /// Returns `false` when the AI leg could not be opened.
    pub async fn ai_leg_opened(&mut self) -> bool {
        let Some(task) = self.opening.as_mut() else {
            return std::future::pending().await;
        };
        let opened = task.await.unwrap_or_else(|e| {
            Err(RealtimeError::ConnectionFailed(format!(
                "AI leg task failed: {e}"
            )))
        });
        self.opening = None;

        match opened {
            Ok(ai) => {
                info!(
                    stream_id = %self.stream_id(),
                    provider = %ai.get_provider_info(),
                    "AI leg connected"
                );
                self.ai = Some(ai);
                if let Some(session) = self.session.as_mut() {
                    session.ai_connected = true;
                }
                true
            }
            Err(e) => {
                error!(stream_id = %self.stream_id(), error = %e, "Failed to open AI leg, ending call");
                false
            }
        }
    }

    // =========================================================================
    // AI leg
    // =========================================================================

    /// Handle one event from the AI leg.
    pub async fn handle_ai_event(&mut self, event: RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::AudioDelta { payload, item_id } => {
                self.on_assistant_audio(payload, item_id).await
            }
            RealtimeEvent::SpeechStarted { audio_start_ms } => {
                self.on_speech_started(audio_start_ms).await
            }
            RealtimeEvent::FunctionCall(request) => self.on_function_call(request).await,
            RealtimeEvent::Error { message } => {
                error!(stream_id = %self.stream_id(), message = %message, "AI backend error");
                true
            }
            RealtimeEvent::Closed { reason } => {
                warn!(
                    stream_id = %self.stream_id(),
                    reason = ?reason,
                    "AI leg closed unexpectedly, ending call"
                );
                if let Some(session) = self.session.as_mut() {
                    session.ai_connected = false;
                }
                false
            }
        }
    }

    async fn on_assistant_audio(&mut self, payload: String, item_id: Option<String>) -> bool {
        let Some(session) = self.session.as_mut() else {
            debug!("Assistant audio before stream start, dropping");
            return true;
        };

        for frame in on_audio_delta(session, payload, item_id) {
            if !self.send_to_caller(frame).await {
                return false;
            }
        }
        true
    }

    async fn on_speech_started(&mut self, audio_start_ms: u64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };

        let Some(interruption) = begin_interruption(session) else {
            debug!(
                stream_id = %session.stream_id,
                audio_start_ms,
                "Caller speech with no assistant audio pending"
            );
            return true;
        };

        if let Some(truncation) = &interruption.truncation
            && let Some(ai) = self.ai.as_mut()
        {
            debug!(
                item_id = %truncation.item_id,
                audio_end_ms = truncation.audio_end_ms,
                "Truncating assistant item"
            );
            if let Err(e) = ai
                .truncate_item(&truncation.item_id, truncation.audio_end_ms)
                .await
            {
                warn!(item_id = %truncation.item_id, error = %e, "Failed to truncate assistant item");
            }
        }

        let delivered = self.send_to_caller(interruption.clear).await;

        if let Some(session) = self.session.as_mut() {
            complete_interruption(session);
        }
        delivered
    }

    async fn on_function_call(&mut self, request: FunctionCallRequest) -> bool {
        let invocation = self.app_state.tools.dispatch(&request).await;

        let Some(ai) = self.ai.as_mut() else {
            warn!(call_id = %invocation.call_id, "Tool result ready but AI leg is gone");
            return true;
        };

        if let Err(e) = ai
            .submit_function_result(&invocation.call_id, &invocation.output)
            .await
        {
            warn!(call_id = %invocation.call_id, error = %e, "Failed to submit tool result");
            return true;
        }

        if let Err(e) = ai.create_response().await {
            warn!(call_id = %invocation.call_id, error = %e, "Failed to request continuation");
        }
        true
    }

    async fn send_to_caller(&self, frame: TwilioOutbound) -> bool {
        if self.caller_tx.send(CallerRoute::Frame(frame)).await.is_err() {
            debug!(stream_id = %self.stream_id(), "Caller sender is gone");
            return false;
        }
        true
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Close the AI leg if it is open, or abandon its handshake. Safe to call
    /// more than once.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.opening.take() {
            task.abort();
            // The handshake may have finished after the last poll
            if let Ok(Ok(mut ai)) = task.await {
                let _ = ai.disconnect().await;
            }
            debug!(stream_id = %self.stream_id(), "AI leg handshake abandoned");
        }

        if let Some(mut ai) = self.ai.take() {
            if let Err(e) = ai.disconnect().await {
                error!(stream_id = %self.stream_id(), error = %e, "Failed to close AI leg");
            } else {
                info!(stream_id = %self.stream_id(), "AI leg closed");
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.ai_connected = false;
            session.caller_connected = false;
        }
    }
}

/// Connect the AI leg, then make the assistant speak first.
async fn open_ai_leg(
    mut ai: BoxedRealtime,
    events: RealtimeEventSender,
    greeting_trigger: String,
) -> RealtimeResult<BoxedRealtime> {
    let opened = async {
        ai.connect(events).await?;
        if !greeting_trigger.is_empty() {
            ai.send_text(&greeting_trigger).await?;
        }
        ai.create_response().await
    }
    .await;

    match opened {
        Ok(()) => Ok(ai),
        Err(e) => {
            let _ = ai.disconnect().await;
            Err(e)
        }
    }
}
