//! Barge-in handling.
//!
//! Assistant audio is played to the caller through Twilio, which buffers it.
//! Every forwarded fragment is followed by a mark; Twilio echoes the mark once
//! the fragment has played. When the backend reports that the caller started
//! speaking while fragments are still unacknowledged, the assistant item is
//! truncated at the position the caller actually heard and Twilio's buffer is
//! cleared.
//!
//! Playback follows an explicit state machine:
//!
//! ```text
//! Idle --audio fragment--> Speaking --speech started--> Interrupting --done--> Idle
//! ```
//!
//! The controller only updates the [`CallSession`] and returns what has to be
//! sent; the caller of these functions does the I/O.

use tracing::debug;

use super::session::CallSession;
use super::telephony::{RESPONSE_PART_MARK, TwilioOutbound};

/// Playback state of the assistant's audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing is being played
    #[default]
    Idle,
    /// An assistant item is playing; the baseline timestamp is set
    Speaking,
    /// A barge-in is being handled
    Interrupting,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Speaking => write!(f, "speaking"),
            PlaybackState::Interrupting => write!(f, "interrupting"),
        }
    }
}

/// Instruction to shorten an assistant item on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Item to truncate
    pub item_id: String,
    /// Milliseconds of the item the caller heard
    pub audio_end_ms: u64,
}

/// Everything that must be sent when the caller barges in.
#[derive(Debug, Clone, PartialEq)]
pub struct Interruption {
    /// Truncate instruction, absent when no item id was known
    pub truncation: Option<Truncation>,
    /// Clear frame for the caller leg
    pub clear: TwilioOutbound,
}

/// Handle an assistant audio fragment.
///
/// Returns the `media` and `mark` frames to send to the caller, in order.
/// Empty payloads produce nothing.
pub fn on_audio_delta(
    session: &mut CallSession,
    payload: String,
    item_id: Option<String>,
) -> Vec<TwilioOutbound> {
    if payload.is_empty() {
        return Vec::new();
    }

    // Each item is truncated relative to its own first fragment
    if session.playback == PlaybackState::Speaking
        && let (Some(next), Some(current)) = (
            item_id.as_deref(),
            session.current_assistant_item_id.as_deref(),
        )
        && next != current
    {
        debug!(
            stream_id = %session.stream_id,
            pending_acks = session.pending_ack_queue.len(),
            "New assistant item, re-anchoring baseline"
        );
        session.response_start_timestamp = None;
        session.playback = PlaybackState::Idle;
    }

    let media = TwilioOutbound::media(&session.stream_id, payload);

    if session.response_start_timestamp.is_none() {
        session.response_start_timestamp = Some(session.latest_media_timestamp);
        session.playback = PlaybackState::Speaking;
        debug!(
            stream_id = %session.stream_id,
            baseline_ms = session.latest_media_timestamp,
            "Assistant playback started"
        );
    }

    if item_id.is_some() {
        session.current_assistant_item_id = item_id;
    }

    session
        .pending_ack_queue
        .push_back(RESPONSE_PART_MARK.to_string());
    let mark = TwilioOutbound::response_part_mark(&session.stream_id);

    vec![media, mark]
}

/// Start handling a caller barge-in.
///
/// Returns `None` (and changes nothing) unless audio is still unacknowledged
/// and a baseline is set. Otherwise the session moves to
/// [`PlaybackState::Interrupting`] until [`complete_interruption`] is called.
pub fn begin_interruption(session: &mut CallSession) -> Option<Interruption> {
    let baseline = session.response_start_timestamp?;
    if session.pending_ack_queue.is_empty() {
        return None;
    }

    session.playback = PlaybackState::Interrupting;

    let elapsed = session.latest_media_timestamp.saturating_sub(baseline);
    let truncation = session
        .current_assistant_item_id
        .clone()
        .map(|item_id| Truncation {
            item_id,
            audio_end_ms: elapsed,
        });

    debug!(
        stream_id = %session.stream_id,
        elapsed_ms = elapsed,
        pending_acks = session.pending_ack_queue.len(),
        "Caller barged in"
    );

    Some(Interruption {
        truncation,
        clear: TwilioOutbound::clear(&session.stream_id),
    })
}

/// Reset playback bookkeeping after a barge-in was sent.
pub fn complete_interruption(session: &mut CallSession) {
    session.pending_ack_queue.clear();
    session.current_assistant_item_id = None;
    session.response_start_timestamp = None;
    session.playback = PlaybackState::Idle;
}
