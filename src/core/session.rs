//! Per-call state shared by the caller and AI legs.
//!
//! A [`CallSession`] is owned by exactly one task. Every handler takes it by
//! `&mut`, so no locking is involved and sequences of updates cannot
//! interleave with other events of the same call.

use std::collections::VecDeque;

use super::interruption::PlaybackState;

/// State of one bridged call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSession {
    /// Twilio stream identifier, required on every outbound frame
    pub stream_id: String,
    /// Twilio call identifier, for logging
    pub call_id: Option<String>,
    /// Assistant item currently being played to the caller
    pub current_assistant_item_id: Option<String>,
    /// Caller playback clock (ms) when the current assistant item started playing
    pub response_start_timestamp: Option<u64>,
    /// Latest caller playback clock (ms); never decreases
    pub latest_media_timestamp: u64,
    /// One entry per forwarded audio fragment not yet acknowledged by a mark
    pub pending_ack_queue: VecDeque<String>,
    /// Where the assistant's playback stands
    pub playback: PlaybackState,
    /// AI leg is open
    pub ai_connected: bool,
    /// Caller leg is open
    pub caller_connected: bool,
}

impl CallSession {
    /// Session for a stream that just started.
    pub fn new(stream_id: impl Into<String>, call_id: Option<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            call_id,
            current_assistant_item_id: None,
            response_start_timestamp: None,
            latest_media_timestamp: 0,
            pending_ack_queue: VecDeque::new(),
            playback: PlaybackState::Idle,
            ai_connected: false,
            caller_connected: true,
        }
    }

    /// Apply a repeated `start` frame: adopt the new stream id and reset the clocks.
    pub fn restart(&mut self, stream_id: impl Into<String>, call_id: Option<String>) {
        self.stream_id = stream_id.into();
        if call_id.is_some() {
            self.call_id = call_id;
        }
        self.response_start_timestamp = None;
        self.latest_media_timestamp = 0;
        if self.playback == PlaybackState::Speaking {
            self.playback = PlaybackState::Idle;
        }
    }

    /// Record the playback clock of an inbound media frame.
    ///
    /// Older timestamps are ignored so the clock only moves forward.
    pub fn record_media_timestamp(&mut self, timestamp: u64) {
        self.latest_media_timestamp = self.latest_media_timestamp.max(timestamp);
    }

    /// Consume one playback acknowledgment. Returns `false` if none was pending.
    pub fn acknowledge_mark(&mut self) -> bool {
        self.pending_ack_queue.pop_front().is_some()
    }

    /// Number of forwarded fragments still waiting for a mark.
    pub fn pending_acks(&self) -> usize {
        self.pending_ack_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = CallSession::new("MZ1", Some("CA1".to_string()));
        assert_eq!(session.stream_id, "MZ1");
        assert_eq!(session.latest_media_timestamp, 0);
        assert!(session.response_start_timestamp.is_none());
        assert_eq!(session.playback, PlaybackState::Idle);
        assert!(session.caller_connected);
        assert!(!session.ai_connected);
    }

    #[test]
    fn test_timestamp_follows_in_order_frames() {
        let mut session = CallSession::new("MZ1", None);
        for ts in [0, 20, 40, 60, 80] {
            session.record_media_timestamp(ts);
        }
        assert_eq!(session.latest_media_timestamp, 80);
    }

    #[test]
    fn test_timestamp_never_decreases() {
        let mut session = CallSession::new("MZ1", None);
        let mut previous = 0;
        for ts in [100, 40, 250, 249, 0, 400, 399] {
            session.record_media_timestamp(ts);
            assert!(session.latest_media_timestamp >= previous);
            previous = session.latest_media_timestamp;
        }
        assert_eq!(session.latest_media_timestamp, 400);
    }

    #[test]
    fn test_acknowledge_on_empty_queue() {
        let mut session = CallSession::new("MZ1", None);
        assert!(!session.acknowledge_mark());
        assert_eq!(session.pending_acks(), 0);
    }

    #[test]
    fn test_restart_resets_clocks_and_keeps_queue() {
        let mut session = CallSession::new("MZ1", Some("CA1".to_string()));
        session.record_media_timestamp(500);
        session.response_start_timestamp = Some(300);
        session.playback = PlaybackState::Speaking;
        session.pending_ack_queue.push_back("responsePart".to_string());

        session.restart("MZ2", None);

        assert_eq!(session.stream_id, "MZ2");
        assert_eq!(session.call_id.as_deref(), Some("CA1"));
        assert_eq!(session.latest_media_timestamp, 0);
        assert!(session.response_start_timestamp.is_none());
        assert_eq!(session.playback, PlaybackState::Idle);
        assert_eq!(session.pending_acks(), 1);
    }
}
