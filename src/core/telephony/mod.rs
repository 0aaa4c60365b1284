//! Caller-side (telephony) protocol adapter.
//!
//! Twilio Media Streams deliver the caller's audio as JSON text frames over a
//! WebSocket. This module decodes those frames, encodes the frames the gateway
//! sends back, and renders the TwiML document that points Twilio at the
//! media-stream endpoint.

pub mod messages;
pub mod twiml;

use thiserror::Error;

pub use messages::{
    InboundMedia, MarkPayload, OutboundMedia, RESPONSE_PART_MARK, StartMetadata, TwilioInbound,
    TwilioOutbound, decode_frame, encode_frame,
};
pub use twiml::{MEDIA_STREAM_PATH, connect_stream_twiml, media_stream_url};

/// Errors raised by the telephony frame codec.
#[derive(Debug, Error)]
pub enum TelephonyError {
    /// Frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame could not be encoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for telephony operations.
pub type TelephonyResult<T> = Result<T, TelephonyError>;
