//! Twilio Media Streams frame types.
//!
//! Inbound frames (Twilio -> gateway), tagged by `event`:
//! - `connected` - transport handshake
//! - `start` - stream metadata, carries the `streamSid`
//! - `media` - one chunk of caller audio with its playback timestamp
//! - `mark` - a previously sent marker finished playing
//! - `stop` - stream ended
//!
//! Outbound frames (gateway -> Twilio):
//! - `media` - audio to play to the caller
//! - `mark` - marker echoed back once the preceding audio has played
//! - `clear` - drop all buffered outbound audio

use serde::{Deserialize, Deserializer, Serialize};

use super::{TelephonyError, TelephonyResult};

/// Marker name attached to every forwarded assistant audio fragment.
pub const RESPONSE_PART_MARK: &str = "responsePart";

// =============================================================================
// Inbound Frames
// =============================================================================

/// Frames received from Twilio.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioInbound {
    /// Transport handshake
    Connected,

    /// Stream begins
    Start {
        /// Stream metadata
        start: StartMetadata,
    },

    /// Caller audio chunk
    Media {
        /// Audio payload and timing
        media: InboundMedia,
    },

    /// Playback acknowledgment
    Mark {
        /// Marker that finished playing; Twilio may omit it
        #[serde(default)]
        mark: MarkPayload,
    },

    /// Stream ends
    Stop,

    /// Every other event kind
    #[serde(other)]
    Unknown,
}

/// Metadata carried by the `start` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    /// Stream identifier, required to address outbound frames
    pub stream_sid: String,
    /// Call identifier
    #[serde(default)]
    pub call_sid: Option<String>,
    /// Account identifier
    #[serde(default)]
    pub account_sid: Option<String>,
    /// Custom parameters from the TwiML `<Stream>` element
    #[serde(default)]
    pub custom_parameters: Option<serde_json::Value>,
}

/// Payload of an inbound `media` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMedia {
    /// Playback clock of the chunk in milliseconds
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
    /// Base64 audio, never decoded
    pub payload: String,
    /// Track name (inbound/outbound)
    #[serde(default)]
    pub track: Option<String>,
}

/// Name of a mark frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkPayload {
    /// Marker name, empty when absent
    #[serde(default)]
    pub name: String,
}

/// Twilio sends timestamps as decimal strings; integers are accepted too.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Number(u64),
        Text(String),
    }

    match Timestamp::deserialize(deserializer)? {
        Timestamp::Number(n) => Ok(n),
        Timestamp::Text(s) => s.trim().parse().map_err(|_| {
            serde::de::Error::custom(format!("invalid media timestamp '{s}'"))
        }),
    }
}

// =============================================================================
// Outbound Frames
// =============================================================================

/// Frames sent to Twilio.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioOutbound {
    /// Audio to play to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Playback marker
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },

    /// Drop buffered outbound audio
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Payload of an outbound `media` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    /// Base64 audio in the telephony codec
    pub payload: String,
}

impl TwilioOutbound {
    /// Audio frame for the given stream.
    pub fn media(stream_sid: &str, payload: String) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    /// The `responsePart` marker frame for the given stream.
    pub fn response_part_mark(stream_sid: &str) -> Self {
        Self::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkPayload {
                name: RESPONSE_PART_MARK.to_string(),
            },
        }
    }

    /// Clear frame for the given stream.
    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> TelephonyResult<TwilioInbound> {
    serde_json::from_str(text).map_err(|e| TelephonyError::MalformedFrame(e.to_string()))
}

/// Encode one outbound frame as JSON text.
pub fn encode_frame(frame: &TwilioOutbound) -> TelephonyResult<String> {
    serde_json::to_string(frame).map_err(|e| TelephonyError::SerializationError(e.to_string()))
}
