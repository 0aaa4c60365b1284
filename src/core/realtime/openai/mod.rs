//! OpenAI Realtime API module.
//!
//! The AI leg of a phone call: one WebSocket per call to OpenAI's Realtime API.
//!
//! # Features
//!
//! - Bidirectional audio streaming in the telephony codec
//! - Server-side Voice Activity Detection (VAD) for barge-in
//! - Function calling support
//! - Truncation of partially played assistant items
//!
//! # Supported Models
//!
//! - `gpt-4o-realtime-preview-2024-10-01` - default
//! - `gpt-4o-realtime-preview` - floating alias
//! - `gpt-4o-realtime-preview-2024-12-17` - December 2024 version
//! - `gpt-4o-mini-realtime-preview` - Mini model for lower latency
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse
//!
//! # Audio Format
//!
//! G.711 u-law at 8kHz in both directions, matching Twilio media streams.

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtime, OpenAIRealtimeFactory};
pub use config::{
    OPENAI_BETA_HEADER, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeModel,
    OpenAIRealtimeVoice,
};
pub use messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig, TurnDetection};
