//! Caller media stream WebSocket
//!
//! Twilio connects here once the TwiML from `/incoming-call` is executed.
//! Each connection is one call: the handler opens an AI leg when the stream
//! starts and bridges audio in both directions until either side hangs up.
//!
//! # Protocol
//!
//! ## Twilio → Gateway
//!
//! - **connected**: transport handshake (ignored)
//! - **start**: stream metadata; opens the AI leg
//! - **media**: caller audio, forwarded to the AI leg
//! - **mark**: playback acknowledgment for a forwarded fragment
//! - **stop**: stream ended (the socket close follows)
//!
//! ## Gateway → Twilio
//!
//! - **media**: assistant audio
//! - **mark**: `responsePart` marker after every assistant fragment
//! - **clear**: drop buffered assistant audio on barge-in

mod bridge;
mod handler;

pub use bridge::{CallBridge, CallerRoute};
pub use handler::media_stream_handler;
