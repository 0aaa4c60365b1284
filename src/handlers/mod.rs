//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `incoming_call` - TwiML answering an incoming call
//! - `media_stream` - Caller media stream WebSocket bridged to the AI backend

pub mod api;
pub mod incoming_call;
pub mod media_stream;

pub use incoming_call::incoming_call_handler;
pub use media_stream::media_stream_handler;
