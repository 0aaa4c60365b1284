//! Mock backends for integration tests
//!
//! - `realtime_mock` - scripted OpenAI Realtime WebSocket server, plus an
//!   endpoint that never completes the handshake

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod realtime_mock;

pub use realtime_mock::{MockCommand, RealtimeMockServer, StalledEndpoint};
