pub mod interruption;
pub mod realtime;
pub mod session;
pub mod telephony;
pub mod tools;

// Re-export commonly used types for convenience
pub use realtime::{
    BaseRealtime, BoxedRealtime, OpenAIRealtime, OpenAIRealtimeFactory, RealtimeConfig,
    RealtimeError, RealtimeEvent, RealtimeFactory, RealtimeProvider, RealtimeResult,
    SharedRealtimeFactory, create_realtime_provider, get_supported_realtime_providers,
};

pub use interruption::{Interruption, PlaybackState, Truncation};
pub use session::CallSession;
pub use telephony::{TelephonyError, TelephonyResult, TwilioInbound, TwilioOutbound};
pub use tools::{ToolDispatcher, ToolError, ToolInvocation, ToolResolver, ToolResult};
