//! TwiML rendering for incoming calls.

/// Path of the caller-leg WebSocket endpoint.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// WebSocket URL Twilio should stream the call to.
pub fn media_stream_url(host: &str) -> String {
    format!("wss://{}{}", host.trim_end_matches('/'), MEDIA_STREAM_PATH)
}

/// Build the TwiML answering an incoming call: speak `greeting`, then connect
/// the call audio to `stream_url`.
pub fn connect_stream_twiml(greeting: &str, language: &str, stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Say language="{}">{}</Say>
    <Connect>
        <Stream url="{}"/>
    </Connect>
</Response>"#,
        escape_xml(language),
        escape_xml(greeting),
        escape_xml(stream_url)
    )
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
