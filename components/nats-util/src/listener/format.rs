// External crates
use serde_json::{Map, Value};
use tracing::warn;

/// Turn a payload into the text printed for it.
///
/// With `parse_json` set, payloads holding a JSON object are pretty printed
/// with two space indentation and sorted keys. Anything else, or any payload
/// when `parse_json` is off, is printed as text unchanged.
pub fn render_payload(subject: &str, payload: &[u8], parse_json: bool) -> String {
    if !parse_json {
        return String::from_utf8_lossy(payload).into_owned();
    }

    match serde_json::from_slice::<Map<String, Value>>(payload) {
        Ok(parsed) => match serde_json::to_string_pretty(&parsed) {
            Ok(pretty) => pretty,
            Err(e) => {
                warn!(error = %e, subject, "Failed to pretty up the data");
                String::from_utf8_lossy(payload).into_owned()
            }
        },
        Err(e) => {
            warn!(error = %e, subject, bytes = payload.len(), "Failed to parse json msg");
            String::from_utf8_lossy(payload).into_owned()
        }
    }
}
