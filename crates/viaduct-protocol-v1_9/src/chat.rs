//! 1.9 clients reject chat components that 1.8 clients accepted leniently.

use serde_json::{json, Value as Json};

/// Turn whatever the server sent into a chat component a 1.9 client parses.
///
/// Plain text and anything that isn't valid JSON are wrapped as
/// `{"text": ...}`; `null` becomes an empty component.
pub fn fix_json(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return text_component("");
    }
    let quoted = trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() > 1;
    let object = trimmed.starts_with('{') && trimmed.ends_with('}');
    if !quoted && !object {
        return text_component(line);
    }
    match serde_json::from_str::<Json>(trimmed) {
        Ok(Json::String(text)) => text_component(&text),
        Ok(parsed @ Json::Object(_)) => parsed.to_string(),
        _ => text_component(line),
    }
}

/// A bare `{"text": ...}` component.
pub fn text_component(text: &str) -> String {
    json!({ "text": text }).to_string()
}
