use serde_json::{Map, Value};

const OMITTED: &str = "<omitted>";

/// Replaces image-bearing values so a payload can be logged.
pub fn redact_payload(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(text) => {
            if text.trim_start().starts_with("data:") {
                Value::String(OMITTED.to_string())
            } else {
                value.clone()
            }
        }
        Value::Array(rows) => Value::Array(rows.iter().map(redact_payload).collect()),
        Value::Object(map) => Value::Object(redact_map(map)),
    }
}

pub fn redact_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, row) in map {
        if is_image_key(key) && row.is_string() {
            out.insert(key.clone(), Value::String(OMITTED.to_string()));
            continue;
        }
        out.insert(key.clone(), redact_payload(row));
    }
    out
}

fn is_image_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    matches!(
        lowered.as_str(),
        "b64_json" | "image" | "image_bytes" | "data" | "payload"
    ) || lowered.ends_with("image")
}
