use planwright_core::expressions::Filter;
use serde_json::Value as JsonValue;

/// Text form of a value when it is spliced into a larger string.
pub(crate) fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn apply_filter(filter: &Filter, value: JsonValue) -> JsonValue {
    match (filter, value) {
        (Filter::Upper, JsonValue::String(s)) => JsonValue::String(s.to_uppercase()),
        (Filter::Lower, JsonValue::String(s)) => JsonValue::String(s.to_lowercase()),
        (Filter::Trim, JsonValue::String(s)) => JsonValue::String(s.trim().to_string()),
        (Filter::Default(fallback), JsonValue::Null) => JsonValue::String(fallback.clone()),
        (Filter::Default(fallback), JsonValue::String(s)) if s.is_empty() => {
            JsonValue::String(fallback.clone())
        }
        (_, other) => other,
    }
}
