use crate::secrets::SecretValue;

pub const MASK: &str = "********";

/// Replaces every occurrence of any secret plaintext in `text` with [`MASK`].
///
/// Longer secrets are replaced first so a secret that contains another is
/// masked whole.
pub fn mask_secrets(text: &str, secrets: &[SecretValue]) -> String {
    let mut needles: Vec<&str> = secrets
        .iter()
        .filter_map(SecretValue::expose_str)
        .filter(|s| !s.is_empty())
        .collect();
    needles.sort_by_key(|s| std::cmp::Reverse(s.len()));
    needles.dedup();

    let mut out = text.to_string();
    for n in needles {
        if out.contains(n) {
            out = out.replace(n, MASK);
        }
    }
    out
}

/// Masks secret plaintexts inside every string of a JSON value.
pub fn mask_json(value: &serde_json::Value, secrets: &[SecretValue]) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::String(s) => Value::String(mask_secrets(s, secrets)),
        Value::Array(items) => Value::Array(items.iter().map(|v| mask_json(v, secrets)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), mask_json(v, secrets)))
                .collect(),
        ),
        other => other.clone(),
    }
}
