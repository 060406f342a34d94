use std::fmt;

pub const VAULT_MARKER: &str = "$VAULT;";
pub const VAULT_VERSION: &str = "1.0";

/// A sealed value as it appears in a variable scope: key id plus ciphertext.
///
/// Text form:
///
/// ```text
/// $VAULT;1.0;<key-id>
/// <hex ciphertext, may wrap over several lines>
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecretRef {
    pub key_id: String,
    pub ciphertext: Vec<u8>,
}

impl SecretRef {
    pub fn new(key_id: impl Into<String>, ciphertext: Vec<u8>) -> Self {
        Self {
            key_id: key_id.into(),
            ciphertext,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VaultEnvelopeError> {
        parse_envelope(input)
    }

    pub fn to_envelope(&self) -> String {
        to_envelope(&self.key_id, &self.ciphertext)
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vault:{}", self.key_id)
    }
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRef")
            .field("key_id", &self.key_id)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

pub fn is_vault_marker(input: &str) -> bool {
    input.trim_start().starts_with(VAULT_MARKER)
}

pub fn parse_envelope(input: &str) -> Result<SecretRef, VaultEnvelopeError> {
    let s = input.trim();
    let (header, body) = s.split_once('\n').unwrap_or((s, ""));
    let header = header.trim_end_matches('\r');

    let rest = header
        .strip_prefix(VAULT_MARKER)
        .ok_or(VaultEnvelopeError::MissingMarker)?;
    let (version, key_id) = rest
        .split_once(';')
        .ok_or(VaultEnvelopeError::MissingKeyId)?;
    if version != VAULT_VERSION {
        return Err(VaultEnvelopeError::UnsupportedVersion(version.to_string()));
    }
    let key_id = key_id.trim();
    if key_id.is_empty() {
        return Err(VaultEnvelopeError::MissingKeyId);
    }

    let hex_text: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if hex_text.is_empty() {
        return Err(VaultEnvelopeError::EmptyCiphertext);
    }
    let ciphertext =
        hex::decode(&hex_text).map_err(|e| VaultEnvelopeError::InvalidHex(e.to_string()))?;

    Ok(SecretRef::new(key_id, ciphertext))
}

/// Renders an envelope with the hex body wrapped at 80 columns.
pub fn to_envelope(key_id: &str, ciphertext: &[u8]) -> String {
    let hex_text = hex::encode(ciphertext);
    let mut out = format!("{VAULT_MARKER}{VAULT_VERSION};{key_id}");
    for chunk in hex_text.as_bytes().chunks(80) {
        out.push('\n');
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VaultEnvelopeError {
    #[error("vault envelope must start with {VAULT_MARKER}")]
    MissingMarker,
    #[error("unsupported vault envelope version: {0}")]
    UnsupportedVersion(String),
    #[error("vault envelope is missing a key id")]
    MissingKeyId,
    #[error("vault envelope has no ciphertext")]
    EmptyCiphertext,
    #[error("vault ciphertext is not valid hex: {0}")]
    InvalidHex(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_hex_body() {
        let r = parse_envelope("$VAULT;1.0;prod\n0a0b\n  0c0d \n").unwrap();
        assert_eq!(r.key_id, "prod");
        assert_eq!(r.ciphertext, vec![0x0a, 0x0b, 0x0c, 0x0d]);
    }

    #[test]
    fn display_and_debug_hide_ciphertext() {
        let r = SecretRef::new("prod", vec![0xde, 0xad]);
        assert_eq!(r.to_string(), "vault:prod");
        assert!(!format!("{r:?}").contains("dead"));
    }

    #[test]
    fn envelope_round_trips() {
        let r = SecretRef::new("k1", (0u8..100).collect());
        assert_eq!(parse_envelope(&r.to_envelope()).unwrap(), r);
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert_eq!(
            parse_envelope("$VAULT;2.0;k\nab").unwrap_err(),
            VaultEnvelopeError::UnsupportedVersion("2.0".to_string())
        );
        assert_eq!(
            parse_envelope("$VAULT;1.0;\nab").unwrap_err(),
            VaultEnvelopeError::MissingKeyId
        );
        assert_eq!(
            parse_envelope("$VAULT;1.0;k").unwrap_err(),
            VaultEnvelopeError::EmptyCiphertext
        );
        assert!(matches!(
            parse_envelope("$VAULT;1.0;k\nzz"),
            Err(VaultEnvelopeError::InvalidHex(_))
        ));
    }
}
