use planwright_core::SecretRef;
use sha2::{Digest, Sha256};

use crate::secrets::{SecretError, SecretValue};

const SALT_LEN: usize = 16;
const TAG_LEN: usize = 32;

/// Opens and seals vault payloads. Must be a pure function of
/// (ciphertext, password) when opening.
pub trait VaultCipher: Send + Sync {
    fn open(&self, secret: &SecretRef, password: &SecretValue) -> Result<SecretValue, SecretError>;

    fn seal(&self, key_id: &str, password: &SecretValue, plaintext: &[u8]) -> SecretRef;
}

/// Reference cipher.
///
/// Payload layout: `salt[16] || body || tag[32]` where
/// `key = SHA256(password)`, block `i` of the keystream is
/// `SHA256(key || salt || i_be64)` and `tag = SHA256(key || "tag" || salt || body)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Vault;

impl Sha256Vault {
    pub fn seal_with_salt(
        &self,
        key_id: &str,
        password: &SecretValue,
        plaintext: &[u8],
        salt: [u8; SALT_LEN],
    ) -> SecretRef {
        let key = derive_key(password);
        let mut out = Vec::with_capacity(SALT_LEN + plaintext.len() + TAG_LEN);
        out.extend_from_slice(&salt);
        out.extend(apply_keystream(&key, &salt, plaintext));
        let tag = tag(&key, &salt, &out[SALT_LEN..]);
        out.extend_from_slice(&tag);
        SecretRef::new(key_id, out)
    }
}

impl VaultCipher for Sha256Vault {
    fn open(&self, secret: &SecretRef, password: &SecretValue) -> Result<SecretValue, SecretError> {
        let data = &secret.ciphertext;
        if data.len() < SALT_LEN + TAG_LEN {
            return Err(SecretError::malformed(
                &secret.key_id,
                format!("ciphertext too short ({} bytes)", data.len()),
            ));
        }
        let (salt, rest) = data.split_at(SALT_LEN);
        let (body, expected) = rest.split_at(rest.len() - TAG_LEN);

        let key = derive_key(password);
        if !constant_time_eq(&tag(&key, salt, body), expected) {
            return Err(SecretError::IntegrityCheckFailed {
                key_id: secret.key_id.clone(),
            });
        }
        Ok(SecretValue::from_bytes(apply_keystream(&key, salt, body)))
    }

    fn seal(&self, key_id: &str, password: &SecretValue, plaintext: &[u8]) -> SecretRef {
        let mut salt = [0u8; SALT_LEN];
        salt.iter_mut().for_each(|b| *b = fastrand::u8(..));
        self.seal_with_salt(key_id, password, plaintext, salt)
    }
}

fn derive_key(password: &SecretValue) -> zeroize::Zeroizing<[u8; 32]> {
    let mut key = zeroize::Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&Sha256::digest(password.expose_bytes()));
    key
}

fn apply_keystream(key: &[u8; 32], salt: &[u8], input: &[u8]) -> Vec<u8> {
    input
        .chunks(32)
        .enumerate()
        .flat_map(|(i, chunk)| {
            let block = Sha256::new()
                .chain_update(key)
                .chain_update(salt)
                .chain_update((i as u64).to_be_bytes())
                .finalize();
            chunk
                .iter()
                .zip(block)
                .map(|(c, k)| c ^ k)
                .collect::<Vec<u8>>()
        })
        .collect()
}

fn tag(key: &[u8; 32], salt: &[u8], body: &[u8]) -> [u8; TAG_LEN] {
    let digest = Sha256::new()
        .chain_update(key)
        .chain_update(b"tag")
        .chain_update(salt)
        .chain_update(body)
        .finalize();
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&digest);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
