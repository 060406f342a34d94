mod cache;
mod cipher;
mod error;
mod key_source;
mod redact;
mod value;

pub use cache::RunSecrets;
pub use cipher::{Sha256Vault, VaultCipher};
pub use error::SecretError;
pub use key_source::{
    CommandKeySource, CompositeKeySource, EnvKeySource, FileKeySource, KeySource, StaticKeySource,
    COMMAND_KEY_NOT_FOUND_STATUS,
};
pub use planwright_core::SecretRef;
pub use redact::{mask_json, mask_secrets, MASK};
pub use value::SecretValue;
