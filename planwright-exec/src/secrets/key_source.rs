use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::secrets::{SecretError, SecretValue};

/// Supplies vault passwords by key id. Read-only for the duration of a run.
///
/// A missing key is `SecretError::KeyNotFound`; anything else a source cannot
/// do (I/O, a failing helper) is `SecretError::KeySource`.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn key(&self, key_id: &str) -> Result<SecretValue, SecretError>;
}

#[derive(Default, Clone)]
pub struct StaticKeySource {
    keys: HashMap<String, SecretValue>,
}

impl StaticKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_id: impl Into<String>, password: impl Into<SecretValue>) -> Self {
        self.insert(key_id, password);
        self
    }

    pub fn insert(&mut self, key_id: impl Into<String>, password: impl Into<SecretValue>) {
        self.keys.insert(key_id.into(), password.into());
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn key(&self, key_id: &str) -> Result<SecretValue, SecretError> {
        self.keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| SecretError::KeyNotFound(key_id.to_string()))
    }
}

/// Reads `<prefix><KEY_ID>` where the key id is upper-cased and every
/// character outside `[A-Z0-9]` becomes `_`.
#[derive(Debug, Clone)]
pub struct EnvKeySource {
    pub prefix: String,
}

impl Default for EnvKeySource {
    fn default() -> Self {
        Self {
            prefix: "PLANWRIGHT_VAULT_KEY_".to_string(),
        }
    }
}

impl EnvKeySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, key_id: &str) -> String {
        let suffix: String = key_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

#[async_trait]
impl KeySource for EnvKeySource {
    async fn key(&self, key_id: &str) -> Result<SecretValue, SecretError> {
        match std::env::var(self.var_name(key_id)) {
            Ok(v) => Ok(SecretValue::from_string(v)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::KeyNotFound(key_id.to_string())),
            Err(e) => Err(SecretError::key_source(key_id, e.to_string())),
        }
    }
}

/// One file per key id under `base_dir`; a single trailing newline is stripped.
#[derive(Debug, Clone)]
pub struct FileKeySource {
    pub base_dir: PathBuf,
}

impl FileKeySource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl KeySource for FileKeySource {
    async fn key(&self, key_id: &str) -> Result<SecretValue, SecretError> {
        if key_id.is_empty()
            || key_id.starts_with('.')
            || key_id.contains(['/', '\\'])
        {
            return Err(SecretError::key_source(key_id, "key id is not a plain file name"));
        }
        let path = self.base_dir.join(key_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(SecretValue::from_bytes(strip_newline(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SecretError::KeyNotFound(key_id.to_string()))
            }
            Err(e) => Err(SecretError::key_source(key_id, format!("{}: {e}", path.display()))),
        }
    }
}

/// Runs a helper executable as `<program> --vault-id <key-id>` and reads the
/// password from its stdout. Exit status 2 means the helper does not know the
/// key.
#[derive(Debug, Clone)]
pub struct CommandKeySource {
    pub program: PathBuf,
}

pub const COMMAND_KEY_NOT_FOUND_STATUS: i32 = 2;

impl CommandKeySource {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl KeySource for CommandKeySource {
    async fn key(&self, key_id: &str) -> Result<SecretValue, SecretError> {
        let output = tokio::process::Command::new(&self.program)
            .arg("--vault-id")
            .arg(key_id)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SecretError::key_source(key_id, format!("{}: {e}", self.program.display()))
            })?;

        if output.status.code() == Some(COMMAND_KEY_NOT_FOUND_STATUS) {
            return Err(SecretError::KeyNotFound(key_id.to_string()));
        }
        if !output.status.success() {
            return Err(SecretError::key_source(
                key_id,
                format!("{} exited with {}", self.program.display(), output.status),
            ));
        }
        let password = strip_newline(output.stdout);
        if password.is_empty() {
            return Err(SecretError::KeyNotFound(key_id.to_string()));
        }
        Ok(SecretValue::from_bytes(password))
    }
}

/// Asks each source in order; the first one that has the key wins.
#[derive(Default)]
pub struct CompositeKeySource {
    sources: Vec<Box<dyn KeySource>>,
}

impl CompositeKeySource {
    pub fn new(sources: Vec<Box<dyn KeySource>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Box<dyn KeySource>) {
        self.sources.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl KeySource for CompositeKeySource {
    async fn key(&self, key_id: &str) -> Result<SecretValue, SecretError> {
        for s in &self.sources {
            match s.key(key_id).await {
                Ok(v) => return Ok(v),
                Err(SecretError::KeyNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SecretError::KeyNotFound(key_id.to_string()))
    }
}

fn strip_newline(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
    bytes
}
