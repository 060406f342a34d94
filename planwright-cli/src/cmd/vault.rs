use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::io::AsyncReadExt;

use planwright_exec::secrets::{KeySource, Sha256Vault, VaultCipher};

use crate::exit_codes;
use crate::keys::build_key_source;
use crate::output::{print_error, print_result, OutputFormat};
use crate::{KeyArgs, OutputArgs};

#[derive(Serialize)]
struct EncryptResult<'a> {
    key_id: &'a str,
    envelope: String,
}

/// Seals a plaintext with the password the configured key sources hold for
/// `key_id`. The envelope can be pasted into a plan's `variables`.
pub async fn encrypt_cmd(
    key_id: &str,
    value: Option<String>,
    keys: KeyArgs,
    output: OutputArgs,
) -> i32 {
    let plaintext = match value {
        Some(v) => SecretString::from(v),
        None => match read_stdin().await {
            Ok(v) => v,
            Err(e) => {
                print_error(output.format, output.quiet, &format!("failed to read stdin: {e}"));
                return exit_codes::RUNTIME_ERROR;
            }
        },
    };

    let password = match build_key_source(&keys).key(key_id).await {
        Ok(p) => p,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let envelope = Sha256Vault
        .seal(key_id, &password, plaintext.expose_secret().as_bytes())
        .to_envelope();
    match output.format {
        OutputFormat::Json => print_result(
            output.format,
            output.quiet,
            &EncryptResult { key_id, envelope },
        ),
        OutputFormat::Text | OutputFormat::Dot => {
            if !output.quiet {
                println!("{envelope}");
            }
        }
    }
    exit_codes::SUCCESS
}

async fn read_stdin() -> std::io::Result<SecretString> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    let trimmed = buf.trim_end_matches(['\r', '\n']).len();
    buf.truncate(trimmed);
    Ok(SecretString::from(buf))
}
