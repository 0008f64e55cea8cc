//! Provider credential resolution: reads a tenant's `encrypted_config`
//! JSON blob, decrypts any hybrid-encrypted values, and caches the result
//! per provider for an hour.
//!
//! Values are either plaintext or a `HYBRID:`-prefixed, base64-encoded
//! envelope: `enc_aes_key (RSA-2048, 256 B) | nonce (16 B) | tag (16 B) |
//! ciphertext`. The AES key is recovered with RSA-OAEP/SHA-1 using the
//! tenant's private key, then the payload is opened with AES-EAX.

mod cache;
mod decrypt;

pub use cache::{CredentialCache, DEFAULT_CACHE_TTL};

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

const KEY_OPENAI_API_KEY: &str = "openai_api_key";
const KEY_OPENAI_API_BASE: &str = "openai_api_base";
const KEY_DASHSCOPE_API_KEY: &str = "dashscope_api_key";
const KEY_API_KEY: &str = "api_key";

/// Tried, in order, when none of the primary keys are present at the top
/// level of the config map.
const CREDENTIAL_KEY_FALLBACK: [&str; 3] = [KEY_OPENAI_API_KEY, KEY_API_KEY, KEY_DASHSCOPE_API_KEY];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("provider config is not valid JSON: {0}")]
    InvalidConfig(String),

    #[error("no usable API key found in provider config for tenant {0}")]
    NotFound(String),

    #[error("failed to read private key: {0}")]
    Io(#[from] std::io::Error),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// A provider's resolved, plaintext credentials.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub api_key: String,
    /// Base URL override from `openai_api_base`, when present - preferred
    /// over any per-provider default so billing stays tenant-separated.
    pub endpoint: Option<String>,
}

/// Resolves a provider's plaintext credentials from its raw
/// `encrypted_config` JSON column and the owning tenant's id.
pub fn resolve_credentials(
    encrypted_config_json: &str,
    tenant_id: &str,
    storage_path: &str,
) -> Result<ResolvedCredentials, CredentialError> {
    let config_map: HashMap<String, Value> = serde_json::from_str(encrypted_config_json)
        .map_err(|e| CredentialError::InvalidConfig(e.to_string()))?;

    let mut endpoint = None;
    let set_endpoint = |endpoint: &mut Option<String>| {
        if let Some(base) = config_map.get(KEY_OPENAI_API_BASE).and_then(Value::as_str) {
            let trimmed = base.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                *endpoint = Some(trimmed.to_string());
            }
        }
    };

    let api_key = if let Some(v) = config_map.get(KEY_OPENAI_API_KEY).and_then(Value::as_str) {
        let decrypted = decrypt::decrypt_config(v, tenant_id, storage_path)?;
        set_endpoint(&mut endpoint);
        decrypted
    } else if let Some(v) = config_map.get(KEY_DASHSCOPE_API_KEY).and_then(Value::as_str) {
        decrypt::decrypt_config(v, tenant_id, storage_path)?
    } else if let Some(v) = config_map.get(KEY_API_KEY).and_then(Value::as_str) {
        decrypt::decrypt_config(v, tenant_id, storage_path)?
    } else {
        let mut found = String::new();
        for key in CREDENTIAL_KEY_FALLBACK {
            if let Some(v) = config_map.get(key).and_then(Value::as_str) {
                if let Ok(decrypted) = decrypt::decrypt_config(v, tenant_id, storage_path) {
                    if !decrypted.is_empty() {
                        found = decrypted;
                        break;
                    }
                }
            }
        }
        set_endpoint(&mut endpoint);
        found
    };

    if api_key.is_empty() {
        return Err(CredentialError::NotFound(tenant_id.to_string()));
    }

    Ok(ResolvedCredentials { api_key, endpoint })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_config_resolves_without_decryption() {
        let json = r#"{"openai_api_key":"sk-plain-test","openai_api_base":"https://api.example.com/"}"#;
        let creds = resolve_credentials(json, "tenant-1", "/nonexistent").unwrap();
        assert_eq!(creds.api_key, "sk-plain-test");
        assert_eq!(creds.endpoint.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn dashscope_key_is_tried_before_fallback() {
        let json = r#"{"dashscope_api_key":"sk-dashscope"}"#;
        let creds = resolve_credentials(json, "tenant-1", "/nonexistent").unwrap();
        assert_eq!(creds.api_key, "sk-dashscope");
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let json = r#"{"unrelated_field":"x"}"#;
        assert!(resolve_credentials(json, "tenant-1", "/nonexistent").is_err());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(resolve_credentials("not json", "tenant-1", "/nonexistent").is_err());
    }
}
