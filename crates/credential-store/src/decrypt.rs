use aead::generic_array::GenericArray;
use aead::{Aead, KeyInit};
use aes::{Aes128, Aes256};
use base64::Engine;
use eax::Eax;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;

use crate::CredentialError;

const HYBRID_PREFIX: &[u8] = b"HYBRID:";
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Decodes a value from a tenant's config map: plaintext is returned
/// verbatim, a `HYBRID:`-prefixed envelope is decrypted.
pub(crate) fn decrypt_config(
    value: &str,
    tenant_id: &str,
    storage_path: &str,
) -> Result<String, CredentialError> {
    let encrypted = match base64::engine::general_purpose::STANDARD.decode(value) {
        Ok(bytes) => bytes,
        // Not base64 at all - treat as plaintext, matching the upstream's
        // tolerant fallback for values it doesn't recognize.
        Err(_) => return Ok(value.to_string()),
    };

    let Some(payload) = encrypted.strip_prefix(HYBRID_PREFIX) else {
        return Ok(value.to_string());
    };

    let private_key = load_private_key(tenant_id, storage_path)?;
    let rsa_key_size = private_key.size();
    if payload.len() < rsa_key_size + NONCE_LEN + TAG_LEN {
        return Err(CredentialError::Decrypt("encrypted data too short".to_string()));
    }

    let enc_aes_key = &payload[..rsa_key_size];
    let nonce = &payload[rsa_key_size..rsa_key_size + NONCE_LEN];
    let tag = &payload[rsa_key_size + NONCE_LEN..rsa_key_size + NONCE_LEN + TAG_LEN];
    let ciphertext = &payload[rsa_key_size + NONCE_LEN + TAG_LEN..];

    let aes_key = private_key
        .decrypt(Oaep::new::<Sha1>(), enc_aes_key)
        .map_err(|e| CredentialError::Decrypt(format!("RSA decrypt failed: {e}")))?;

    let plaintext = aes_eax_decrypt(&aes_key, nonce, ciphertext, tag)?;
    String::from_utf8(plaintext)
        .map_err(|e| CredentialError::Decrypt(format!("decrypted payload is not UTF-8: {e}")))
}

/// Private key path: `{storage}/privkeys/{tenant}/private.pem`, falling
/// back to a local-dev relative path when the default Docker storage root
/// doesn't exist on disk.
fn load_private_key(tenant_id: &str, storage_path: &str) -> Result<RsaPrivateKey, CredentialError> {
    let primary = format!("{storage_path}/privkeys/{tenant_id}/private.pem");
    let path = if !std::path::Path::new(&primary).exists() && storage_path == "/app/storage" {
        let local = format!("../../api/storage/privkeys/{tenant_id}/private.pem");
        if std::path::Path::new(&local).exists() {
            local
        } else {
            primary
        }
    } else {
        primary
    };

    let pem = std::fs::read_to_string(&path)?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| CredentialError::Decrypt(format!("parse private key failed: {e}")))
}

/// Ciphertext and tag arrive split (Python/pycryptodome convention); the
/// `aead` crate's EAX expects them concatenated as `ciphertext || tag`.
fn aes_eax_decrypt(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, CredentialError> {
    let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    let nonce = GenericArray::from_slice(nonce);

    let result = match key.len() {
        16 => Eax::<Aes128>::new_from_slice(key)
            .map_err(|e| CredentialError::Decrypt(format!("invalid AES key: {e}")))?
            .decrypt(nonce, combined.as_slice()),
        32 => Eax::<Aes256>::new_from_slice(key)
            .map_err(|e| CredentialError::Decrypt(format!("invalid AES key: {e}")))?
            .decrypt(nonce, combined.as_slice()),
        other => {
            return Err(CredentialError::Decrypt(format!(
                "unsupported AES key length {other}"
            )))
        }
    };

    result.map_err(|_| CredentialError::Decrypt("AES-EAX authentication failed".to_string()))
}
