// Cryptographic utilities for sealing and opening cookie payloads

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Generic encryption function for any serializable data using AES-256-GCM
///
/// # Arguments
///
/// * `data` - The data to encrypt (must implement Serialize)
/// * `key` - The encryption key (must be 32 bytes for AES-256)
///
/// # Returns
///
/// A Base64URL-encoded string containing the nonce + ciphertext
///
/// # Errors
///
/// Returns an error if:
/// - Serialization fails
/// - Key length is invalid
/// - AES encryption fails
pub fn encrypt_data<T: Serialize>(data: &T, key: &[u8]) -> Result<String> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {} bytes, got {}",
            ENCRYPTION_KEY_SIZE,
            key.len()
        ));
    }

    // Serialize the data to JSON
    let json_data = serde_json::to_string(data).context("Failed to serialize data")?;

    // Generate random nonce
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // Encrypt the data
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, json_data.as_bytes())
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    // Combine nonce + ciphertext and encode as base64
    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Generic decryption function for any deserializable data using AES-256-GCM
///
/// Any bit flip in the input fails GCM authentication and surfaces as an
/// error rather than producing plaintext.
///
/// # Arguments
///
/// * `encrypted_data` - Base64URL-encoded string containing nonce + ciphertext
/// * `key` - The decryption key (must be 32 bytes for AES-256)
///
/// # Errors
///
/// Returns an error if:
/// - Key length is invalid
/// - Base64 decoding fails
/// - Data length is invalid
/// - AES decryption fails
/// - Deserialization fails
pub fn decrypt_data<T: DeserializeOwned>(encrypted_data: &str, key: &[u8]) -> Result<T> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {} bytes, got {}",
            ENCRYPTION_KEY_SIZE,
            key.len()
        ));
    }

    // Decode from base64
    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(encrypted_data)
        .context("Failed to decode base64 data")?;

    if combined.len() < NONCE_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    // Split nonce and ciphertext
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    // Decrypt the data
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

    // Deserialize the data from JSON
    let data: T = serde_json::from_slice(&plaintext)
        .context("Failed to deserialize data from decrypted JSON")?;

    Ok(data)
}

/// Derive a proper 32-byte encryption key from input key material
///
/// This function ensures that any input key is properly extended or truncated
/// to exactly 32 bytes for use with AES-256. For keys shorter than 32 bytes,
/// it uses a simple hash-based extension method. Empty input yields the
/// all-zero key rather than panicking.
///
/// # Note
///
/// This is a simple key derivation method. For production use with weak keys,
/// consider using proper key derivation functions like PBKDF2 or HKDF.
#[must_use]
pub fn derive_encryption_key(input_key: &[u8]) -> [u8; ENCRYPTION_KEY_SIZE] {
    let mut encryption_key = [0u8; ENCRYPTION_KEY_SIZE];
    let key_len = std::cmp::min(input_key.len(), ENCRYPTION_KEY_SIZE);
    if key_len == 0 {
        return encryption_key;
    }
    encryption_key[..key_len].copy_from_slice(&input_key[..key_len]);

    // If key is shorter than 32 bytes, derive the rest using a simple hash
    if key_len < ENCRYPTION_KEY_SIZE {
        for i in key_len..ENCRYPTION_KEY_SIZE {
            encryption_key[i] =
                encryption_key[i % key_len].wrapping_add(u8::try_from(i % 256).unwrap_or(0));
        }
    }

    encryption_key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const TEST_KEY_MATERIAL: &[u8] = b"test_secret_key_for_cookie_crypto";

    #[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
    struct Payload {
        value: String,
        stamp: i64,
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = derive_encryption_key(TEST_KEY_MATERIAL);
        let payload = Payload {
            value: "42".to_string(),
            stamp: 1_700_000_000,
        };

        let sealed = encrypt_data(&payload, &key).unwrap();
        let opened: Payload = decrypt_data(&sealed, &key).unwrap();

        assert_eq!(opened, payload);
    }

    #[test]
    fn test_nonce_makes_ciphertext_unique() {
        let key = derive_encryption_key(TEST_KEY_MATERIAL);
        let payload = Payload {
            value: "42".to_string(),
            stamp: 1_700_000_000,
        };

        let first = encrypt_data(&payload, &key).unwrap();
        let second = encrypt_data(&payload, &key).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let key = derive_encryption_key(TEST_KEY_MATERIAL);
        let other_key = derive_encryption_key(b"a completely different secret");
        let payload = Payload {
            value: "42".to_string(),
            stamp: 1_700_000_000,
        };

        let sealed = encrypt_data(&payload, &key).unwrap();
        let result: Result<Payload> = decrypt_data(&sealed, &other_key);

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        let payload = Payload {
            value: "42".to_string(),
            stamp: 0,
        };

        assert!(encrypt_data(&payload, b"short").is_err());
        let result: Result<Payload> = decrypt_data("AAAA", b"short");
        assert!(result.is_err());
    }

    #[test]
    fn test_decrypt_garbage_input() {
        let key = derive_encryption_key(TEST_KEY_MATERIAL);

        let not_base64: Result<Payload> = decrypt_data("not valid base64!!", &key);
        assert!(not_base64.is_err());

        // Valid base64 but shorter than a nonce
        let too_short: Result<Payload> = decrypt_data("AAAA", &key);
        assert!(too_short.is_err());
    }

    #[test]
    fn test_derive_encryption_key_lengths() {
        let short = derive_encryption_key(b"abc");
        let exact = derive_encryption_key(&[7u8; ENCRYPTION_KEY_SIZE]);
        let long = derive_encryption_key(&[9u8; 64]);

        assert_eq!(short.len(), ENCRYPTION_KEY_SIZE);
        assert_eq!(exact, [7u8; ENCRYPTION_KEY_SIZE]);
        assert_eq!(long, [9u8; ENCRYPTION_KEY_SIZE]);
        // Deterministic for the same input
        assert_eq!(short, derive_encryption_key(b"abc"));
    }

    #[test]
    fn test_empty_key_material_does_not_panic() {
        let derived = derive_encryption_key(b"");
        assert_eq!(derived, [0u8; ENCRYPTION_KEY_SIZE]);

        // Usable end to end, if ill-advised
        let payload = Payload {
            value: "42".to_string(),
            stamp: 0,
        };
        let sealed = encrypt_data(&payload, &derived).unwrap();
        let opened: Payload = decrypt_data(&sealed, &derived).unwrap();
        assert_eq!(opened, payload);
    }
}
