//! AES-256-GCM encryption for refresh credentials.
//!
//! Each secret is encrypted with a fresh random nonce and stored as a
//! `{ciphertext, iv, tag}` triple of hex strings. The master key is 32 bytes
//! (256 bits) and is provided once at process start from an environment
//! variable.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
const TAG_SIZE: usize = 16;

/// An encrypted secret as it is stored in the directory.
///
/// The authentication tag is carried separately from the ciphertext so a
/// stored record can be inspected and validated field by field. All three
/// fields are hex-encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// Validates that the master key is exactly 32 bytes when base64 decoded.
///
/// # Returns
/// * `Ok(Vec<u8>)` - Decoded key bytes (32 bytes)
/// * `Err` - If key is invalid length or invalid base64
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64)
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

/// Encrypts a secret using AES-256-GCM with a random nonce.
///
/// # Security
/// - Uses a cryptographically secure random nonce (never reuse)
/// - Authenticated encryption (tampering detected on decrypt)
/// - Key must be kept secret and never stored on disk
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<EncryptedSecret> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    // Fresh random nonce per secret (never reuse!)
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    // The AEAD output carries the tag appended to the ciphertext; the stored
    // record keeps them as separate fields.
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

    Ok(EncryptedSecret {
        ciphertext: hex::encode(ciphertext),
        iv: hex::encode(nonce),
        tag: hex::encode(tag),
    })
}

/// Decrypts a stored `{ciphertext, iv, tag}` triple.
///
/// # Returns
/// * `Ok(String)` - Decrypted plaintext
/// * `Err` - If the tag does not verify (wrong key, corrupted or tampered
///   data). Fatal for that secret; never yields a plausible plaintext.
pub fn decrypt(ciphertext: &str, iv: &str, tag: &str, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let mut sealed = hex::decode(ciphertext).context("Failed to decode ciphertext")?;
    let nonce_bytes = hex::decode(iv).context("Failed to decode iv")?;
    let tag_bytes = hex::decode(tag).context("Failed to decode tag")?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(anyhow!(
            "Invalid iv size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        ));
    }
    if tag_bytes.len() != TAG_SIZE {
        return Err(anyhow!(
            "Invalid tag size: expected {}, got {}",
            TAG_SIZE,
            tag_bytes.len()
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let nonce = Nonce::from_slice(&nonce_bytes);

    // Reassemble the AEAD layout (ciphertext || tag) before opening.
    sealed.extend_from_slice(&tag_bytes);

    let plaintext_bytes = cipher
        .decrypt(nonce, sealed.as_ref())
        .map_err(|e| anyhow!("Decryption failed (wrong key or tampered data): {}", e))?;

    String::from_utf8(plaintext_bytes).context("Decrypted data is not valid UTF-8")
}

/// Convenience wrapper for decrypting a stored [`EncryptedSecret`].
pub fn decrypt_secret(secret: &EncryptedSecret, key: &[u8]) -> Result<String> {
    decrypt(&secret.ciphertext, &secret.iv, &secret.tag, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        // Valid 32-byte key (base64-encoded)
        let valid_key = BASE64.encode([0u8; 32]);
        assert!(validate_key(&valid_key).is_ok());

        // Too short
        let short_key = BASE64.encode([0u8; 16]);
        assert!(validate_key(&short_key).is_err());

        // Too long
        let long_key = BASE64.encode([0u8; 64]);
        assert!(validate_key(&long_key).is_err());

        // Invalid base64
        assert!(validate_key("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [0u8; 32];
        let plaintext = "1//refresh-credential-12345";

        let secret = encrypt(plaintext, &key).expect("Encryption failed");

        // Ciphertext should be different from plaintext
        assert_ne!(secret.ciphertext, plaintext);
        // Hex-encoded sizes are fixed for iv and tag
        assert_eq!(secret.iv.len(), NONCE_SIZE * 2);
        assert_eq!(secret.tag.len(), TAG_SIZE * 2);

        let decrypted =
            decrypt(&secret.ciphertext, &secret.iv, &secret.tag, &key).expect("Decryption failed");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_roundtrip_empty_string() {
        let key = [7u8; 32];
        let secret = encrypt("", &key).unwrap();
        assert_eq!(secret.ciphertext, "");
        assert_eq!(decrypt_secret(&secret, &key).unwrap(), "");
    }

    #[test]
    fn test_different_nonces() {
        let key = [0u8; 32];
        let plaintext = "same-plaintext";

        let first = encrypt(plaintext, &key).unwrap();
        let second = encrypt(plaintext, &key).unwrap();

        // Nonces should be different (random), and so should ciphertexts
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);

        assert_eq!(decrypt_secret(&first, &key).unwrap(), plaintext);
        assert_eq!(decrypt_secret(&second, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = [0u8; 32];
        let key2 = [1u8; 32];

        let secret = encrypt("secret", &key1).unwrap();
        assert!(decrypt_secret(&secret, &key2).is_err());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = [0u8; 32];
        let mut secret = encrypt("secret", &key).unwrap();

        // Flip one hex character of the authentication tag
        let flipped = if secret.tag.starts_with('0') { "1" } else { "0" };
        secret.tag.replace_range(0..1, flipped);

        assert!(decrypt_secret(&secret, &key).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [0u8; 32];
        let mut secret = encrypt("secret", &key).unwrap();

        let flipped = if secret.ciphertext.starts_with('0') {
            "1"
        } else {
            "0"
        };
        secret.ciphertext.replace_range(0..1, flipped);

        assert!(decrypt_secret(&secret, &key).is_err());
    }

    #[test]
    fn test_invalid_hex_rejected() {
        let key = [0u8; 32];
        let secret = encrypt("secret", &key).unwrap();

        assert!(decrypt("zz-not-hex", &secret.iv, &secret.tag, &key).is_err());
        assert!(decrypt(&secret.ciphertext, "zz", &secret.tag, &key).is_err());
        assert!(decrypt(&secret.ciphertext, &secret.iv, "zz", &key).is_err());
    }
}
