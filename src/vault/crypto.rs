//! Key derivation and secret encryption
//!
//! PBKDF2-HMAC-SHA256 turns the operator secret into a 32-byte key; wallet
//! private keys are sealed with ChaCha20-Poly1305 under that key, one random
//! nonce per record.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// PBKDF2 iteration count. High enough to make offline brute force of the
/// keystore file expensive.
pub const KDF_ITERATIONS: u32 = 100_000;

/// Length of the persisted keystore salt in bytes
pub const SALT_LEN: usize = 16;

/// ChaCha20-Poly1305 nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// Derive the vault encryption key from the operator secret and keystore salt.
///
/// Deterministic: the same `(secret, salt)` always yields the same key.
pub fn derive_key(secret: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, iterations, &mut *key);
    key
}

/// Generate a fresh random keystore salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Encrypt a secret under the derived key with a fresh random nonce.
///
/// Returns the ciphertext and the nonce that must be stored alongside it.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::VaultCorrupt("encryption failed".to_string()))?;

    Ok((ciphertext, nonce))
}

/// Decrypt a stored secret.
///
/// An authentication failure means the key does not match the ciphertext,
/// which in practice means the wrong master secret was supplied.
pub fn decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_LEN {
        return Err(Error::VaultCorrupt(format!(
            "invalid nonce length: {}",
            nonce.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| {
            Error::InvalidCredential(
                "stored secret rejected under derived key (wrong master secret?)".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let salt = generate_salt();
        let a = derive_key("master", &salt, KDF_ITERATIONS);
        let b = derive_key("master", &salt, KDF_ITERATIONS);
        assert_eq!(*a, *b);
    }

    #[test]
    fn different_salts_yield_different_keys() {
        let a = derive_key("master", &generate_salt(), KDF_ITERATIONS);
        let b = derive_key("master", &generate_salt(), KDF_ITERATIONS);
        assert_ne!(*a, *b);
    }

    #[test]
    fn different_secrets_yield_different_keys() {
        let salt = generate_salt();
        let a = derive_key("master", &salt, KDF_ITERATIONS);
        let b = derive_key("other", &salt, KDF_ITERATIONS);
        assert_ne!(*a, *b);
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = derive_key("master", &generate_salt(), KDF_ITERATIONS);
        let secret = b"private key bytes go here  32b!!";

        let (ciphertext, nonce) = encrypt(&key, secret).unwrap();
        assert_ne!(&ciphertext[..secret.len().min(ciphertext.len())], &secret[..]);

        let plaintext = decrypt(&key, &nonce, &ciphertext).unwrap();
        assert_eq!(&plaintext[..], &secret[..]);
    }

    #[test]
    fn wrong_key_fails_with_invalid_credential() {
        let salt = generate_salt();
        let key = derive_key("master", &salt, KDF_ITERATIONS);
        let other = derive_key("not-the-master", &salt, KDF_ITERATIONS);

        let (ciphertext, nonce) = encrypt(&key, b"secret").unwrap();
        let err = decrypt(&other, &nonce, &ciphertext).unwrap_err();
        assert!(matches!(err, Error::InvalidCredential(_)));
    }

    #[test]
    fn truncated_nonce_is_rejected_as_corrupt() {
        let key = derive_key("master", &generate_salt(), KDF_ITERATIONS);
        let (ciphertext, _) = encrypt(&key, b"secret").unwrap();

        let err = decrypt(&key, &[0u8; 4], &ciphertext).unwrap_err();
        assert!(matches!(err, Error::VaultCorrupt(_)));
    }
}
