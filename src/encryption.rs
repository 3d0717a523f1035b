use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// The auth key must be derivable from the password alone (the server never
// sees the password, so there is no place to store a per-user salt before
// login). The KDF is only hardening a wrapping key, not a stored hash.
const AUTH_KEY_SALT: &[u8] = b"loggit";
const AUTH_KEY_ITERATIONS: u32 = 100_000;

const NONCE_LENGTH: usize = 12;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EncryptionError {
    /// Decryption failed. When unwrapping a key pair this means the password
    /// was wrong; it is the system's only password check.
    #[error("failed to decrypt")]
    DecryptFailed,
    #[error("failed to encrypt")]
    EncryptFailed,
    #[error("invalid key material")]
    InvalidKeyMaterial,
}

/// Symmetric key derived from the user's password; wraps the key pair.
#[derive(Clone)]
pub struct AuthKey([u8; 32]);

/// Symmetric key derived from the user's own key pair; encrypts event names.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

/// P-256 key pair, base64-encoded. Generated once at account creation and
/// only ever stored wrapped by the auth key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

/// Deterministically derive the password-based wrapping key.
pub fn derive_auth_key(password: &str) -> AuthKey {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        AUTH_KEY_SALT,
        AUTH_KEY_ITERATIONS,
        &mut key,
    );

    AuthKey(key)
}

pub fn generate_key_pair() -> KeyPair {
    let secret_key = SecretKey::random(&mut OsRng);
    let public_key = secret_key.public_key();

    KeyPair {
        public_key: BASE64.encode(public_key.to_encoded_point(false).as_bytes()),
        private_key: BASE64.encode(secret_key.to_bytes()),
    }
}

/// Serialize and encrypt a key pair for server-side storage.
pub fn wrap(key_pair: &KeyPair, auth_key: &AuthKey) -> Result<String, EncryptionError> {
    let serialized =
        serde_json::to_vec(key_pair).map_err(|_| EncryptionError::InvalidKeyMaterial)?;

    encrypt_bytes(&serialized, &auth_key.0)
}

/// Decrypt and deserialize a wrapped key pair. Failure means the auth key
/// (and thus the password it was derived from) is wrong.
pub fn unwrap(wrapped_key_pair: &str, auth_key: &AuthKey) -> Result<KeyPair, EncryptionError> {
    let serialized = decrypt_bytes(wrapped_key_pair, &auth_key.0)?;

    serde_json::from_slice(&serialized).map_err(|_| EncryptionError::DecryptFailed)
}

/// Combine the key pair's own public and private halves into one reusable
/// field-encryption key (self-referential ECDH agreement).
pub fn derive_shared_key(key_pair: &KeyPair) -> Result<SharedKey, EncryptionError> {
    let private_bytes = BASE64
        .decode(&key_pair.private_key)
        .map_err(|_| EncryptionError::InvalidKeyMaterial)?;
    let secret_key =
        SecretKey::from_slice(&private_bytes).map_err(|_| EncryptionError::InvalidKeyMaterial)?;

    let public_bytes = BASE64
        .decode(&key_pair.public_key)
        .map_err(|_| EncryptionError::InvalidKeyMaterial)?;
    let public_key = PublicKey::from_sec1_bytes(&public_bytes)
        .map_err(|_| EncryptionError::InvalidKeyMaterial)?;

    let shared_secret = diffie_hellman(secret_key.to_nonzero_scalar(), public_key.as_affine());
    let key = Sha256::digest(shared_secret.raw_secret_bytes());

    Ok(SharedKey(key.into()))
}

pub fn encrypt_field(plaintext: &str, shared_key: &SharedKey) -> Result<String, EncryptionError> {
    encrypt_bytes(plaintext.as_bytes(), &shared_key.0)
}

pub fn decrypt_field(ciphertext: &str, shared_key: &SharedKey) -> Result<String, EncryptionError> {
    let plaintext = decrypt_bytes(ciphertext, &shared_key.0)?;

    String::from_utf8(plaintext).map_err(|_| EncryptionError::DecryptFailed)
}

fn encrypt_bytes(plaintext: &[u8], key: &[u8; 32]) -> Result<String, EncryptionError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut payload = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(payload))
}

fn decrypt_bytes(ciphertext: &str, key: &[u8; 32]) -> Result<Vec<u8>, EncryptionError> {
    let payload = BASE64
        .decode(ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)?;

    if payload.len() <= NONCE_LENGTH {
        return Err(EncryptionError::DecryptFailed);
    }

    let (nonce, ciphertext) = payload.split_at(NONCE_LENGTH);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_auth_key_is_deterministic() {
        let key_a = derive_auth_key("hunter2");
        let key_b = derive_auth_key("hunter2");
        let key_c = derive_auth_key("hunter3");

        assert_eq!(key_a.0, key_b.0);
        assert_ne!(key_a.0, key_c.0);
    }

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let key_pair = generate_key_pair();
        let auth_key = derive_auth_key("correct horse battery staple");

        let wrapped = wrap(&key_pair, &auth_key).unwrap();
        let unwrapped = unwrap(&wrapped, &auth_key).unwrap();

        assert_eq!(unwrapped, key_pair);
    }

    #[test]
    fn test_unwrap_with_wrong_key_fails() {
        let key_pair = generate_key_pair();
        let wrapped = wrap(&key_pair, &derive_auth_key("right password")).unwrap();

        let result = unwrap(&wrapped, &derive_auth_key("wrong password"));

        assert_eq!(result, Err(EncryptionError::DecryptFailed));
    }

    #[test]
    fn test_shared_key_is_stable_per_key_pair() {
        let key_pair = generate_key_pair();

        let shared_a = derive_shared_key(&key_pair).unwrap();
        let shared_b = derive_shared_key(&key_pair).unwrap();

        assert_eq!(shared_a.0, shared_b.0);
    }

    #[test]
    fn test_field_round_trip() {
        let shared_key = derive_shared_key(&generate_key_pair()).unwrap();

        for plaintext in ["", "Swim", "ran 5k 🏃", "name with\nnewline"] {
            let ciphertext = encrypt_field(plaintext, &shared_key).unwrap();
            assert_ne!(ciphertext, plaintext);
            assert_eq!(decrypt_field(&ciphertext, &shared_key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_field_decrypt_with_wrong_key_fails() {
        let key_a = derive_shared_key(&generate_key_pair()).unwrap();
        let key_b = derive_shared_key(&generate_key_pair()).unwrap();

        let ciphertext = encrypt_field("Dentist", &key_a).unwrap();

        assert_eq!(decrypt_field(&ciphertext, &key_b), Err(EncryptionError::DecryptFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let shared_key = derive_shared_key(&generate_key_pair()).unwrap();
        let ciphertext = encrypt_field("Dentist", &shared_key).unwrap();

        let mut payload = BASE64.decode(&ciphertext).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let tampered = BASE64.encode(payload);

        assert_eq!(decrypt_field(&tampered, &shared_key), Err(EncryptionError::DecryptFailed));
    }
}
