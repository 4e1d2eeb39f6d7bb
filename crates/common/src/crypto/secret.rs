//! Envelope encryption using AES-256-GCM
//!
//! Each uploaded file gets its own `Secret` and `Iv`:
//! - **Per-file keys**: compromising one key exposes exactly one file
//! - **Authenticated**: a flipped bit, wrong key or wrong nonce is detected
//!   and never yields partial plaintext
//! - **Portable**: keys and nonces round-trip losslessly through base64

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of an AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;
/// Size of an AES-256 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("invalid {what} size, expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid encoding: {0}")]
    Encoding(String),
    #[error("failed to gather randomness: {0}")]
    Random(#[from] getrandom::Error),
    #[error("encryption failed")]
    Encrypt,
    /// Authentication failed: tampered ciphertext, wrong key or wrong nonce.
    #[error("integrity check failed: ciphertext is corrupted or the key material does not match")]
    Integrity,
}

/// A 256-bit symmetric key for a single file
///
/// # Examples
///
/// ```ignore
/// let secret = Secret::generate();
/// let iv = Iv::generate();
///
/// let ciphertext = secret.encrypt(&iv, b"scan.dcm bytes")?;
/// let recovered = secret.decrypt(&iv, &ciphertext)?;
/// ```
#[derive(PartialEq, Eq, Clone)]
pub struct Secret([u8; SECRET_SIZE]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Create a secret from a byte slice
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        let buff: [u8; SECRET_SIZE] = data.try_into().map_err(|_| SecretError::InvalidLength {
            what: "secret",
            expected: SECRET_SIZE,
            actual: data.len(),
        })?;
        Ok(buff.into())
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| SecretError::Encoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Encrypt data under this key and the given nonce
    ///
    /// The output is `ciphertext || auth_tag (16 bytes)`. The nonce is not
    /// included; callers store it next to the file record.
    pub fn encrypt(&self, iv: &Iv, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.bytes()));
        cipher
            .encrypt(Nonce::from_slice(iv.bytes()), data)
            .map_err(|_| SecretError::Encrypt)
    }

    /// Decrypt and authenticate data produced by [`Secret::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Integrity`] if the tag does not verify. No
    /// plaintext is returned in that case.
    pub fn decrypt(&self, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.bytes()));
        cipher
            .decrypt(Nonce::from_slice(iv.bytes()), ciphertext)
            .map_err(|_| SecretError::Integrity)
    }
}

/// The 96-bit nonce a file was encrypted under
///
/// Serialized as a base64 string so it can sit in JSON file records.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Iv([u8; NONCE_SIZE]);

impl From<[u8; NONCE_SIZE]> for Iv {
    fn from(bytes: [u8; NONCE_SIZE]) -> Self {
        Iv(bytes)
    }
}

impl Iv {
    pub fn generate() -> Self {
        let mut buff = [0; NONCE_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        let buff: [u8; NONCE_SIZE] = data.try_into().map_err(|_| SecretError::InvalidLength {
            what: "nonce",
            expected: NONCE_SIZE,
            actual: data.len(),
        })?;
        Ok(buff.into())
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| SecretError::Encoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Iv {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Iv {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Iv::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Output of [`encrypt`]: what goes to the network and what must be wrapped
#[derive(Debug, Clone)]
pub struct EncryptedFile {
    pub ciphertext: Vec<u8>,
    pub secret: Secret,
    pub iv: Iv,
}

/// Encrypt a file under a freshly generated key and nonce
pub fn encrypt(data: &[u8]) -> Result<EncryptedFile, SecretError> {
    let secret = Secret::generate();
    let iv = Iv::generate();
    let ciphertext = secret.encrypt(&iv, data)?;
    tracing::debug!(
        plaintext_len = data.len(),
        ciphertext_len = ciphertext.len(),
        "file encrypted"
    );
    Ok(EncryptedFile {
        ciphertext,
        secret,
        iv,
    })
}

/// Decrypt a file; fails with [`SecretError::Integrity`] on any mismatch
pub fn decrypt(ciphertext: &[u8], secret: &Secret, iv: &Iv) -> Result<Vec<u8>, SecretError> {
    secret.decrypt(iv, ciphertext)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let data = b"hello world, this is a test message for encryption";

        let sealed = encrypt(data).unwrap();
        let decrypted = decrypt(&sealed.ciphertext, &sealed.secret, &sealed.iv).unwrap();

        assert_eq!(data.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_tampered_ciphertext_fails_integrity() {
        let data = b"radiology report";
        let mut sealed = encrypt(data).unwrap();

        sealed.ciphertext[3] ^= 0x01;

        let result = decrypt(&sealed.ciphertext, &sealed.secret, &sealed.iv);
        assert!(matches!(result, Err(SecretError::Integrity)));
    }

    #[test]
    fn test_wrong_key_or_nonce_fails_integrity() {
        let sealed = encrypt(b"lab results").unwrap();

        let wrong_key = decrypt(&sealed.ciphertext, &Secret::generate(), &sealed.iv);
        assert!(matches!(wrong_key, Err(SecretError::Integrity)));

        let wrong_iv = decrypt(&sealed.ciphertext, &sealed.secret, &Iv::generate());
        assert!(matches!(wrong_iv, Err(SecretError::Integrity)));
    }

    #[test]
    fn test_empty_data_encryption() {
        let sealed = encrypt(b"").unwrap();
        let decrypted = decrypt(&sealed.ciphertext, &sealed.secret, &sealed.iv).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_fresh_material_per_file() {
        let a = encrypt(b"same bytes").unwrap();
        let b = encrypt(b"same bytes").unwrap();
        assert_ne!(a.secret, b.secret);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_base64_transport_is_lossless() {
        let secret = Secret::generate();
        let iv = Iv::generate();

        assert_eq!(Secret::from_base64(&secret.to_base64()).unwrap(), secret);
        assert_eq!(Iv::from_base64(&iv.to_base64()).unwrap(), iv);

        let json = serde_json::to_string(&iv).unwrap();
        let parsed: Iv = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, iv);
    }

    #[test]
    fn test_size_validation() {
        assert!(Secret::from_slice(&[1u8; 16]).is_err());
        assert!(Secret::from_slice(&[1u8; 64]).is_err());
        assert!(Secret::from_slice(&[1u8; SECRET_SIZE]).is_ok());
        assert!(Iv::from_slice(&[0u8; 16]).is_err());
        assert!(Iv::from_slice(&[0u8; NONCE_SIZE]).is_ok());
    }
}
