//! Wrapping a file key for the patient under a passphrase
//!
//! The patient has no published encryption key of their own, so their copy of
//! each file secret is wrapped under a KEK stretched from a passphrase with
//! Argon2id (default parameters) and a random per-share salt.
//!
//! # Wire Format
//!
//! ```text
//! [ salt: 16 bytes ][ wrapped_secret: 40 bytes ]
//! ```

use aes_kw::KekAes256 as Kek;
use argon2::Argon2;

use super::secret::{Secret, SecretError, SECRET_SIZE};
use super::secret_share::KW_NONCE_SIZE;

/// Size of the Argon2 salt carried in every share
pub const SALT_SIZE: usize = 16;
/// Total size of a passphrase share in bytes
pub const PASSPHRASE_SHARE_SIZE: usize = SALT_SIZE + SECRET_SIZE + KW_NONCE_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum PassphraseShareError {
    #[error("invalid passphrase share size, expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("passphrase must not be empty")]
    EmptyPassphrase,
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("AES-KW wrap error")]
    Wrap,
    #[error("AES-KW unwrap error: wrong passphrase or corrupted share")]
    Unwrap,
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PassphraseShare([u8; PASSPHRASE_SHARE_SIZE]);

impl TryFrom<&[u8]> for PassphraseShare {
    type Error = PassphraseShareError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let buff: [u8; PASSPHRASE_SHARE_SIZE] =
            bytes
                .try_into()
                .map_err(|_| PassphraseShareError::InvalidLength {
                    expected: PASSPHRASE_SHARE_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(PassphraseShare(buff))
    }
}

fn derive_kek(passphrase: &str, salt: &[u8]) -> Result<Kek, PassphraseShareError> {
    if passphrase.is_empty() {
        return Err(PassphraseShareError::EmptyPassphrase);
    }
    let mut kek = [0u8; SECRET_SIZE];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut kek)
        .map_err(|e| PassphraseShareError::Kdf(e.to_string()))?;
    Ok(Kek::from(kek))
}

impl PassphraseShare {
    pub fn new(secret: &Secret, passphrase: &str) -> Result<Self, PassphraseShareError> {
        let mut salt = [0u8; SALT_SIZE];
        getrandom::getrandom(&mut salt).map_err(SecretError::from)?;

        let wrapped = derive_kek(passphrase, &salt)?
            .wrap_vec(secret.bytes())
            .map_err(|_| PassphraseShareError::Wrap)?;

        let mut share = [0u8; PASSPHRASE_SHARE_SIZE];
        share[..SALT_SIZE].copy_from_slice(&salt);
        share[SALT_SIZE..].copy_from_slice(&wrapped);
        Ok(Self(share))
    }

    pub fn recover(&self, passphrase: &str) -> Result<Secret, PassphraseShareError> {
        let (salt, wrapped) = self.0.split_at(SALT_SIZE);
        let unwrapped = derive_kek(passphrase, salt)?
            .unwrap_vec(wrapped)
            .map_err(|_| PassphraseShareError::Unwrap)?;
        Ok(Secret::from_slice(&unwrapped)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_passphrase_roundtrip() {
        let secret = Secret::generate();
        let share = PassphraseShare::new(&secret, "correct horse battery staple").unwrap();
        assert_eq!(share.recover("correct horse battery staple").unwrap(), secret);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let share = PassphraseShare::new(&Secret::generate(), "hunter2").unwrap();
        assert!(matches!(
            share.recover("hunter3"),
            Err(PassphraseShareError::Unwrap)
        ));
    }

    #[test]
    fn test_salt_is_fresh() {
        let secret = Secret::generate();
        let a = PassphraseShare::new(&secret, "same").unwrap();
        let b = PassphraseShare::new(&secret, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(
            PassphraseShare::new(&Secret::generate(), ""),
            Err(PassphraseShareError::EmptyPassphrase)
        ));
    }
}
