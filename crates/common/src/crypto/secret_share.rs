//! Wrapping a file key to a provider using ECDH + AES Key Wrap
//!
//! It combines X25519 Diffie-Hellman for key agreement with AES Key Wrap
//! (RFC 3394) for key encryption.
//!
//! # Protocol Overview
//!
//! To share a file secret with a provider:
//! 1. **Generate ephemeral keypair**: Create a throwaway X25519 keypair
//! 2. **Perform ECDH**: Agree on a shared point with the provider's published key
//! 3. **Derive KEK**: Hash the shared point together with both public keys
//! 4. **Wrap key**: Use AES-KW to encrypt the file secret under the KEK
//! 5. **Package**: `ephemeral_pubkey || wrapped_secret`
//!
//! The provider recovers the secret by repeating the agreement with their
//! private key and the ephemeral public key carried in the share.
//!
//! # Security Properties
//!
//! - **Recipient-bound**: only the holder of the matching private key can unwrap
//! - **Integrity**: AES-KW detects a wrong key or a corrupted share

use std::convert::TryFrom;

use aes_kw::KekAes256 as Kek;
use sha2::{Digest, Sha256};

use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError, SECRET_SIZE};

/// Size of AES Key Wrap integrity block in bytes
pub const KW_NONCE_SIZE: usize = 8;
/// Total size of a share in bytes
///
/// Layout: ephemeral_pubkey (32) || wrapped_secret (40) = 72 bytes
pub const SECRET_SHARE_SIZE: usize = PUBLIC_KEY_SIZE + SECRET_SIZE + KW_NONCE_SIZE;

const KDF_DOMAIN: &[u8] = b"medvault/x25519-aeskw/v1";

/// Errors that can occur during share creation or recovery
#[derive(Debug, thiserror::Error)]
pub enum SecretShareError {
    #[error("invalid share size, expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("share hex decode error")]
    Hex,
    #[error("AES-KW wrap error")]
    Wrap,
    #[error("AES-KW unwrap error: share was made for a different key or is corrupted")]
    Unwrap,
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// A file secret wrapped for one specific recipient
///
/// # Wire Format
///
/// ```text
/// [ ephemeral_pubkey: 32 bytes ][ wrapped_secret: 40 bytes ]
/// ```
///
/// # Examples
///
/// ```ignore
/// let file_secret = Secret::generate();
/// let share = SecretShare::new(&file_secret, &provider_public_key)?;
///
/// let recovered = share.recover(&provider_secret_key)?;
/// assert_eq!(file_secret, recovered);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SecretShare(pub(crate) [u8; SECRET_SHARE_SIZE]);

impl Default for SecretShare {
    fn default() -> Self {
        SecretShare([0; SECRET_SHARE_SIZE])
    }
}

impl From<[u8; SECRET_SHARE_SIZE]> for SecretShare {
    fn from(bytes: [u8; SECRET_SHARE_SIZE]) -> Self {
        SecretShare(bytes)
    }
}

impl TryFrom<&[u8]> for SecretShare {
    type Error = SecretShareError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let buff: [u8; SECRET_SHARE_SIZE] =
            bytes
                .try_into()
                .map_err(|_| SecretShareError::InvalidLength {
                    expected: SECRET_SHARE_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(SecretShare(buff))
    }
}

fn derive_kek(shared: &[u8; 32], ephemeral: &PublicKey, recipient: &PublicKey) -> Kek {
    let mut hasher = Sha256::new();
    hasher.update(KDF_DOMAIN);
    hasher.update(shared);
    hasher.update(ephemeral.to_bytes());
    hasher.update(recipient.to_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Kek::from(digest)
}

impl SecretShare {
    /// Parse a share from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, SecretShareError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SECRET_SHARE_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| SecretShareError::Hex)?;
        Ok(SecretShare::from(buff))
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Wrap `secret` so that only the holder of `recipient`'s private key can
    /// recover it
    pub fn new(secret: &Secret, recipient: &PublicKey) -> Result<Self, SecretShareError> {
        let ephemeral_private = SecretKey::generate();
        let ephemeral_public = ephemeral_private.public();

        let shared = ephemeral_private
            .as_x25519()
            .diffie_hellman(&recipient.to_x25519());
        let kek = derive_kek(shared.as_bytes(), &ephemeral_public, recipient);

        let wrapped = kek
            .wrap_vec(secret.bytes())
            .map_err(|_| SecretShareError::Wrap)?;

        // sanity check we're getting `SECRET_SHARE_SIZE` bytes here
        if PUBLIC_KEY_SIZE + wrapped.len() != SECRET_SHARE_SIZE {
            return Err(SecretShareError::InvalidLength {
                expected: SECRET_SHARE_SIZE,
                actual: PUBLIC_KEY_SIZE + wrapped.len(),
            });
        };

        let mut share = SecretShare::default();
        share.0[..PUBLIC_KEY_SIZE].copy_from_slice(&ephemeral_public.to_bytes());
        share.0[PUBLIC_KEY_SIZE..].copy_from_slice(&wrapped);

        Ok(share)
    }

    /// Recover the wrapped secret using the recipient's private key
    ///
    /// # Errors
    ///
    /// Returns [`SecretShareError::Unwrap`] if the share was created for a
    /// different recipient or was tampered with.
    pub fn recover(&self, recipient_secret: &SecretKey) -> Result<Secret, SecretShareError> {
        let ephemeral_public = PublicKey::try_from(&self.0[..PUBLIC_KEY_SIZE])?;

        let shared = recipient_secret
            .as_x25519()
            .diffie_hellman(&ephemeral_public.to_x25519());
        let kek = derive_kek(
            shared.as_bytes(),
            &ephemeral_public,
            &recipient_secret.public(),
        );

        let unwrapped = kek
            .unwrap_vec(&self.0[PUBLIC_KEY_SIZE..])
            .map_err(|_| SecretShareError::Unwrap)?;

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
    fn test_share_secret() {
        let secret = Secret::from_slice(&[42u8; SECRET_SIZE]).unwrap();
        let private_key = SecretKey::generate();
        let public_key = private_key.public();
        let share = SecretShare::new(&secret, &public_key).unwrap();
        let recovered_secret = share.recover(&private_key).unwrap();
        assert_eq!(secret, recovered_secret);
    }

    #[test]
    fn test_share_different_keys() {
        let secret = Secret::generate();
        let alice_private = SecretKey::generate();
        let bob_private = SecretKey::generate();

        let share = SecretShare::new(&secret, &alice_private.public()).unwrap();
        assert_eq!(share.recover(&alice_private).unwrap(), secret);

        let result = share.recover(&bob_private);
        assert!(matches!(result, Err(SecretShareError::Unwrap)));
    }

    #[test]
    fn test_share_hex_roundtrip() {
        let secret = Secret::generate();
        let private_key = SecretKey::generate();
        let share = SecretShare::new(&secret, &private_key.public()).unwrap();

        let recovered_share = SecretShare::from_hex(&share.to_hex()).unwrap();
        assert_eq!(share, recovered_share);
        assert_eq!(recovered_share.recover(&private_key).unwrap(), secret);
    }

    #[test]
    fn test_tampered_share_fails() {
        let private_key = SecretKey::generate();
        let share = SecretShare::new(&Secret::generate(), &private_key.public()).unwrap();

        let mut bytes = share.0;
        bytes[SECRET_SHARE_SIZE - 1] ^= 0xff;
        let tampered = SecretShare::from(bytes);

        assert!(tampered.recover(&private_key).is_err());
    }

    #[test]
    fn test_share_invalid_length() {
        let short = [0u8; 10];
        assert!(matches!(
            SecretShare::try_from(short.as_slice()),
            Err(SecretShareError::InvalidLength { actual: 10, .. })
        ));
    }
}
