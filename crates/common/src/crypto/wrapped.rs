use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::keys::{PublicKey, SecretKey};
use super::passphrase::{PassphraseShare, PassphraseShareError};
use super::secret::Secret;
use super::secret_share::{SecretShare, SecretShareError};

const RECIPIENT_TAG: &str = "x25519";
const PASSPHRASE_TAG: &str = "argon2id";

#[derive(Debug, thiserror::Error)]
pub enum WrappedKeyError {
    #[error("malformed wrapped key: {0}")]
    Malformed(String),
    #[error("wrapped key is a {actual} wrap, not a {expected} wrap")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },
    #[error(transparent)]
    Share(#[from] SecretShareError),
    #[error(transparent)]
    Passphrase(#[from] PassphraseShareError),
}

/// Who a file secret is being wrapped for
#[derive(Debug, Clone, Copy)]
pub enum Recipient<'a> {
    /// A provider, via their published encryption key
    Key(&'a PublicKey),
    /// The patient, via a passphrase only they know
    Passphrase(&'a str),
}

/// A file secret wrapped for exactly one recipient
///
/// Encodes to an opaque `<scheme>:<base64>` string, which is what the metadata
/// store keeps and what travels over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrappedKey {
    Recipient(SecretShare),
    Passphrase(PassphraseShare),
}

impl WrappedKey {
    pub fn wrap(secret: &Secret, recipient: Recipient<'_>) -> Result<Self, WrappedKeyError> {
        Ok(match recipient {
            Recipient::Key(public_key) => Self::Recipient(SecretShare::new(secret, public_key)?),
            Recipient::Passphrase(passphrase) => {
                Self::Passphrase(PassphraseShare::new(secret, passphrase)?)
            }
        })
    }

    pub fn unwrap_with_key(&self, secret_key: &SecretKey) -> Result<Secret, WrappedKeyError> {
        match self {
            Self::Recipient(share) => Ok(share.recover(secret_key)?),
            Self::Passphrase(_) => Err(WrappedKeyError::WrongKind {
                expected: RECIPIENT_TAG,
                actual: PASSPHRASE_TAG,
            }),
        }
    }

    pub fn unwrap_with_passphrase(&self, passphrase: &str) -> Result<Secret, WrappedKeyError> {
        match self {
            Self::Passphrase(share) => Ok(share.recover(passphrase)?),
            Self::Recipient(_) => Err(WrappedKeyError::WrongKind {
                expected: PASSPHRASE_TAG,
                actual: RECIPIENT_TAG,
            }),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Recipient(_) => RECIPIENT_TAG,
            Self::Passphrase(_) => PASSPHRASE_TAG,
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            Self::Recipient(share) => share.bytes(),
            Self::Passphrase(share) => share.bytes(),
        }
    }
}

impl fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag(), BASE64.encode(self.bytes()))
    }
}

impl FromStr for WrappedKey {
    type Err = WrappedKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, body) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| WrappedKeyError::Malformed("missing scheme prefix".into()))?;
        let bytes = BASE64
            .decode(body)
            .map_err(|e| WrappedKeyError::Malformed(e.to_string()))?;
        match tag {
            RECIPIENT_TAG => Ok(Self::Recipient(SecretShare::try_from(bytes.as_slice())?)),
            PASSPHRASE_TAG => Ok(Self::Passphrase(PassphraseShare::try_from(
                bytes.as_slice(),
            )?)),
            other => Err(WrappedKeyError::Malformed(format!(
                "unknown scheme {other}"
            ))),
        }
    }
}

impl Serialize for WrappedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_recipient_wrap_roundtrip_through_string() {
        let secret = Secret::generate();
        let provider = SecretKey::generate();

        let wrapped = WrappedKey::wrap(&secret, Recipient::Key(&provider.public())).unwrap();
        let encoded = wrapped.to_string();
        assert!(encoded.starts_with("x25519:"));

        let decoded: WrappedKey = encoded.parse().unwrap();
        assert_eq!(decoded.unwrap_with_key(&provider).unwrap(), secret);
    }

    #[test]
    fn test_passphrase_wrap_cannot_be_opened_with_key() {
        let secret = Secret::generate();
        let wrapped = WrappedKey::wrap(&secret, Recipient::Passphrase("patient pass")).unwrap();

        assert!(matches!(
            wrapped.unwrap_with_key(&SecretKey::generate()),
            Err(WrappedKeyError::WrongKind { .. })
        ));
        assert_eq!(wrapped.unwrap_with_passphrase("patient pass").unwrap(), secret);
    }

    #[test]
    fn test_malformed_strings_rejected() {
        assert!("no-prefix".parse::<WrappedKey>().is_err());
        assert!("x25519:!!!".parse::<WrappedKey>().is_err());
        assert!("rsa:AAAA".parse::<WrappedKey>().is_err());
        assert!("x25519:AAAA".parse::<WrappedKey>().is_err());
    }
}
