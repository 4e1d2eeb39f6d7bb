//! Wallet addresses and `personal_sign` signatures
//!
//! Identity in MedVault is an Ethereum-style wallet. Addresses compare
//! case-insensitively everywhere, so [`Address`] stores the lowercase form and
//! every comparison goes through it.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

pub const ADDRESS_SIZE: usize = 20;
pub const SIGNATURE_SIZE: usize = 65;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("signature does not recover to a public key")]
    Recovery,
    #[error("invalid wallet key: {0}")]
    InvalidKey(String),
}

/// A 20-byte account address in canonical `0x`-prefixed lowercase hex
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = WalletError;

    /// Accepts any casing, with or without checksum, but requires the `0x`
    /// prefix and exactly 40 hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| WalletError::InvalidAddress(s.to_string()))?;
        if digits.len() != ADDRESS_SIZE * 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletError::InvalidAddress(s.to_string()));
        }
        Ok(Address(format!("0x{}", digits.to_ascii_lowercase())))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// The digest `personal_sign` actually signs:
/// `keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)`
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // skip the 0x04 uncompressed tag
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; ADDRESS_SIZE];
    bytes.copy_from_slice(&digest[12..]);
    Address::from_bytes(bytes)
}

/// Recover the address that produced a `personal_sign` signature over `message`
///
/// The signature is the usual 65-byte `r || s || v` hex string; `v` may be
/// `0/1` or `27/28`.
pub fn recover_personal_sign(message: &str, signature: &str) -> Result<Address, WalletError> {
    let hex_sig = signature.trim();
    let hex_sig = hex_sig.strip_prefix("0x").unwrap_or(hex_sig);
    let raw = hex::decode(hex_sig).map_err(|e| WalletError::MalformedSignature(e.to_string()))?;
    if raw.len() != SIGNATURE_SIZE {
        return Err(WalletError::MalformedSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_SIZE,
            raw.len()
        )));
    }

    let v = match raw[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        v => {
            return Err(WalletError::MalformedSignature(format!(
                "invalid recovery byte {v}"
            )))
        }
    };
    let mut recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| WalletError::MalformedSignature(format!("invalid recovery byte {v}")))?;
    let mut sig = Signature::from_slice(&raw[..64])
        .map_err(|e| WalletError::MalformedSignature(e.to_string()))?;
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let prehash = personal_message_hash(message.as_bytes());
    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|_| WalletError::Recovery)?;
    Ok(address_of(&key))
}

/// A secp256k1 signing key standing in for a user's wallet
///
/// Used by clients to answer authentication challenges and to sign consent
/// transactions against a ledger.
#[derive(Clone)]
pub struct Wallet {
    key: SigningKey,
    address: Address,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish()
    }
}

impl Wallet {
    pub fn generate() -> Self {
        loop {
            let mut bytes = [0u8; 32];
            getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
            // out-of-range scalars are astronomically rare, just draw again
            if let Ok(wallet) = Self::from_bytes(&bytes) {
                return wallet;
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let key =
            SigningKey::from_slice(bytes).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, WalletError> {
        let hex_key = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = hex::decode(hex_key).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Produce a `personal_sign` signature as `0x`-prefixed hex with `v` in 27/28
    pub fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        let prehash = personal_message_hash(message.as_bytes());
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let mut out = Vec::with_capacity(SIGNATURE_SIZE);
        out.extend_from_slice(&sig.to_bytes());
        out.push(recovery_id.to_byte() + 27);
        Ok(format!("0x{}", hex::encode(out)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Well-known development key (Hardhat/Anvil account #0)
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_known_key_derives_known_address() {
        let wallet = Wallet::from_hex(DEV_KEY).unwrap();
        assert_eq!(wallet.address(), &DEV_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(
            wallet.address().as_str(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_sign_and_recover() {
        let wallet = Wallet::generate();
        let signature = wallet.sign_message("a1b2c3d4").unwrap();
        let recovered = recover_personal_sign("a1b2c3d4", &signature).unwrap();
        assert_eq!(&recovered, wallet.address());
    }

    #[test]
    fn test_recover_accepts_raw_recovery_byte() {
        let wallet = Wallet::generate();
        let signature = wallet.sign_message("nonce").unwrap();
        let mut raw = hex::decode(signature.trim_start_matches("0x")).unwrap();
        raw[64] -= 27;
        let recovered = recover_personal_sign("nonce", &hex::encode(raw)).unwrap();
        assert_eq!(&recovered, wallet.address());
    }

    #[test]
    fn test_signature_over_other_message_recovers_other_address() {
        let wallet = Wallet::generate();
        let signature = wallet.sign_message("first").unwrap();
        let recovered = recover_personal_sign("second", &signature).unwrap();
        assert_ne!(&recovered, wallet.address());
    }

    #[test]
    fn test_malformed_signatures() {
        assert!(matches!(
            recover_personal_sign("m", "0x1234"),
            Err(WalletError::MalformedSignature(_))
        ));
        assert!(matches!(
            recover_personal_sign("m", "zz"),
            Err(WalletError::MalformedSignature(_))
        ));
        let bad_v = format!("0x{}{}", "11".repeat(64), "05");
        assert!(matches!(
            recover_personal_sign("m", &bad_v),
            Err(WalletError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_address_normalization() {
        let upper: Address = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01".parse().unwrap();
        let lower: Address = "0xabcdef0123456789abcdef0123456789abcdef01".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), lower.as_str());

        assert!("0xABC".parse::<Address>().is_err());
        assert!("abcdef0123456789abcdef0123456789abcdef01".parse::<Address>().is_err());
        assert!("0xgggggg0123456789abcdef0123456789abcdef01".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_serde_normalizes() {
        let parsed: Address =
            serde_json::from_str("\"0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266\"").unwrap();
        assert_eq!(
            serde_json::to_string(&parsed).unwrap(),
            "\"0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266\""
        );
    }
}
