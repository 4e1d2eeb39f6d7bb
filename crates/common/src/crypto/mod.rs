//! Cryptographic primitives for MedVault
//!
//! This module provides everything needed to keep a record readable only by
//! the principals a patient has chosen:
//!
//! - **Envelope Encryption**: AES-256-GCM with a fresh key and nonce per file
//! - **Recipient Keys**: X25519 keypairs published by providers
//! - **Key Wrapping**: per-recipient wrapping of a file key, either against a
//!   provider's public key (ECDH + AES-KW) or a patient passphrase
//!   (Argon2id + AES-KW)
//!
//! # Security Model
//!
//! ## File Encryption
//! Every uploaded file has its own AES-256-GCM `Secret` and `Iv`. The
//! ciphertext is what lands on the content network; the key never does.
//!
//! ## Key Wrapping
//! The file `Secret` is stored off-chain only in wrapped form:
//! 1. The patient's own copy is wrapped under a key derived from a passphrase
//!    the patient controls (`PassphraseShare`)
//! 2. Each authorized provider gets a copy wrapped to their published X25519
//!    key (`SecretShare`)
//!
//! Both forms serialize to a single opaque string (`WrappedKey`), which is the
//! only representation the metadata store ever sees.
//!
//! ## Limits
//! Revoking a wrapped key removes it from the store. It cannot make a provider
//! forget a key they already unwrapped.

mod keys;
mod passphrase;
mod secret;
mod secret_share;
mod wrapped;

pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use passphrase::{PassphraseShare, PassphraseShareError, PASSPHRASE_SHARE_SIZE, SALT_SIZE};
pub use secret::{decrypt, encrypt, EncryptedFile, Iv, Secret, SecretError, NONCE_SIZE, SECRET_SIZE};
pub use secret_share::{SecretShare, SecretShareError, SECRET_SHARE_SIZE};
pub use wrapped::{Recipient, WrappedKey, WrappedKeyError};
