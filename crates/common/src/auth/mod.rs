//! Wallet-signature authentication
//!
//! A client proves control of a wallet by signing a one-time nonce with
//! `personal_sign`. A successful proof consumes the nonce and yields a
//! short-lived bearer token that gates mutation of the metadata store.
//!
//! ```text
//! NoChallenge --request_challenge--> Issued --verify--> Consumed
//!                                      |
//!                                      +--(ttl elapsed)--> NoChallenge
//! ```

mod authenticator;
mod nonce;
mod session;

pub use authenticator::{AuthError, NonceAuthenticator, DEFAULT_NONCE_TTL_SECS};
pub use nonce::{generate_nonce, MemoryNonceStore, MemoryNonceStoreError, NonceStore, NONCE_SIZE};
pub use session::{Claims, Session, SessionIssuer, DEFAULT_SESSION_TTL_SECS};
