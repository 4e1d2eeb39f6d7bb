/**
 * Authentication by wallet signature.
 *  - One-time nonce challenges
 *  - Bearer session tokens
 */
pub mod auth;
/**
 * Content addressing for ciphertext on the network.
 */
pub mod content;
/**
 * Cryptographic types and operations.
 *  - Per-file envelope encryption
 *  - Recipient keys and key wrapping
 */
pub mod crypto;
/**
 * Client-side upload and download flows.
 *  Plaintext and unwrapped keys never leave here.
 */
pub mod exchange;
/**
 * Retrieval of content from a list of gateways,
 *  with failover and a sticky preference.
 */
pub mod fetcher;
/**
 * Per-recipient wrapped keys over the metadata store.
 */
pub mod keyring;
/**
 * Consent ledger interface, an in-memory ledger,
 *  and reconciliation of ledger state into a status.
 */
pub mod ledger;
/**
 * Off-chain metadata records.
 */
pub mod records;
/**
 * Metadata store interface and in-memory implementation.
 */
pub mod store;
/**
 * Fakes for the content network, for tests and local runs.
 */
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;
/**
 * Wallet addresses and Ethereum signed messages.
 */
pub mod wallet;

pub mod prelude {
    pub use crate::auth::{
        AuthError, Claims, NonceAuthenticator, NonceStore, Session, SessionIssuer,
    };
    pub use crate::crypto::{Iv, PublicKey, Secret, SecretKey, WrappedKey};
    pub use crate::fetcher::{FetchError, GatewayFetcher, GatewayTransport};
    pub use crate::keyring::{KeyWrapStore, KeyringError};
    pub use crate::ledger::{ConsentLedger, ConsentReconciler, ConsentStatus, Resolution};
    pub use crate::records::{
        AccessRequest, AccessRequestStatus, FileId, FileRecord, Patient, Provider,
    };
    pub use crate::store::{MetadataStore, StoreError};
    pub use crate::version::build_info;
    pub use crate::wallet::{Address, Wallet};
}
