/// In-process stand-ins for the outside world
///
/// The content network is the only collaborator without a memory
/// implementation elsewhere in the crate; the store, nonce store and ledger
/// each ship their own.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::MemoryContentNetwork;
///
/// let network = MemoryContentNetwork::new();
/// network.pin("bafy123", b"ciphertext".to_vec());
///
/// let fetcher = network.fetcher(&["gw1.test", "gw2.test"])?;
/// let bytes = fetcher.fetch("bafy123").await?;
/// ```
mod network;

pub use network::{MemoryContentNetwork, MemoryContentNetworkError};
