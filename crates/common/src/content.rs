//! Content addressing for ciphertext published to the network

use std::fmt::{Debug, Display};

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use multihash::Multihash;
use sha2::{Digest, Sha256};

/// Multicodec for raw binary content
pub const RAW_CODEC: u64 = 0x55;
/// Multihash code for sha2-256
pub const SHA2_256: u64 = 0x12;

/// The CIDv1 (raw, sha2-256) of `data`, as its canonical base32 string
pub fn content_address(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    // a 32-byte digest always fits the 64-byte multihash
    let hash = Multihash::<64>::wrap(SHA2_256, &digest).expect("sha2-256 digest fits in multihash");
    Cid::new_v1(RAW_CODEC, hash).to_string()
}

/// Write side of the content network
#[async_trait]
pub trait ContentPublisher: Send + Sync + Debug {
    type Error: Display + Debug + Send;

    /// Store `data` and return the content address it can be fetched by
    async fn publish(&self, data: Bytes) -> Result<String, Self::Error>;
}
