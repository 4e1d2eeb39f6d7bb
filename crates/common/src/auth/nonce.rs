use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::wallet::Address;

/// Random bytes per challenge before hex encoding
pub const NONCE_SIZE: usize = 16;

pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
    hex::encode(bytes)
}

/// At most one outstanding nonce per address
#[async_trait]
pub trait NonceStore: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send;

    /// Store `nonce` for `address`, replacing any previous one
    ///
    /// Every nonce that has already expired, for any address, is dropped in
    /// the same call, so unanswered challenges do not accumulate.
    async fn upsert_nonce(
        &self,
        address: &Address,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Self::Error>;

    /// The outstanding nonce for `address`, if any and not expired at `now`
    async fn nonce(&self, address: &Address, now: DateTime<Utc>)
        -> Result<Option<String>, Self::Error>;

    /// Delete the nonce only if it is still `nonce`
    ///
    /// # Returns
    /// * `Ok(true)` - this caller consumed it
    /// * `Ok(false)` - it was already consumed or replaced
    async fn consume_nonce(&self, address: &Address, nonce: &str) -> Result<bool, Self::Error>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryNonceStore {
    inner: Arc<RwLock<HashMap<Address, (String, DateTime<Utc>)>>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryNonceStoreError {
    #[error("memory nonce store error: {0}")]
    Internal(String),
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(e: impl Display) -> MemoryNonceStoreError {
    MemoryNonceStoreError::Internal(format!("failed to acquire lock: {}", e))
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    type Error = MemoryNonceStoreError;

    async fn upsert_nonce(
        &self,
        address: &Address,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Self::Error> {
        let now = Utc::now();
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.retain(|_, (_, expires)| *expires > now);
        inner.insert(address.clone(), (nonce.to_string(), expires_at));
        Ok(())
    }

    async fn nonce(
        &self,
        address: &Address,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, Self::Error> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .get(address)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(nonce, _)| nonce.clone()))
    }

    async fn consume_nonce(&self, address: &Address, nonce: &str) -> Result<bool, Self::Error> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        match inner.get(address) {
            Some((current, _)) if current == nonce => {
                inner.remove(address);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wallet::Wallet;
    use chrono::Duration;

    #[test]
    fn test_nonce_is_16_bytes_hex() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_SIZE * 2);
        assert!(hex::decode(&nonce).is_ok());
        assert_ne!(nonce, generate_nonce());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_expiry_hides() {
        let store = MemoryNonceStore::new();
        let address = Wallet::generate().address().clone();
        let now = Utc::now();

        store
            .upsert_nonce(&address, "first", now + Duration::minutes(5))
            .await
            .unwrap();
        store
            .upsert_nonce(&address, "second", now + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(
            store.nonce(&address, now).await.unwrap().as_deref(),
            Some("second")
        );
        assert!(store
            .nonce(&address, now + Duration::minutes(6))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_drops_expired_entries() {
        let store = MemoryNonceStore::new();
        let past = Utc::now() - Duration::seconds(1);
        for _ in 0..20 {
            let address = Wallet::generate().address().clone();
            store.upsert_nonce(&address, "unanswered", past).await.unwrap();
        }

        let fresh = Wallet::generate().address().clone();
        store
            .upsert_nonce(&fresh, "fresh", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();

        let inner = store.inner.read().unwrap();
        assert_eq!(inner.len(), 1);
        assert!(inner.contains_key(&fresh));
    }

    #[tokio::test]
    async fn test_consume_is_compare_and_delete() {
        let store = MemoryNonceStore::new();
        let address = Wallet::generate().address().clone();
        store
            .upsert_nonce(&address, "abc", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();

        assert!(!store.consume_nonce(&address, "stale").await.unwrap());
        assert!(store.consume_nonce(&address, "abc").await.unwrap());
        assert!(!store.consume_nonce(&address, "abc").await.unwrap());
    }
}
