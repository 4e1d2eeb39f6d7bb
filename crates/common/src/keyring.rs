//! Per-file, per-recipient wrapped keys on top of a [`MetadataStore`]
//!
//! The file secret itself is never persisted. What the store holds is one
//! [`WrappedKey`] for the patient plus at most one per provider, keyed by the
//! provider's normalized address.
//!
//! Revoking removes entries so that a provider cannot obtain the key again
//! from the store. It does not rotate the file key or re-encrypt content.

use chrono::Utc;

use crate::crypto::{PublicKey, Recipient, Secret, WrappedKey, WrappedKeyError};
use crate::records::{FileId, FileRecord, NewFile, Provider};
use crate::store::{MetadataStore, StoreError};
use crate::wallet::Address;

#[derive(Debug, thiserror::Error)]
pub enum KeyringError<E> {
    #[error(transparent)]
    Store(#[from] StoreError<E>),
    #[error("provider {0} has not published an encryption key")]
    EncryptionKeyUnavailable(Address),
    #[error("failed to wrap key: {0}")]
    Wrap(#[from] WrappedKeyError),
}

/// Wrap a file secret for a single recipient
pub fn wrap_for_recipient(
    secret: &Secret,
    recipient: Recipient<'_>,
) -> Result<WrappedKey, WrappedKeyError> {
    WrappedKey::wrap(secret, recipient)
}

/// The wrapped key a recipient can open, if one exists
///
/// `None` means the file has to be re-wrapped for them, not that anything is
/// corrupt. The patient's own copy lives in `encrypted_key_for_patient`.
pub fn resolve_for_recipient<'a>(
    file: &'a FileRecord,
    recipient: &Address,
) -> Option<&'a WrappedKey> {
    file.wrapped_keys.get(recipient)
}

#[derive(Debug, Clone)]
pub struct KeyWrapStore<S> {
    store: S,
}

impl<S: MetadataStore> KeyWrapStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a newly uploaded file along with its initial wraps
    ///
    /// Fails with `NotFound` for an unknown patient and `Conflict` when the
    /// patient already has a file at this content address.
    pub async fn register_file(&self, file: NewFile) -> Result<FileRecord, KeyringError<S::Error>> {
        if self.store.patient(&file.patient_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("patient {}", file.patient_id)).into());
        }

        let record = FileRecord::from_new(file, Utc::now());
        let record = self.store.insert_file(record).await?;
        tracing::info!(
            cid = %record.cid,
            patient_id = %record.patient_id,
            wraps = record.wrapped_keys.len(),
            "registered file"
        );
        Ok(record)
    }

    /// Insert or replace the provider's wrapped key for a file
    pub async fn store_wrapped_key(
        &self,
        id: &FileId,
        provider: &Address,
        wrapped: WrappedKey,
    ) -> Result<(), KeyringError<S::Error>> {
        self.store.upsert_wrapped_key(id, provider, wrapped).await?;
        tracing::info!(file = %id, %provider, "stored wrapped key");
        Ok(())
    }

    /// Wrap `secret` to the provider's published key and store it
    pub async fn wrap_for_provider(
        &self,
        id: &FileId,
        provider: &Address,
        secret: &Secret,
    ) -> Result<WrappedKey, KeyringError<S::Error>> {
        let public_key = self.provider_key(provider).await?;
        let wrapped = wrap_for_recipient(secret, Recipient::Key(&public_key))?;
        self.store_wrapped_key(id, provider, wrapped).await?;
        Ok(wrapped)
    }

    /// Remove every key the provider holds on the patient's files
    pub async fn revoke(
        &self,
        patient_id: &str,
        provider: &Address,
    ) -> Result<usize, KeyringError<S::Error>> {
        let removed = self.store.remove_wrapped_keys(patient_id, provider).await?;
        tracing::info!(%patient_id, %provider, removed, "revoked wrapped keys");
        Ok(removed)
    }

    /// Look up a file and the wrapped key `recipient` holds on it
    pub async fn resolve(
        &self,
        id: &FileId,
        recipient: &Address,
    ) -> Result<Option<WrappedKey>, KeyringError<S::Error>> {
        let file = self
            .store
            .file(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("file {id}")))?;
        Ok(resolve_for_recipient(&file, recipient).copied())
    }

    pub async fn publish_encryption_key(
        &self,
        provider: &Address,
        key: PublicKey,
    ) -> Result<Provider, KeyringError<S::Error>> {
        let provider = self.store.publish_encryption_key(provider, key).await?;
        tracing::info!(provider = %provider.wallet_address, "published encryption key");
        Ok(provider)
    }

    async fn provider_key(&self, provider: &Address) -> Result<PublicKey, KeyringError<S::Error>> {
        let record = self
            .store
            .provider(provider)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("provider {provider}")))?;
        record
            .encryption_public_key
            .ok_or_else(|| KeyringError::EncryptionKeyUnavailable(provider.clone()))
    }
}
