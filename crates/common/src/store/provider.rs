use std::fmt::{Debug, Display};

use async_trait::async_trait;

use crate::crypto::{PublicKey, WrappedKey};
use crate::records::{
    AccessRequest, AccessRequestKey, AccessRequestStatus, FileId, FileRecord, Patient, Provider,
};
use crate::wallet::Address;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError<T> {
    #[error("unhandled metadata store error: {0}")]
    Provider(#[from] T),
    /// The addressed record does not exist
    #[error("{0} not found")]
    NotFound(String),
    /// A uniqueness constraint was violated, or a
    ///  one-shot transition was attempted twice
    #[error("{0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Off-chain metadata: identities, file records with their wrapped keys,
///  and access requests.
///
/// Addresses handed to a store are already normalized, so implementations
///  may compare them directly.
#[async_trait]
pub trait MetadataStore: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send;

    /// Register a patient
    ///
    /// Should fail with `StoreError::Conflict` if either the wallet
    ///  or the patient id is already registered
    async fn register_patient(&self, patient: Patient) -> Result<Patient, StoreError<Self::Error>>;

    async fn patient(&self, patient_id: &str) -> Result<Option<Patient>, StoreError<Self::Error>>;

    async fn patient_by_wallet(
        &self,
        wallet: &Address,
    ) -> Result<Option<Patient>, StoreError<Self::Error>>;

    /// Register a provider, failing with `StoreError::Conflict` on a taken wallet
    async fn register_provider(
        &self,
        provider: Provider,
    ) -> Result<Provider, StoreError<Self::Error>>;

    async fn provider(&self, wallet: &Address)
        -> Result<Option<Provider>, StoreError<Self::Error>>;

    /// Set or rotate the X25519 key a provider receives wrapped keys under
    async fn publish_encryption_key(
        &self,
        wallet: &Address,
        key: PublicKey,
    ) -> Result<Provider, StoreError<Self::Error>>;

    /// Insert a new file record
    ///
    /// Should fail with `StoreError::Conflict` if a record with the same
    ///  (cid, patient id) already exists
    async fn insert_file(&self, file: FileRecord) -> Result<FileRecord, StoreError<Self::Error>>;

    async fn file(&self, id: &FileId) -> Result<Option<FileRecord>, StoreError<Self::Error>>;

    /// All of a patient's files, newest upload first
    async fn files_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<FileRecord>, StoreError<Self::Error>>;

    /// Set the wrapped key for a provider on a file, replacing any previous one
    ///
    /// Should fail with `StoreError::NotFound` if the file does not exist
    async fn upsert_wrapped_key(
        &self,
        id: &FileId,
        provider: &Address,
        key: WrappedKey,
    ) -> Result<(), StoreError<Self::Error>>;

    /// Drop the provider's wrapped key from every file the patient owns
    ///
    /// # Returns
    /// * `Ok(usize)` - how many entries were removed
    async fn remove_wrapped_keys(
        &self,
        patient_id: &str,
        provider: &Address,
    ) -> Result<usize, StoreError<Self::Error>>;

    /// Should fail with `StoreError::Conflict` if a request for the same
    ///  (cid, provider, patient) already exists
    async fn create_access_request(
        &self,
        request: AccessRequest,
    ) -> Result<AccessRequest, StoreError<Self::Error>>;

    async fn access_request(
        &self,
        key: &AccessRequestKey,
    ) -> Result<Option<AccessRequest>, StoreError<Self::Error>>;

    /// Move a pending request to a terminal status
    ///
    /// Should fail with:
    /// * `StoreError::NotFound` - no request under `key`
    /// * `StoreError::Conflict` - the request was already decided
    /// * `StoreError::Invalid` - `status` is not terminal
    async fn decide_access_request(
        &self,
        key: &AccessRequestKey,
        status: AccessRequestStatus,
    ) -> Result<AccessRequest, StoreError<Self::Error>>;

    /// Pending requests against a patient, newest first
    async fn pending_requests_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<AccessRequest>, StoreError<Self::Error>>;

    /// Every request a provider has made, newest first
    async fn requests_for_provider(
        &self,
        wallet: &Address,
    ) -> Result<Vec<AccessRequest>, StoreError<Self::Error>>;
}
