use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::provider::{MetadataStore, StoreError};
use crate::crypto::{PublicKey, WrappedKey};
use crate::records::{
    AccessRequest, AccessRequestKey, AccessRequestStatus, FileId, FileRecord, Patient, Provider,
};
use crate::wallet::Address;

/// In-memory metadata store using maps behind a lock
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    inner: Arc<RwLock<MemoryMetadataStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryMetadataStoreInner {
    /// patient_id -> patient
    patients: HashMap<String, Patient>,
    /// Index for the wallet uniqueness check: wallet -> patient_id
    patient_wallets: HashMap<Address, String>,
    providers: HashMap<Address, Provider>,
    files: BTreeMap<FileId, FileRecord>,
    requests: BTreeMap<AccessRequestKey, AccessRequest>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryMetadataStoreError {
    #[error("memory store error: {0}")]
    Internal(String),
}

type Result<T> = std::result::Result<T, StoreError<MemoryMetadataStoreError>>;

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryMetadataStoreInner>> {
        self.inner.read().map_err(|e| {
            StoreError::Provider(MemoryMetadataStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryMetadataStoreInner>> {
        self.inner.write().map_err(|e| {
            StoreError::Provider(MemoryMetadataStoreError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })
    }
}

fn newest_first<T>(mut items: Vec<T>, at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(at(item)));
    items
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    type Error = MemoryMetadataStoreError;

    async fn register_patient(&self, patient: Patient) -> Result<Patient> {
        let mut inner = self.write()?;

        if inner.patients.contains_key(&patient.patient_id)
            || inner.patient_wallets.contains_key(&patient.wallet_address)
        {
            return Err(StoreError::Conflict(
                "patient already registered with this wallet or patient id".into(),
            ));
        }

        inner
            .patient_wallets
            .insert(patient.wallet_address.clone(), patient.patient_id.clone());
        inner
            .patients
            .insert(patient.patient_id.clone(), patient.clone());
        Ok(patient)
    }

    async fn patient(&self, patient_id: &str) -> Result<Option<Patient>> {
        Ok(self.read()?.patients.get(patient_id).cloned())
    }

    async fn patient_by_wallet(&self, wallet: &Address) -> Result<Option<Patient>> {
        let inner = self.read()?;
        Ok(inner
            .patient_wallets
            .get(wallet)
            .and_then(|id| inner.patients.get(id))
            .cloned())
    }

    async fn register_provider(&self, provider: Provider) -> Result<Provider> {
        let mut inner = self.write()?;

        if inner.providers.contains_key(&provider.wallet_address) {
            return Err(StoreError::Conflict(
                "provider already registered with this wallet".into(),
            ));
        }

        inner
            .providers
            .insert(provider.wallet_address.clone(), provider.clone());
        Ok(provider)
    }

    async fn provider(&self, wallet: &Address) -> Result<Option<Provider>> {
        Ok(self.read()?.providers.get(wallet).cloned())
    }

    async fn publish_encryption_key(&self, wallet: &Address, key: PublicKey) -> Result<Provider> {
        let mut inner = self.write()?;
        let provider = inner
            .providers
            .get_mut(wallet)
            .ok_or_else(|| StoreError::NotFound(format!("provider {wallet}")))?;
        provider.encryption_public_key = Some(key);
        Ok(provider.clone())
    }

    async fn insert_file(&self, file: FileRecord) -> Result<FileRecord> {
        let mut inner = self.write()?;
        let id = file.id();

        if inner.files.contains_key(&id) {
            return Err(StoreError::Conflict(format!(
                "file {} already registered for patient {}",
                id.cid, id.patient_id
            )));
        }

        inner.files.insert(id, file.clone());
        Ok(file)
    }

    async fn file(&self, id: &FileId) -> Result<Option<FileRecord>> {
        Ok(self.read()?.files.get(id).cloned())
    }

    async fn files_for_patient(&self, patient_id: &str) -> Result<Vec<FileRecord>> {
        let files = self
            .read()?
            .files
            .values()
            .filter(|file| file.patient_id == patient_id)
            .cloned()
            .collect();
        Ok(newest_first(files, |file| file.uploaded_at))
    }

    async fn upsert_wrapped_key(
        &self,
        id: &FileId,
        provider: &Address,
        key: WrappedKey,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let file = inner
            .files
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("file {id}")))?;
        file.wrapped_keys.insert(provider.clone(), key);
        Ok(())
    }

    async fn remove_wrapped_keys(&self, patient_id: &str, provider: &Address) -> Result<usize> {
        let mut inner = self.write()?;
        let removed = inner
            .files
            .values_mut()
            .filter(|file| file.patient_id == patient_id)
            .filter_map(|file| file.wrapped_keys.remove(provider))
            .count();
        Ok(removed)
    }

    async fn create_access_request(&self, request: AccessRequest) -> Result<AccessRequest> {
        let mut inner = self.write()?;
        let key = request.key();

        if inner.requests.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "access request {key} already exists"
            )));
        }

        inner.requests.insert(key, request.clone());
        Ok(request)
    }

    async fn access_request(&self, key: &AccessRequestKey) -> Result<Option<AccessRequest>> {
        Ok(self.read()?.requests.get(key).cloned())
    }

    async fn decide_access_request(
        &self,
        key: &AccessRequestKey,
        status: AccessRequestStatus,
    ) -> Result<AccessRequest> {
        if !status.is_terminal() {
            return Err(StoreError::Invalid(format!(
                "cannot move an access request to {}",
                status.as_str()
            )));
        }

        let mut inner = self.write()?;
        let request = inner
            .requests
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("access request {key}")))?;

        if request.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "access request {key} was already {}",
                request.status.as_str()
            )));
        }

        request.status = status;
        Ok(request.clone())
    }

    async fn pending_requests_for_patient(&self, patient_id: &str) -> Result<Vec<AccessRequest>> {
        let requests = self
            .read()?
            .requests
            .values()
            .filter(|r| r.patient_id == patient_id && r.status == AccessRequestStatus::Pending)
            .cloned()
            .collect();
        Ok(newest_first(requests, |r| r.created_at))
    }

    async fn requests_for_provider(&self, wallet: &Address) -> Result<Vec<AccessRequest>> {
        let requests = self
            .read()?
            .requests
            .values()
            .filter(|r| &r.provider_wallet == wallet)
            .cloned()
            .collect();
        Ok(newest_first(requests, |r| r.created_at))
    }
}
