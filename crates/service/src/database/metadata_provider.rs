use async_trait::async_trait;

use common::crypto::{PublicKey, WrappedKey};
use common::records::{
    AccessRequest, AccessRequestKey, AccessRequestStatus, FileId, FileRecord, Patient, Provider,
};
use common::store::{MetadataStore, StoreError};
use common::wallet::Address;

use crate::database::models::{
    AccessRequestRow, Decision, FileRow, PatientRow, ProviderRow, WrappedKeyRow,
};
use crate::database::Database;

type Result<T> = std::result::Result<T, StoreError<sqlx::Error>>;

/// Unique and primary key violations become conflicts, everything else is
///  passed through untouched
fn conflict_on_unique(
    message: impl FnOnce() -> String,
) -> impl FnOnce(sqlx::Error) -> StoreError<sqlx::Error> {
    move |e| match e {
        sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
            StoreError::Conflict(message())
        }
        _ => StoreError::Provider(e),
    }
}

#[async_trait]
impl MetadataStore for Database {
    type Error = sqlx::Error;

    async fn register_patient(&self, patient: Patient) -> Result<Patient> {
        PatientRow::insert(&patient, self)
            .await
            .map_err(conflict_on_unique(|| {
                "patient already registered with this wallet or patient id".into()
            }))?;
        Ok(patient)
    }

    async fn patient(&self, patient_id: &str) -> Result<Option<Patient>> {
        Ok(PatientRow::get(patient_id, self).await?)
    }

    async fn patient_by_wallet(&self, wallet: &Address) -> Result<Option<Patient>> {
        Ok(PatientRow::get_by_wallet(wallet, self).await?)
    }

    async fn register_provider(&self, provider: Provider) -> Result<Provider> {
        ProviderRow::insert(&provider, self)
            .await
            .map_err(conflict_on_unique(|| {
                "provider already registered with this wallet".into()
            }))?;
        Ok(provider)
    }

    async fn provider(&self, wallet: &Address) -> Result<Option<Provider>> {
        Ok(ProviderRow::get(wallet, self).await?)
    }

    async fn publish_encryption_key(&self, wallet: &Address, key: PublicKey) -> Result<Provider> {
        if !ProviderRow::set_encryption_key(wallet, &key, self).await? {
            return Err(StoreError::NotFound(format!("provider {wallet}")));
        }
        ProviderRow::get(wallet, self)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("provider {wallet}")))
    }

    async fn insert_file(&self, file: FileRecord) -> Result<FileRecord> {
        let id = file.id();
        FileRow::insert(&file, self)
            .await
            .map_err(conflict_on_unique(|| {
                format!(
                    "file {} already registered for patient {}",
                    id.cid, id.patient_id
                )
            }))?;
        Ok(file)
    }

    async fn file(&self, id: &FileId) -> Result<Option<FileRecord>> {
        Ok(FileRow::get(id, self).await?)
    }

    async fn files_for_patient(&self, patient_id: &str) -> Result<Vec<FileRecord>> {
        Ok(FileRow::list_for_patient(patient_id, self).await?)
    }

    async fn upsert_wrapped_key(
        &self,
        id: &FileId,
        provider: &Address,
        key: WrappedKey,
    ) -> Result<()> {
        WrappedKeyRow::upsert(id, provider, key, self)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => StoreError::NotFound(format!("file {id}")),
                _ => StoreError::Provider(e),
            })
    }

    async fn remove_wrapped_keys(&self, patient_id: &str, provider: &Address) -> Result<usize> {
        let removed = WrappedKeyRow::remove_for_provider(patient_id, provider, self).await?;
        Ok(removed as usize)
    }

    async fn create_access_request(&self, request: AccessRequest) -> Result<AccessRequest> {
        let key = request.key();
        AccessRequestRow::insert(&request, self)
            .await
            .map_err(conflict_on_unique(|| {
                format!("access request {key} already exists")
            }))?;
        Ok(request)
    }

    async fn access_request(&self, key: &AccessRequestKey) -> Result<Option<AccessRequest>> {
        Ok(AccessRequestRow::get(key, self).await?)
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

        match AccessRequestRow::decide(key, status, self).await? {
            Decision::Decided(request) => Ok(request),
            Decision::Missing => Err(StoreError::NotFound(format!("access request {key}"))),
            Decision::AlreadyDecided(current) => Err(StoreError::Conflict(format!(
                "access request {key} was already {}",
                current.as_str()
            ))),
        }
    }

    async fn pending_requests_for_patient(&self, patient_id: &str) -> Result<Vec<AccessRequest>> {
        Ok(AccessRequestRow::pending_for_patient(patient_id, self).await?)
    }

    async fn requests_for_provider(&self, wallet: &Address) -> Result<Vec<AccessRequest>> {
        Ok(AccessRequestRow::for_provider(wallet, self).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use chrono::{Duration, Utc};
    use common::crypto::{Iv, Recipient, Secret, SecretKey};
    use common::wallet::Wallet;
    use std::collections::BTreeMap;

    async fn setup() -> (Database, Patient) {
        let db = Database::in_memory().await.unwrap();
        let patient = Patient {
            wallet_address: Wallet::generate().address().clone(),
            patient_id: "P1".into(),
            name: "Ada".into(),
            created_at: Utc::now(),
        };
        db.register_patient(patient.clone()).await.unwrap();
        (db, patient)
    }

    fn file(cid: &str, uploaded_at: chrono::DateTime<Utc>) -> FileRecord {
        FileRecord {
            cid: cid.into(),
            patient_id: "P1".into(),
            file_name: format!("{cid}.pdf"),
            file_type: "application/pdf".into(),
            iv: Iv::generate(),
            encrypted_key_for_patient: WrappedKey::wrap(
                &Secret::generate(),
                Recipient::Passphrase("pw"),
            )
            .unwrap(),
            wrapped_keys: BTreeMap::new(),
            uploaded_at,
        }
    }

    #[tokio::test]
    async fn test_patient_uniqueness() {
        let (db, patient) = setup().await;

        let same_wallet = Patient {
            patient_id: "P2".into(),
            ..patient.clone()
        };
        assert!(matches!(
            db.register_patient(same_wallet).await,
            Err(StoreError::Conflict(_))
        ));

        let same_id = Patient {
            wallet_address: Wallet::generate().address().clone(),
            ..patient.clone()
        };
        assert!(matches!(
            db.register_patient(same_id).await,
            Err(StoreError::Conflict(_))
        ));

        let found = db.patient_by_wallet(&patient.wallet_address).await.unwrap();
        assert_eq!(found.unwrap().patient_id, "P1");
    }

    #[tokio::test]
    async fn test_file_round_trip_with_wraps() {
        let (db, _) = setup().await;
        let provider = Wallet::generate();
        let provider_key = SecretKey::generate();
        let secret = Secret::generate();

        let mut record = file("bafy1", Utc::now());
        record.wrapped_keys.insert(
            provider.address().clone(),
            WrappedKey::wrap(&secret, Recipient::Key(&provider_key.public())).unwrap(),
        );
        db.insert_file(record.clone()).await.unwrap();

        let stored = db.file(&record.id()).await.unwrap().unwrap();
        assert_eq!(stored.iv, record.iv);
        assert_eq!(stored.encrypted_key_for_patient, record.encrypted_key_for_patient);
        let unwrapped = stored.wrapped_keys[provider.address()]
            .unwrap_with_key(&provider_key)
            .unwrap();
        assert_eq!(unwrapped.bytes(), secret.bytes());

        assert!(matches!(
            db.insert_file(record).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_files_newest_first() {
        let (db, _) = setup().await;
        let now = Utc::now();
        db.insert_file(file("old", now - Duration::hours(2))).await.unwrap();
        db.insert_file(file("new", now)).await.unwrap();
        db.insert_file(file("mid", now - Duration::hours(1))).await.unwrap();

        let cids: Vec<_> = db
            .files_for_patient("P1")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.cid)
            .collect();
        assert_eq!(cids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_wrap_upsert_and_revoke() {
        let (db, _) = setup().await;
        let provider = Wallet::generate();
        let key = SecretKey::generate().public();
        let first = file("a", Utc::now());
        let second = file("b", Utc::now());
        db.insert_file(first.clone()).await.unwrap();
        db.insert_file(second.clone()).await.unwrap();

        let secret = Secret::generate();
        let first_wrap = WrappedKey::wrap(&secret, Recipient::Key(&key)).unwrap();
        let second_wrap = WrappedKey::wrap(&secret, Recipient::Key(&key)).unwrap();
        assert_ne!(first_wrap, second_wrap);
        for wrapped in [first_wrap, second_wrap] {
            db.upsert_wrapped_key(&first.id(), provider.address(), wrapped)
                .await
                .unwrap();
        }
        let wrapped = WrappedKey::wrap(&secret, Recipient::Key(&key)).unwrap();
        db.upsert_wrapped_key(&second.id(), provider.address(), wrapped)
            .await
            .unwrap();

        let stored = db.file(&first.id()).await.unwrap().unwrap();
        assert_eq!(stored.wrapped_keys.len(), 1);
        assert_eq!(stored.wrapped_keys[provider.address()], second_wrap);

        let missing = FileId::new("nope", "P1");
        assert!(matches!(
            db.upsert_wrapped_key(&missing, provider.address(), wrapped).await,
            Err(StoreError::NotFound(_))
        ));

        assert_eq!(db.remove_wrapped_keys("P1", provider.address()).await.unwrap(), 2);
        assert_eq!(db.remove_wrapped_keys("P1", provider.address()).await.unwrap(), 0);
        assert!(db.file(&first.id()).await.unwrap().unwrap().wrapped_keys.is_empty());
    }

    #[tokio::test]
    async fn test_access_request_decided_once() {
        let (db, _) = setup().await;
        let provider = Wallet::generate();
        let request = AccessRequest {
            cid: "bafy1".into(),
            provider_wallet: provider.address().clone(),
            patient_id: "P1".into(),
            status: AccessRequestStatus::Pending,
            created_at: Utc::now(),
        };
        let key = request.key();
        db.create_access_request(request.clone()).await.unwrap();
        assert!(matches!(
            db.create_access_request(request).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(db.pending_requests_for_patient("P1").await.unwrap().len(), 1);

        assert!(matches!(
            db.decide_access_request(&key, AccessRequestStatus::Pending).await,
            Err(StoreError::Invalid(_))
        ));
        let decided = db
            .decide_access_request(&key, AccessRequestStatus::Approved)
            .await
            .unwrap();
        assert_eq!(decided.status, AccessRequestStatus::Approved);
        assert!(matches!(
            db.decide_access_request(&key, AccessRequestStatus::Rejected).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(db.pending_requests_for_patient("P1").await.unwrap().is_empty());
        assert_eq!(
            db.requests_for_provider(provider.address()).await.unwrap()[0].status,
            AccessRequestStatus::Approved
        );

        let unknown = AccessRequestKey {
            cid: "other".into(),
            ..key
        };
        assert!(matches!(
            db.decide_access_request(&unknown, AccessRequestStatus::Approved).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
