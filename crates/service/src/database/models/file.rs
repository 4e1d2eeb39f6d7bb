use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};

use common::crypto::{Iv, WrappedKey};
use common::records::{FileId, FileRecord};
use common::wallet::Address;

use super::decode_error;
use crate::database::types::{DAddress, DWrappedKey};
use crate::database::Database;

#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub cid: String,
    pub patient_id: String,
    pub file_name: String,
    pub file_type: String,
    /// Base64-encoded nonce
    pub iv: String,
    pub encrypted_key_for_patient: DWrappedKey,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct WrappedKeyRow {
    pub cid: String,
    pub provider_wallet: DAddress,
    pub wrapped_key: DWrappedKey,
}

impl FileRow {
    fn into_record(
        self,
        wrapped_keys: BTreeMap<Address, WrappedKey>,
    ) -> Result<FileRecord, sqlx::Error> {
        let iv = Iv::from_base64(&self.iv).map_err(decode_error)?;
        Ok(FileRecord {
            cid: self.cid,
            patient_id: self.patient_id,
            file_name: self.file_name,
            file_type: self.file_type,
            iv,
            encrypted_key_for_patient: self.encrypted_key_for_patient.into(),
            wrapped_keys,
            uploaded_at: self.uploaded_at,
        })
    }

    /// Insert the file and its initial wraps in one transaction
    pub async fn insert(file: &FileRecord, db: &Database) -> Result<(), sqlx::Error> {
        let mut tx = db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO files (
                cid, patient_id, file_name, file_type, iv,
                encrypted_key_for_patient, uploaded_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&file.cid)
        .bind(&file.patient_id)
        .bind(&file.file_name)
        .bind(&file.file_type)
        .bind(file.iv.to_base64())
        .bind(DWrappedKey::from(file.encrypted_key_for_patient))
        .bind(file.uploaded_at)
        .execute(&mut *tx)
        .await?;

        for (provider, key) in &file.wrapped_keys {
            upsert_wrapped_key(&mut tx, &file.id(), provider, *key).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(id: &FileId, db: &Database) -> Result<Option<FileRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT
                cid, patient_id, file_name, file_type, iv,
                encrypted_key_for_patient, uploaded_at
            FROM files
            WHERE cid = ?1 AND patient_id = ?2
            "#,
        )
        .bind(&id.cid)
        .bind(&id.patient_id)
        .fetch_optional(&**db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let keys = sqlx::query_as::<_, WrappedKeyRow>(
            r#"
            SELECT cid, provider_wallet, wrapped_key
            FROM wrapped_keys
            WHERE cid = ?1 AND patient_id = ?2
            "#,
        )
        .bind(&id.cid)
        .bind(&id.patient_id)
        .fetch_all(&**db)
        .await?;

        let wrapped_keys = keys
            .into_iter()
            .map(|k| (k.provider_wallet.into(), k.wrapped_key.into()))
            .collect();
        row.into_record(wrapped_keys).map(Some)
    }

    /// Newest upload first; ties fall back to insertion order, newest first
    pub async fn list_for_patient(
        patient_id: &str,
        db: &Database,
    ) -> Result<Vec<FileRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT
                cid, patient_id, file_name, file_type, iv,
                encrypted_key_for_patient, uploaded_at
            FROM files
            WHERE patient_id = ?1
            ORDER BY uploaded_at DESC, rowid DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&**db)
        .await?;

        let keys = sqlx::query_as::<_, WrappedKeyRow>(
            r#"
            SELECT cid, provider_wallet, wrapped_key
            FROM wrapped_keys
            WHERE patient_id = ?1
            "#,
        )
        .bind(patient_id)
        .fetch_all(&**db)
        .await?;

        let mut by_cid: HashMap<String, BTreeMap<Address, WrappedKey>> = HashMap::new();
        for key in keys {
            by_cid
                .entry(key.cid)
                .or_default()
                .insert(key.provider_wallet.into(), key.wrapped_key.into());
        }

        rows.into_iter()
            .map(|row| {
                let wrapped_keys = by_cid.remove(&row.cid).unwrap_or_default();
                row.into_record(wrapped_keys)
            })
            .collect()
    }
}

pub(crate) async fn upsert_wrapped_key(
    tx: &mut Transaction<'_, Sqlite>,
    id: &FileId,
    provider: &Address,
    key: WrappedKey,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO wrapped_keys (cid, patient_id, provider_wallet, wrapped_key)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (cid, patient_id, provider_wallet)
        DO UPDATE SET wrapped_key = excluded.wrapped_key
        "#,
    )
    .bind(&id.cid)
    .bind(&id.patient_id)
    .bind(DAddress::from(provider))
    .bind(DWrappedKey::from(key))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl WrappedKeyRow {
    /// Insert or replace, failing with `RowNotFound` when the file is missing
    pub async fn upsert(
        id: &FileId,
        provider: &Address,
        key: WrappedKey,
        db: &Database,
    ) -> Result<(), sqlx::Error> {
        let mut tx = db.begin().await?;

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM files
            WHERE cid = ?1 AND patient_id = ?2
            "#,
        )
        .bind(&id.cid)
        .bind(&id.patient_id)
        .fetch_one(&mut *tx)
        .await?;
        if count == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        upsert_wrapped_key(&mut tx, id, provider, key).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete the provider's wraps across all of a patient's files
    pub async fn remove_for_provider(
        patient_id: &str,
        provider: &Address,
        db: &Database,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM wrapped_keys
            WHERE patient_id = ?1 AND provider_wallet = ?2
            "#,
        )
        .bind(patient_id)
        .bind(DAddress::from(provider))
        .execute(&**db)
        .await?;
        Ok(result.rows_affected())
    }
}
