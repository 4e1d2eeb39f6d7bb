use chrono::{DateTime, Utc};
use sqlx::FromRow;

use common::records::{AccessRequest, AccessRequestKey, AccessRequestStatus};
use common::wallet::Address;

use super::decode_error;
use crate::database::types::DAddress;
use crate::database::Database;

#[derive(Debug, Clone, FromRow)]
pub struct AccessRequestRow {
    pub cid: String,
    pub provider_wallet: DAddress,
    pub patient_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AccessRequestRow> for AccessRequest {
    type Error = sqlx::Error;

    fn try_from(row: AccessRequestRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AccessRequestStatus>()
            .map_err(decode_error)?;
        Ok(AccessRequest {
            cid: row.cid,
            provider_wallet: row.provider_wallet.into(),
            patient_id: row.patient_id,
            status,
            created_at: row.created_at,
        })
    }
}

fn collect(rows: Vec<AccessRequestRow>) -> Result<Vec<AccessRequest>, sqlx::Error> {
    rows.into_iter().map(AccessRequest::try_from).collect()
}

/// Outcome of a compare-and-set on a request's status
#[derive(Debug)]
pub enum Decision {
    Decided(AccessRequest),
    Missing,
    AlreadyDecided(AccessRequestStatus),
}

impl AccessRequestRow {
    pub async fn insert(request: &AccessRequest, db: &Database) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO access_requests (cid, provider_wallet, patient_id, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&request.cid)
        .bind(DAddress::from(&request.provider_wallet))
        .bind(&request.patient_id)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .execute(&**db)
        .await?;
        Ok(())
    }

    pub async fn get(
        key: &AccessRequestKey,
        db: &Database,
    ) -> Result<Option<AccessRequest>, sqlx::Error> {
        let row = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT cid, provider_wallet, patient_id, status, created_at
            FROM access_requests
            WHERE cid = ?1 AND provider_wallet = ?2 AND patient_id = ?3
            "#,
        )
        .bind(&key.cid)
        .bind(DAddress::from(&key.provider_wallet))
        .bind(&key.patient_id)
        .fetch_optional(&**db)
        .await?;
        row.map(AccessRequest::try_from).transpose()
    }

    /// Move a pending request to `status`; only one caller can win
    pub async fn decide(
        key: &AccessRequestKey,
        status: AccessRequestStatus,
        db: &Database,
    ) -> Result<Decision, sqlx::Error> {
        let mut tx = db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE access_requests
            SET status = ?1
            WHERE cid = ?2 AND provider_wallet = ?3 AND patient_id = ?4
              AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(&key.cid)
        .bind(DAddress::from(&key.provider_wallet))
        .bind(&key.patient_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT cid, provider_wallet, patient_id, status, created_at
            FROM access_requests
            WHERE cid = ?1 AND provider_wallet = ?2 AND patient_id = ?3
            "#,
        )
        .bind(&key.cid)
        .bind(DAddress::from(&key.provider_wallet))
        .bind(&key.patient_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        let Some(row) = row else {
            return Ok(Decision::Missing);
        };
        let request = AccessRequest::try_from(row)?;
        if updated == 0 {
            return Ok(Decision::AlreadyDecided(request.status));
        }
        Ok(Decision::Decided(request))
    }

    pub async fn pending_for_patient(
        patient_id: &str,
        db: &Database,
    ) -> Result<Vec<AccessRequest>, sqlx::Error> {
        let rows = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT cid, provider_wallet, patient_id, status, created_at
            FROM access_requests
            WHERE patient_id = ?1 AND status = 'pending'
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&**db)
        .await?;
        collect(rows)
    }

    pub async fn for_provider(
        wallet: &Address,
        db: &Database,
    ) -> Result<Vec<AccessRequest>, sqlx::Error> {
        let rows = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT cid, provider_wallet, patient_id, status, created_at
            FROM access_requests
            WHERE provider_wallet = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(DAddress::from(wallet))
        .fetch_all(&**db)
        .await?;
        collect(rows)
    }
}
