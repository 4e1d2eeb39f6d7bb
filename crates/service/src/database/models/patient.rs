use chrono::{DateTime, Utc};
use sqlx::FromRow;

use common::records::Patient;
use common::wallet::Address;

use crate::database::types::DAddress;
use crate::database::Database;

#[derive(Debug, Clone, FromRow)]
pub struct PatientRow {
    pub patient_id: String,
    pub wallet_address: DAddress,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Patient {
            wallet_address: row.wallet_address.into(),
            patient_id: row.patient_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

impl PatientRow {
    pub async fn insert(patient: &Patient, db: &Database) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO patients (patient_id, wallet_address, name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&patient.patient_id)
        .bind(DAddress::from(&patient.wallet_address))
        .bind(&patient.name)
        .bind(patient.created_at)
        .execute(&**db)
        .await?;
        Ok(())
    }

    pub async fn get(patient_id: &str, db: &Database) -> Result<Option<Patient>, sqlx::Error> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT patient_id, wallet_address, name, created_at
            FROM patients
            WHERE patient_id = ?1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&**db)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_by_wallet(
        wallet: &Address,
        db: &Database,
    ) -> Result<Option<Patient>, sqlx::Error> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT patient_id, wallet_address, name, created_at
            FROM patients
            WHERE wallet_address = ?1
            "#,
        )
        .bind(DAddress::from(wallet))
        .fetch_optional(&**db)
        .await?;
        Ok(row.map(Into::into))
    }
}
