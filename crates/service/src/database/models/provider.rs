use chrono::{DateTime, Utc};
use sqlx::FromRow;

use common::crypto::PublicKey;
use common::records::Provider;
use common::wallet::Address;

use super::decode_error;
use crate::database::types::DAddress;
use crate::database::Database;

#[derive(Debug, Clone, FromRow)]
pub struct ProviderRow {
    pub wallet_address: DAddress,
    pub hospital_name: String,
    /// Hex-encoded X25519 public key
    pub encryption_public_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ProviderRow> for Provider {
    type Error = sqlx::Error;

    fn try_from(row: ProviderRow) -> Result<Self, Self::Error> {
        let encryption_public_key = row
            .encryption_public_key
            .as_deref()
            .map(PublicKey::from_hex)
            .transpose()
            .map_err(decode_error)?;
        Ok(Provider {
            wallet_address: row.wallet_address.into(),
            hospital_name: row.hospital_name,
            encryption_public_key,
            created_at: row.created_at,
        })
    }
}

impl ProviderRow {
    pub async fn insert(provider: &Provider, db: &Database) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO providers (wallet_address, hospital_name, encryption_public_key, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(DAddress::from(&provider.wallet_address))
        .bind(&provider.hospital_name)
        .bind(provider.encryption_public_key.map(|key| key.to_hex()))
        .bind(provider.created_at)
        .execute(&**db)
        .await?;
        Ok(())
    }

    pub async fn get(wallet: &Address, db: &Database) -> Result<Option<Provider>, sqlx::Error> {
        let row = sqlx::query_as::<_, ProviderRow>(
            r#"
            SELECT wallet_address, hospital_name, encryption_public_key, created_at
            FROM providers
            WHERE wallet_address = ?1
            "#,
        )
        .bind(DAddress::from(wallet))
        .fetch_optional(&**db)
        .await?;
        row.map(Provider::try_from).transpose()
    }

    /// # Returns
    /// * `Ok(true)` - the provider exists and its key was replaced
    pub async fn set_encryption_key(
        wallet: &Address,
        key: &PublicKey,
        db: &Database,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE providers
            SET encryption_public_key = ?1
            WHERE wallet_address = ?2
            "#,
        )
        .bind(key.to_hex())
        .bind(DAddress::from(wallet))
        .execute(&**db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
