use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::auth::NonceStore;
use common::wallet::Address;

use crate::database::types::DAddress;
use crate::database::Database;

#[async_trait]
impl NonceStore for Database {
    type Error = sqlx::Error;

    async fn upsert_nonce(
        &self,
        address: &Address,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Self::Error> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM nonces
            WHERE julianday(expires_at) <= julianday(?1)
            "#,
        )
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO nonces (wallet_address, nonce, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (wallet_address)
            DO UPDATE SET nonce = excluded.nonce, expires_at = excluded.expires_at
            "#,
        )
        .bind(DAddress::from(address))
        .bind(nonce)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn nonce(
        &self,
        address: &Address,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, Self::Error> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT nonce, expires_at
            FROM nonces
            WHERE wallet_address = ?1
            "#,
        )
        .bind(DAddress::from(address))
        .fetch_optional(&**self)
        .await?;

        Ok(row
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(nonce, _)| nonce))
    }

    async fn consume_nonce(&self, address: &Address, nonce: &str) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM nonces
            WHERE wallet_address = ?1 AND nonce = ?2
            "#,
        )
        .bind(DAddress::from(address))
        .bind(nonce)
        .execute(&**self)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use chrono::Duration;
    use common::auth::NonceAuthenticator;
    use common::wallet::Wallet;

    #[tokio::test]
    async fn test_upsert_replaces_and_consume_is_single_use() {
        let db = Database::in_memory().await.unwrap();
        let wallet = Wallet::generate();
        let later = Utc::now() + Duration::minutes(5);

        db.upsert_nonce(wallet.address(), "first", later).await.unwrap();
        db.upsert_nonce(wallet.address(), "second", later).await.unwrap();
        assert_eq!(
            db.nonce(wallet.address(), Utc::now()).await.unwrap().as_deref(),
            Some("second")
        );

        assert!(!db.consume_nonce(wallet.address(), "first").await.unwrap());
        assert!(db.consume_nonce(wallet.address(), "second").await.unwrap());
        assert!(!db.consume_nonce(wallet.address(), "second").await.unwrap());
        assert!(db.nonce(wallet.address(), Utc::now()).await.unwrap().is_none());
    }

    async fn count_nonces(db: &Database) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nonces")
            .fetch_one(&**db)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_unanswered_challenges_are_swept() {
        let db = Database::in_memory().await.unwrap();
        let auth = NonceAuthenticator::new(db.clone(), None).with_nonce_ttl(Duration::zero());
        for _ in 0..100 {
            auth.request_challenge(Wallet::generate().address())
                .await
                .unwrap();
        }
        // only the most recent zero-ttl challenge can still be on disk
        assert!(count_nonces(&db).await <= 1);

        let live = Wallet::generate();
        db.upsert_nonce(live.address(), "live", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(count_nonces(&db).await, 1);
        assert_eq!(
            db.nonce(live.address(), Utc::now()).await.unwrap().as_deref(),
            Some("live")
        );
    }

    #[tokio::test]
    async fn test_expired_nonce_is_hidden() {
        let db = Database::in_memory().await.unwrap();
        let wallet = Wallet::generate();
        let past = Utc::now() - Duration::seconds(1);

        db.upsert_nonce(wallet.address(), "stale", past).await.unwrap();
        assert!(db.nonce(wallet.address(), Utc::now()).await.unwrap().is_none());
    }
}
