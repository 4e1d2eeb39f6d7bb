use chrono::{Duration, Utc};

use super::nonce::{generate_nonce, NonceStore};
use super::session::{Claims, Session, SessionIssuer};
use crate::wallet::{recover_personal_sign, Address, WalletError};

/// Challenges expire after five minutes whether or not they were used
pub const DEFAULT_NONCE_TTL_SECS: i64 = 5 * 60;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("nonce not found, request a new one")]
    ChallengeNotFound,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("server configuration error: {0}")]
    Configuration(String),
    #[error("invalid or expired session token")]
    InvalidSession,
    #[error("nonce store error: {0}")]
    Store(String),
}

/// Issues challenges, verifies signed answers and validates sessions
///
/// `sessions` is `None` when the process has no signing secret. Challenges can
/// still be requested, but verification refuses before touching the nonce.
#[derive(Debug, Clone)]
pub struct NonceAuthenticator<S> {
    store: S,
    sessions: Option<SessionIssuer>,
    nonce_ttl: Duration,
}

impl<S: NonceStore> NonceAuthenticator<S> {
    pub fn new(store: S, sessions: Option<SessionIssuer>) -> Self {
        Self {
            store,
            sessions,
            nonce_ttl: Duration::seconds(DEFAULT_NONCE_TTL_SECS),
        }
    }

    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = ttl;
        self
    }

    /// Issue a fresh nonce for `address`, replacing any outstanding one
    pub async fn request_challenge(&self, address: &Address) -> Result<String, AuthError> {
        let nonce = generate_nonce();
        let expires_at = Utc::now() + self.nonce_ttl;
        self.store
            .upsert_nonce(address, &nonce, expires_at)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        tracing::debug!(%address, %expires_at, "issued challenge");
        Ok(nonce)
    }

    /// Check `signature` against the outstanding nonce for `address`
    ///
    /// On success the nonce is consumed and a session is issued. When two
    /// verifications race on one nonce, exactly one of them succeeds; the
    /// other sees [`AuthError::ChallengeNotFound`].
    pub async fn verify(&self, address: &Address, signature: &str) -> Result<Session, AuthError> {
        let nonce = self
            .store
            .nonce(address, Utc::now())
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?
            .ok_or(AuthError::ChallengeNotFound)?;

        let signer = recover_personal_sign(&nonce, signature).map_err(|e| match e {
            WalletError::MalformedSignature(reason) => AuthError::MalformedSignature(reason),
            _ => AuthError::InvalidSignature,
        })?;
        if &signer != address {
            tracing::warn!(%address, recovered = %signer, "challenge signed by another wallet");
            return Err(AuthError::InvalidSignature);
        }

        let sessions = self.sessions.as_ref().ok_or_else(|| {
            AuthError::Configuration("session signing secret is not configured".into())
        })?;

        let consumed = self
            .store
            .consume_nonce(address, &nonce)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        if !consumed {
            return Err(AuthError::ChallengeNotFound);
        }

        let session = sessions
            .issue(address)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        tracing::info!(%address, expires_at = %session.expires_at, "wallet authenticated");
        Ok(session)
    }

    pub fn validate_session(&self, token: &str) -> Result<Claims, AuthError> {
        let sessions = self.sessions.as_ref().ok_or_else(|| {
            AuthError::Configuration("session signing secret is not configured".into())
        })?;
        sessions.validate(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected session token");
            AuthError::InvalidSession
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::MemoryNonceStore;
    use crate::auth::DEFAULT_SESSION_TTL_SECS;
    use crate::wallet::Wallet;

    fn authenticator() -> NonceAuthenticator<MemoryNonceStore> {
        NonceAuthenticator::new(
            MemoryNonceStore::new(),
            Some(SessionIssuer::new(
                b"unit-test-secret",
                Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            )),
        )
    }

    #[tokio::test]
    async fn test_challenge_verify_session() {
        let auth = authenticator();
        let wallet = Wallet::generate();

        let nonce = auth.request_challenge(wallet.address()).await.unwrap();
        let signature = wallet.sign_message(&nonce).unwrap();
        let session = auth.verify(wallet.address(), &signature).await.unwrap();

        let claims = auth.validate_session(&session.token).unwrap();
        assert_eq!(&claims.wallet_address, wallet.address());
    }

    #[tokio::test]
    async fn test_nonce_is_single_use() {
        let auth = authenticator();
        let wallet = Wallet::generate();

        let nonce = auth.request_challenge(wallet.address()).await.unwrap();
        let signature = wallet.sign_message(&nonce).unwrap();

        auth.verify(wallet.address(), &signature).await.unwrap();
        let replay = auth.verify(wallet.address(), &signature).await;
        assert!(matches!(replay, Err(AuthError::ChallengeNotFound)));
    }

    #[tokio::test]
    async fn test_wrong_signer_keeps_nonce() {
        let auth = authenticator();
        let wallet = Wallet::generate();
        let intruder = Wallet::generate();

        let nonce = auth.request_challenge(wallet.address()).await.unwrap();
        let forged = intruder.sign_message(&nonce).unwrap();
        assert!(matches!(
            auth.verify(wallet.address(), &forged).await,
            Err(AuthError::InvalidSignature)
        ));

        let genuine = wallet.sign_message(&nonce).unwrap();
        assert!(auth.verify(wallet.address(), &genuine).await.is_ok());
    }

    #[tokio::test]
    async fn test_no_challenge() {
        let auth = authenticator();
        let wallet = Wallet::generate();
        let signature = wallet.sign_message("whatever").unwrap();
        assert!(matches!(
            auth.verify(wallet.address(), &signature).await,
            Err(AuthError::ChallengeNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_challenge() {
        let auth = authenticator().with_nonce_ttl(Duration::zero());
        let wallet = Wallet::generate();

        let nonce = auth.request_challenge(wallet.address()).await.unwrap();
        let signature = wallet.sign_message(&nonce).unwrap();
        assert!(matches!(
            auth.verify(wallet.address(), &signature).await,
            Err(AuthError::ChallengeNotFound)
        ));
    }

    #[tokio::test]
    async fn test_missing_secret_preserves_nonce() {
        let store = MemoryNonceStore::new();
        let misconfigured = NonceAuthenticator::new(store.clone(), None);
        let wallet = Wallet::generate();

        let nonce = misconfigured
            .request_challenge(wallet.address())
            .await
            .unwrap();
        let signature = wallet.sign_message(&nonce).unwrap();
        assert!(matches!(
            misconfigured.verify(wallet.address(), &signature).await,
            Err(AuthError::Configuration(_))
        ));

        // once configured, the same answer still works
        let fixed = NonceAuthenticator::new(
            store,
            Some(SessionIssuer::new(b"now-set", Duration::seconds(60))),
        );
        assert!(fixed.verify(wallet.address(), &signature).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_verifies_one_winner() {
        let auth = authenticator();
        let wallet = Wallet::generate();
        let nonce = auth.request_challenge(wallet.address()).await.unwrap();
        let signature = wallet.sign_message(&nonce).unwrap();

        let (a, b) = tokio::join!(
            auth.verify(wallet.address(), &signature),
            auth.verify(wallet.address(), &signature)
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }
}
