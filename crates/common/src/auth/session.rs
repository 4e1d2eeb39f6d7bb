use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::wallet::Address;

/// Bearer tokens live for one hour
pub const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub wallet_address: Address,
    pub iat: i64,
    pub exp: i64,
}

/// An issued bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub wallet_address: Address,
    pub expires_at: DateTime<Utc>,
}

/// HS256 signer/validator for session tokens
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, address: &Address) -> Result<Session, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = Claims {
            wallet_address: address.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(Session {
            token,
            wallet_address: address.clone(),
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wallet::Wallet;

    #[test]
    fn test_issue_and_validate() {
        let ttl = Duration::seconds(DEFAULT_SESSION_TTL_SECS);
        let issuer = SessionIssuer::new(b"test-secret", ttl);
        let wallet = Wallet::generate();

        let session = issuer.issue(wallet.address()).unwrap();
        let claims = issuer.validate(&session.token).unwrap();

        assert_eq!(&claims.wallet_address, wallet.address());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_rejects_other_secret_and_expired() {
        let ttl = Duration::seconds(DEFAULT_SESSION_TTL_SECS);
        let issuer = SessionIssuer::new(b"test-secret", ttl);
        let other = SessionIssuer::new(b"other-secret", ttl);
        let wallet = Wallet::generate();

        let session = issuer.issue(wallet.address()).unwrap();
        assert!(other.validate(&session.token).is_err());
        assert!(issuer.validate("not.a.token").is_err());

        let expired = SessionIssuer::new(b"test-secret", Duration::seconds(-30))
            .issue(wallet.address())
            .unwrap();
        assert!(issuer.validate(&expired.token).is_err());
    }
}
