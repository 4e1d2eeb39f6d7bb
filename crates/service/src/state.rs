use url::Url;

use common::auth::{NonceAuthenticator, SessionIssuer};
use common::keyring::KeyWrapStore;

use super::config::Config;
use super::database::{Database, DatabaseSetupError};

/// Main service state, cloned into every request handler
#[derive(Clone, Debug)]
pub struct State {
    database: Database,
    keyring: KeyWrapStore<Database>,
    auth: NonceAuthenticator<Database>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let database = match config.sqlite_path {
            Some(ref path) => {
                // the parent directory has to exist, the file is created on demand
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        return Err(StateSetupError::DatabasePathDoesNotExist);
                    }
                }
                let url = Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidDatabaseUrl)?;
                tracing::info!("Database URL: {}", url);
                Database::connect(&url).await?
            }
            None => {
                tracing::warn!("no sqlite path configured, using an in-memory database");
                Database::in_memory().await?
            }
        };

        Ok(Self::new(database, config))
    }

    /// Wire up state over an already-migrated database
    pub fn new(database: Database, config: &Config) -> Self {
        let sessions = match config.jwt_secret.as_deref() {
            Some(secret) => Some(SessionIssuer::new(
                secret.as_bytes(),
                chrono::Duration::seconds(config.session_ttl_secs),
            )),
            None => {
                tracing::warn!("JWT secret not configured, wallet verification will fail");
                None
            }
        };

        let auth = NonceAuthenticator::new(database.clone(), sessions)
            .with_nonce_ttl(chrono::Duration::seconds(config.nonce_ttl_secs));

        Self {
            keyring: KeyWrapStore::new(database.clone()),
            auth,
            database,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn keyring(&self) -> &KeyWrapStore<Database> {
        &self.keyring
    }

    pub fn auth(&self) -> &NonceAuthenticator<Database> {
        &self.auth
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Database setup error: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
}
