use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use service::config::parse_log_level;
use service::{spawn_service, ConfigError, FileConfig, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Address for the API server to listen on (default 0.0.0.0:5000)
    #[arg(long, env = "MEDVAULT_LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// SQLite database file; an in-memory database is used when unset
    #[arg(long, env = "MEDVAULT_SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,

    /// Secret used to sign session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "MEDVAULT_NONCE_TTL_SECS")]
    pub nonce_ttl_secs: Option<i64>,

    #[arg(long, env = "MEDVAULT_SESSION_TTL_SECS")]
    pub session_ttl_secs: Option<i64>,

    /// Allowed CORS origin, repeatable; any origin when none are given
    #[arg(long = "cors-origin", env = "MEDVAULT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "MEDVAULT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long, env = "MEDVAULT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl Serve {
    /// File values first, then anything given on the command line or in the environment
    pub fn resolve(&self, config_path: Option<&PathBuf>) -> Result<ServiceConfig, ServeError> {
        let file = match config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let mut config = ServiceConfig::from_file_config(file)?;

        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(path) = &self.sqlite_path {
            config.sqlite_path = Some(path.clone());
        }
        if let Some(secret) = self.jwt_secret.as_ref().filter(|s| !s.is_empty()) {
            config.jwt_secret = Some(secret.clone());
        }
        if let Some(ttl) = self.nonce_ttl_secs {
            config.nonce_ttl_secs = ttl;
        }
        if let Some(ttl) = self.session_ttl_secs {
            config.session_ttl_secs = ttl;
        }
        if !self.cors_origins.is_empty() {
            config.cors_origins = self.cors_origins.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = parse_log_level(level)?;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Serve {
    type Error = ServeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = self.resolve(ctx.config_path.as_ref())?;
        spawn_service(&config).await;
        Ok("service ended".to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn empty() -> Serve {
        Serve {
            listen_addr: None,
            sqlite_path: None,
            jwt_secret: None,
            nonce_ttl_secs: None,
            session_ttl_secs: None,
            cors_origins: Vec::new(),
            log_level: None,
            log_dir: None,
        }
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medvault.toml");
        std::fs::write(
            &path,
            "jwt_secret = \"from-file\"\nsession_ttl_secs = 60\nlog_level = \"warn\"\n",
        )
        .unwrap();

        let serve = Serve {
            jwt_secret: Some("from-flag".into()),
            log_level: Some("debug".into()),
            ..empty()
        };
        let config = serve.resolve(Some(&path)).unwrap();
        assert_eq!(config.jwt_secret.as_deref(), Some("from-flag"));
        assert_eq!(config.session_ttl_secs, 60);
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let serve = Serve {
            session_ttl_secs: Some(-1),
            ..empty()
        };
        assert!(serve.resolve(None).is_err());

        let missing = PathBuf::from("/nonexistent/medvault.toml");
        assert!(matches!(
            empty().resolve(Some(&missing)),
            Err(ServeError::Config(ConfigError::Read { .. }))
        ));
    }
}
