use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use common::auth::{DEFAULT_NONCE_TTL_SECS, DEFAULT_SESSION_TTL_SECS};

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// address for the API server to listen on
    pub listen_addr: SocketAddr,
    /// origins allowed by CORS; any origin when empty
    pub cors_origins: Vec<String>,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // auth configuration
    /// HS256 secret for session tokens. Without it challenges can still be
    ///  issued but every verification fails with a configuration error.
    pub jwt_secret: Option<String>,
    pub nonce_ttl_secs: i64,
    pub session_ttl_secs: i64,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), DEFAULT_PORT),
            cors_origins: Vec::new(),
            sqlite_path: None,
            jwt_secret: None,
            nonce_ttl_secs: DEFAULT_NONCE_TTL_SECS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

/// On-disk form of [`Config`]; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen_addr: Option<SocketAddr>,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    pub sqlite_path: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub nonce_ttl_secs: Option<i64>,
    pub session_ttl_secs: Option<i64>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents)
    }
}

impl Config {
    /// Defaults, overlaid with whatever the file sets
    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let log_level = match file.log_level {
            Some(level) => parse_log_level(&level)?,
            None => defaults.log_level,
        };

        let config = Self {
            listen_addr: file.listen_addr.unwrap_or(defaults.listen_addr),
            cors_origins: file.cors_origins,
            sqlite_path: file.sqlite_path,
            jwt_secret: file.jwt_secret.filter(|s| !s.is_empty()),
            nonce_ttl_secs: file.nonce_ttl_secs.unwrap_or(defaults.nonce_ttl_secs),
            session_ttl_secs: file.session_ttl_secs.unwrap_or(defaults.session_ttl_secs),
            log_level,
            log_dir: file.log_dir,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nonce_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("nonce_ttl_secs must be positive".into()));
        }
        if self.session_ttl_secs <= 0 {
            return Err(ConfigError::Invalid(
                "session_ttl_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

pub fn parse_log_level(level: &str) -> Result<tracing::Level, ConfigError> {
    level
        .parse::<tracing::Level>()
        .map_err(|_| ConfigError::Invalid(format!("unknown log level: {level}")))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = Config::from_file_config(FileConfig::parse("").unwrap()).unwrap();
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
        assert!(config.sqlite_path.is_none());
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(config.nonce_ttl_secs, 300);
    }

    #[test]
    fn test_file_overrides() {
        let file = FileConfig::parse(
            r#"
            listen_addr = "127.0.0.1:8088"
            sqlite_path = "/var/lib/medvault/meta.db"
            jwt_secret = "s3cret"
            session_ttl_secs = 600
            log_level = "debug"
            cors_origins = ["https://app.example.com"]
            "#,
        )
        .unwrap();
        let config = Config::from_file_config(file).unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8088");
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.session_ttl_secs, 600);
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.cors_origins.len(), 1);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            FileConfig::parse("listen_port = 1"),
            Err(ConfigError::Parse(_))
        ));

        let file = FileConfig::parse("nonce_ttl_secs = 0").unwrap();
        assert!(matches!(
            Config::from_file_config(file),
            Err(ConfigError::Invalid(_))
        ));

        let file = FileConfig::parse(r#"log_level = "loud""#).unwrap();
        assert!(matches!(
            Config::from_file_config(file),
            Err(ConfigError::Invalid(_))
        ));
    }
}
