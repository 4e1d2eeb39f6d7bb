use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Config {
    // Listen address
    pub listen_addr: SocketAddr,
    // Origins allowed by CORS, any origin when empty
    pub cors_origins: Vec<String>,
    // log level for http tracing
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, cors_origins: Vec<String>) -> Self {
        tracing::info!(
            "Creating HTTP server Config: listen_addr={}, cors_origins={:?}",
            listen_addr,
            cors_origins
        );
        Self {
            listen_addr,
            cors_origins,
            log_level: tracing::Level::INFO,
        }
    }
}
