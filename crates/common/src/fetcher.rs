//! Resilient retrieval from replicated content gateways
//!
//! ## Fetch Flow
//!
//! 1. Try the gateway that last served a request successfully (if any)
//! 2. Try the remaining gateways in configured order
//! 3. Bound every attempt by `attempt_timeout`
//! 4. Remember the first gateway that succeeds and return its bytes
//!
//! Non-2xx responses, transport errors and timeouts all count as failures.
//! Bytes are returned as served; authenticity is established by decryption.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

/// Per-attempt timeout
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(12);

/// Public IPFS gateways, in preference order
pub const DEFAULT_GATEWAYS: [&str; 4] = [
    "https://ipfs.io/ipfs/",
    "https://dweb.link/ipfs/",
    "https://cloudflare-ipfs.com/ipfs/",
    "https://w3s.link/ipfs/",
];

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("gateway responded with status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no gateways configured")]
    NoGateways,
    #[error("invalid gateway url {0}: {1}")]
    InvalidGateway(String, String),
    #[error("invalid content address: {0:?}")]
    InvalidAddress(String),
    /// Every gateway failed; retrying later may succeed
    #[error("retrieval exhausted after {attempts} gateways, last failure at {gateway}: {source}")]
    RetrievalExhausted {
        attempts: usize,
        gateway: Url,
        #[source]
        source: TransportError,
    },
}

/// Performs a single GET against a fully-formed gateway URL
#[async_trait]
pub trait GatewayTransport: Send + Sync + Debug {
    async fn get(&self, url: &Url) -> Result<Bytes, TransportError>;
}

/// [`GatewayTransport`] over HTTP(S)
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Bytes, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct GatewayFetcherConfig {
    /// Gateway base URLs; the content address is appended to each
    pub gateways: Vec<String>,
    pub attempt_timeout: Duration,
}

impl Default for GatewayFetcherConfig {
    fn default() -> Self {
        Self {
            gateways: DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Fetches content by address from an ordered list of gateways
///
/// The last healthy gateway is remembered per instance. It is only updated
/// by an attempt that completed successfully, so a cancelled or timed-out
/// attempt never moves it.
#[derive(Debug)]
pub struct GatewayFetcher<T> {
    gateways: Vec<Url>,
    transport: T,
    attempt_timeout: Duration,
    preferred: Mutex<Option<usize>>,
}

fn normalize_gateway(raw: &str) -> Result<Url, FetchError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| FetchError::InvalidGateway(raw.to_string(), e.to_string()))
}

fn validate_address(address: &str) -> Result<(), FetchError> {
    if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FetchError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

impl<T: GatewayTransport> GatewayFetcher<T> {
    pub fn new(config: GatewayFetcherConfig, transport: T) -> Result<Self, FetchError> {
        if config.gateways.is_empty() {
            return Err(FetchError::NoGateways);
        }
        let gateways = config
            .gateways
            .iter()
            .map(|g| normalize_gateway(g))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            gateways,
            transport,
            attempt_timeout: config.attempt_timeout,
            preferred: Mutex::new(None),
        })
    }

    pub fn gateways(&self) -> &[Url] {
        &self.gateways
    }

    /// The gateway that served the most recent successful fetch
    pub fn preferred_gateway(&self) -> Option<&Url> {
        let preferred = *self.preferred.lock();
        preferred.and_then(|i| self.gateways.get(i))
    }

    fn attempt_order(&self) -> Vec<usize> {
        let preferred = *self.preferred.lock();
        let mut order = Vec::with_capacity(self.gateways.len());
        order.extend(preferred);
        order.extend((0..self.gateways.len()).filter(|i| Some(*i) != preferred));
        order
    }

    pub async fn fetch(&self, address: &str) -> Result<Bytes, FetchError> {
        validate_address(address)?;

        let mut last_error = None;
        let order = self.attempt_order();
        let attempts = order.len();

        for index in order {
            let gateway = &self.gateways[index];
            let url = gateway
                .join(address)
                .map_err(|_| FetchError::InvalidAddress(address.to_string()))?;

            let result = match tokio::time::timeout(self.attempt_timeout, self.transport.get(&url))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.attempt_timeout)),
            };

            match result {
                Ok(bytes) => {
                    *self.preferred.lock() = Some(index);
                    tracing::debug!(%gateway, %address, len = bytes.len(), "fetched content");
                    return Ok(bytes);
                }
                Err(e) => {
                    tracing::warn!(
                        %gateway,
                        %address,
                        error = %e,
                        "gateway fetch failed, trying next"
                    );
                    last_error = Some((gateway.clone(), e));
                }
            }
        }

        match last_error {
            Some((gateway, source)) => Err(FetchError::RetrievalExhausted {
                attempts,
                gateway,
                source,
            }),
            None => Err(FetchError::NoGateways),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves per-host behaviour and counts calls per host
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        behaviour: HashMap<String, Result<&'static [u8], TransportError>>,
        hang: Vec<String>,
        calls: Mutex<Vec<String>>,
        total: AtomicUsize,
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn get(&self, url: &Url) -> Result<Bytes, TransportError> {
            let host = url.host_str().unwrap_or_default().to_string();
            self.calls.lock().push(host.clone());
            self.total.fetch_add(1, Ordering::SeqCst);
            if self.hang.contains(&host) {
                std::future::pending::<()>().await;
            }
            match self.behaviour.get(&host) {
                Some(Ok(bytes)) => Ok(Bytes::from_static(*bytes)),
                Some(Err(e)) => Err(e.clone()),
                None => Err(TransportError::Status(404)),
            }
        }
    }

    fn config(hosts: &[&str]) -> GatewayFetcherConfig {
        GatewayFetcherConfig {
            gateways: hosts
                .iter()
                .map(|h| format!("https://{h}/ipfs"))
                .collect(),
            attempt_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_failover_then_sticky() {
        let mut transport = ScriptedTransport::default();
        transport
            .behaviour
            .insert("a.test".into(), Err(TransportError::Status(502)));
        transport.behaviour.insert("b.test".into(), Ok(b"cipher"));
        let fetcher = GatewayFetcher::new(config(&["a.test", "b.test"]), transport).unwrap();

        let bytes = fetcher.fetch("bafy123").await.unwrap();
        assert_eq!(&bytes[..], b"cipher");
        assert_eq!(
            fetcher.preferred_gateway().unwrap().as_str(),
            "https://b.test/ipfs/"
        );

        fetcher.fetch("bafy123").await.unwrap();
        let calls = fetcher.transport.calls.lock().clone();
        assert_eq!(calls, vec!["a.test", "b.test", "b.test"]);
    }

    #[tokio::test]
    async fn test_all_fail_reports_last_error() {
        let mut transport = ScriptedTransport::default();
        transport
            .behaviour
            .insert("a.test".into(), Err(TransportError::Status(500)));
        transport.behaviour.insert(
            "b.test".into(),
            Err(TransportError::Request("connection reset".into())),
        );
        let fetcher = GatewayFetcher::new(config(&["a.test", "b.test"]), transport).unwrap();

        match fetcher.fetch("bafy123").await {
            Err(FetchError::RetrievalExhausted {
                attempts,
                gateway,
                source: TransportError::Request(reason),
            }) => {
                assert_eq!(attempts, 2);
                assert_eq!(gateway.host_str(), Some("b.test"));
                assert_eq!(reason, "connection reset");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(fetcher.preferred_gateway().is_none());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let mut transport = ScriptedTransport::default();
        transport.hang.push("slow.test".into());
        transport.behaviour.insert("fast.test".into(), Ok(b"ok"));
        let fetcher = GatewayFetcher::new(config(&["slow.test", "fast.test"]), transport).unwrap();

        let bytes = fetcher.fetch("bafy123").await.unwrap();
        assert_eq!(&bytes[..], b"ok");
        assert_eq!(fetcher.preferred_gateway().unwrap().host_str(), Some("fast.test"));
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        assert!(matches!(
            GatewayFetcher::new(config(&[]), ScriptedTransport::default()),
            Err(FetchError::NoGateways)
        ));

        let fetcher =
            GatewayFetcher::new(config(&["a.test"]), ScriptedTransport::default()).unwrap();
        assert!(matches!(
            fetcher.fetch("../etc/passwd").await,
            Err(FetchError::InvalidAddress(_))
        ));
        assert!(matches!(
            fetcher.fetch("").await,
            Err(FetchError::InvalidAddress(_))
        ));
        assert_eq!(fetcher.transport.total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_config() {
        let config = GatewayFetcherConfig::default();
        assert_eq!(config.gateways.len(), 4);
        assert_eq!(config.attempt_timeout, Duration::from_secs(12));
    }
}
