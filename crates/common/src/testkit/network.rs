use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use url::Url;

use crate::content::{content_address, ContentPublisher};
use crate::fetcher::{
    FetchError, GatewayFetcher, GatewayFetcherConfig, GatewayTransport, TransportError,
};

/// A content-addressed store reachable through any number of fake gateways
///
/// Gateways are identified by host name. Every host serves the same content
/// unless it has been taken down.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentNetwork {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    content: HashMap<String, Bytes>,
    down: HashSet<String>,
    requests: Vec<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryContentNetworkError {
    #[error("content network is refusing uploads")]
    Unavailable,
}

impl MemoryContentNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` under an arbitrary address
    pub fn pin(&self, address: &str, data: impl Into<Bytes>) {
        self.inner.write().content.insert(address.to_string(), data.into());
    }

    pub fn get(&self, address: &str) -> Option<Bytes> {
        self.inner.read().content.get(address).cloned()
    }

    /// Flip one bit of the stored bytes, as a misbehaving gateway would
    pub fn corrupt(&self, address: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(bytes) = inner.content.get_mut(address) else {
            return false;
        };
        if bytes.is_empty() {
            return false;
        }
        let mut tampered = bytes.to_vec();
        tampered[0] ^= 0x01;
        *bytes = Bytes::from(tampered);
        true
    }

    /// Make a gateway host answer 503 until restored
    pub fn take_down(&self, host: &str) {
        self.inner.write().down.insert(host.to_string());
    }

    pub fn restore(&self, host: &str) {
        self.inner.write().down.remove(host);
    }

    /// Hosts contacted so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.inner.read().requests.clone()
    }

    /// A fetcher over `hosts`, each served by this network
    pub fn fetcher(&self, hosts: &[&str]) -> Result<GatewayFetcher<Self>, FetchError> {
        let config = GatewayFetcherConfig {
            gateways: hosts.iter().map(|h| format!("https://{h}/ipfs/")).collect(),
            attempt_timeout: Duration::from_secs(1),
        };
        GatewayFetcher::new(config, self.clone())
    }
}

#[async_trait]
impl ContentPublisher for MemoryContentNetwork {
    type Error = MemoryContentNetworkError;

    async fn publish(&self, data: Bytes) -> Result<String, Self::Error> {
        let address = content_address(&data);
        self.pin(&address, data);
        Ok(address)
    }
}

#[async_trait]
impl GatewayTransport for MemoryContentNetwork {
    async fn get(&self, url: &Url) -> Result<Bytes, TransportError> {
        let host = url.host_str().unwrap_or_default().to_string();
        let address = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();

        let mut inner = self.inner.write();
        inner.requests.push(host.clone());
        if inner.down.contains(&host) {
            return Err(TransportError::Status(503));
        }
        inner
            .content
            .get(&address)
            .cloned()
            .ok_or(TransportError::Status(404))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_fetch() {
        let network = MemoryContentNetwork::new();
        let address = network
            .publish(Bytes::from_static(b"sealed bytes"))
            .await
            .unwrap();

        let fetcher = network.fetcher(&["gw1.test"]).unwrap();
        let bytes = fetcher.fetch(&address).await.unwrap();
        assert_eq!(&bytes[..], b"sealed bytes");
    }

    #[tokio::test]
    async fn test_down_host_fails_over() {
        let network = MemoryContentNetwork::new();
        network.pin("bafy123", b"x".to_vec());
        network.take_down("gw1.test");

        let fetcher = network.fetcher(&["gw1.test", "gw2.test"]).unwrap();
        fetcher.fetch("bafy123").await.unwrap();
        assert_eq!(network.requests(), vec!["gw1.test", "gw2.test"]);
    }
}
