use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::wallet::{Address, Wallet};

/// Where an event sits in the ledger: block number, then index within the block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPosition {
    pub block: u64,
    pub log_index: u64,
}

impl LedgerPosition {
    pub fn new(block: u64, log_index: u64) -> Self {
        Self { block, log_index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsentEventKind {
    Requested,
    Granted,
    Revoked,
    /// Emitted when a patient declines a pending request; replays like `Revoked`
    Rejected,
}

impl ConsentEventKind {
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Revoked | Self::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentEvent {
    pub kind: ConsentEventKind,
    pub patient: Address,
    pub provider: Address,
    pub position: LedgerPosition,
}

/// Narrow an event query; `None` fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub patient: Option<Address>,
    pub provider: Option<Address>,
    pub kinds: Option<Vec<ConsentEventKind>>,
}

impl EventFilter {
    pub fn patient(patient: &Address) -> Self {
        Self {
            patient: Some(patient.clone()),
            ..Default::default()
        }
    }

    pub fn pair(patient: &Address, provider: &Address) -> Self {
        Self {
            patient: Some(patient.clone()),
            provider: Some(provider.clone()),
            kinds: None,
        }
    }

    pub fn matches(&self, event: &ConsentEvent) -> bool {
        self.patient.as_ref().map_or(true, |p| p == &event.patient)
            && self.provider.as_ref().map_or(true, |p| p == &event.provider)
            && self
                .kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&event.kind))
    }
}

/// Confirmation of a ledger write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub position: LedgerPosition,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError<T> {
    #[error("unhandled ledger error: {0}")]
    Provider(#[from] T),
    /// The deployed contract does not expose this query
    #[error("ledger does not support {0}")]
    Unsupported(&'static str),
    #[error("rejected by ledger: {0}")]
    Rejected(String),
    #[error("ledger call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Full-record consent between a patient and a provider
///
/// Writes are signed by an explicit [`Wallet`]: a provider signs
///  `request_full_access`, the patient signs `grant`, `revoke` and `reject`.
#[async_trait]
pub trait ConsentLedger: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send;

    /// Provider `signer` asks `patient` for access
    async fn request_full_access(
        &self,
        signer: &Wallet,
        patient: &Address,
    ) -> Result<Receipt, LedgerError<Self::Error>>;

    /// Patient `signer` grants `provider` access
    async fn grant(
        &self,
        signer: &Wallet,
        provider: &Address,
    ) -> Result<Receipt, LedgerError<Self::Error>>;

    async fn revoke(
        &self,
        signer: &Wallet,
        provider: &Address,
    ) -> Result<Receipt, LedgerError<Self::Error>>;

    async fn reject(
        &self,
        signer: &Wallet,
        provider: &Address,
    ) -> Result<Receipt, LedgerError<Self::Error>>;

    async fn has_access(
        &self,
        patient: &Address,
        provider: &Address,
    ) -> Result<bool, LedgerError<Self::Error>>;

    async fn is_pending(
        &self,
        patient: &Address,
        provider: &Address,
    ) -> Result<bool, LedgerError<Self::Error>>;

    /// Providers with an outstanding request against `patient`
    async fn pending_requests(
        &self,
        patient: &Address,
    ) -> Result<Vec<Address>, LedgerError<Self::Error>>;

    /// Providers currently holding access to `patient`'s records
    async fn granted_providers(
        &self,
        patient: &Address,
    ) -> Result<Vec<Address>, LedgerError<Self::Error>>;

    /// Events matching `filter`, in ledger order
    async fn events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ConsentEvent>, LedgerError<Self::Error>>;
}
