use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::provider::{
    ConsentEvent, ConsentEventKind, ConsentLedger, EventFilter, LedgerError, LedgerPosition,
    Receipt,
};
use crate::wallet::{Address, Wallet};

/// In-process consent ledger
///
/// Every write lands in its own block. State queries and event queries can be
///  switched off independently to stand in for an older contract deployment
///  or a flaky node.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<RwLock<MemoryLedgerInner>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct GrantState {
    access: bool,
    pending: bool,
}

#[derive(Debug, Default)]
struct MemoryLedgerInner {
    grants: HashMap<(Address, Address), GrantState>,
    events: Vec<ConsentEvent>,
    next_block: u64,
    state_queries_disabled: bool,
    event_queries_failing: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryLedgerError {
    #[error("memory ledger error: {0}")]
    Internal(String),
    #[error("ledger node unavailable")]
    Unavailable,
}

type Result<T> = std::result::Result<T, LedgerError<MemoryLedgerError>>;

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryLedgerInner>> {
        self.inner.read().map_err(|e| {
            LedgerError::Provider(MemoryLedgerError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryLedgerInner>> {
        self.inner.write().map_err(|e| {
            LedgerError::Provider(MemoryLedgerError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })
    }

    /// Make `has_access`, `is_pending`, `pending_requests` and
    ///  `granted_providers` report `Unsupported`
    pub fn disable_state_queries(&self, disabled: bool) -> Result<()> {
        self.write()?.state_queries_disabled = disabled;
        Ok(())
    }

    /// Make `events` fail as if the node were unreachable
    pub fn fail_event_queries(&self, failing: bool) -> Result<()> {
        self.write()?.event_queries_failing = failing;
        Ok(())
    }

    /// Append a historical event without touching the grant state
    pub fn record(
        &self,
        kind: ConsentEventKind,
        patient: &Address,
        provider: &Address,
        position: LedgerPosition,
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner.events.push(ConsentEvent {
            kind,
            patient: patient.clone(),
            provider: provider.clone(),
            position,
        });
        inner.events.sort_by_key(|event| event.position);
        inner.next_block = inner.next_block.max(position.block + 1);
        Ok(())
    }

    fn apply(
        &self,
        kind: ConsentEventKind,
        patient: &Address,
        provider: &Address,
    ) -> Result<Receipt> {
        let mut inner = self.write()?;
        let key = (patient.clone(), provider.clone());
        let mut state = inner.grants.get(&key).copied().unwrap_or_default();

        match kind {
            ConsentEventKind::Requested => {
                if state.access {
                    return Err(LedgerError::Rejected("provider already has access".into()));
                }
                state.pending = true;
            }
            ConsentEventKind::Granted => {
                state.access = true;
                state.pending = false;
            }
            ConsentEventKind::Revoked => {
                if !state.access {
                    return Err(LedgerError::Rejected("provider has no access to revoke".into()));
                }
                state.access = false;
            }
            ConsentEventKind::Rejected => {
                if !state.pending {
                    return Err(LedgerError::Rejected("no pending request to reject".into()));
                }
                state.pending = false;
            }
        }

        let position = LedgerPosition::new(inner.next_block, 0);
        inner.next_block += 1;
        inner.grants.insert(key, state);
        inner.events.push(ConsentEvent {
            kind,
            patient: patient.clone(),
            provider: provider.clone(),
            position,
        });
        tracing::debug!(?kind, %patient, %provider, block = position.block, "ledger event");
        Ok(Receipt { position })
    }

    fn state(
        &self,
        patient: &Address,
        provider: &Address,
        query: &'static str,
    ) -> Result<GrantState> {
        let inner = self.read()?;
        if inner.state_queries_disabled {
            return Err(LedgerError::Unsupported(query));
        }
        Ok(inner
            .grants
            .get(&(patient.clone(), provider.clone()))
            .copied()
            .unwrap_or_default())
    }

    fn providers_where(
        &self,
        patient: &Address,
        query: &'static str,
        pred: impl Fn(&GrantState) -> bool,
    ) -> Result<Vec<Address>> {
        let inner = self.read()?;
        if inner.state_queries_disabled {
            return Err(LedgerError::Unsupported(query));
        }
        let providers: BTreeSet<Address> = inner
            .grants
            .iter()
            .filter(|((p, _), state)| p == patient && pred(state))
            .map(|((_, provider), _)| provider.clone())
            .collect();
        Ok(providers.into_iter().collect())
    }
}

#[async_trait]
impl ConsentLedger for MemoryLedger {
    type Error = MemoryLedgerError;

    async fn request_full_access(&self, signer: &Wallet, patient: &Address) -> Result<Receipt> {
        self.apply(ConsentEventKind::Requested, patient, signer.address())
    }

    async fn grant(&self, signer: &Wallet, provider: &Address) -> Result<Receipt> {
        self.apply(ConsentEventKind::Granted, signer.address(), provider)
    }

    async fn revoke(&self, signer: &Wallet, provider: &Address) -> Result<Receipt> {
        self.apply(ConsentEventKind::Revoked, signer.address(), provider)
    }

    async fn reject(&self, signer: &Wallet, provider: &Address) -> Result<Receipt> {
        self.apply(ConsentEventKind::Rejected, signer.address(), provider)
    }

    async fn has_access(&self, patient: &Address, provider: &Address) -> Result<bool> {
        Ok(self.state(patient, provider, "hasAccess")?.access)
    }

    async fn is_pending(&self, patient: &Address, provider: &Address) -> Result<bool> {
        Ok(self.state(patient, provider, "isPending")?.pending)
    }

    async fn pending_requests(&self, patient: &Address) -> Result<Vec<Address>> {
        self.providers_where(patient, "getPendingRequests", |s| s.pending)
    }

    async fn granted_providers(&self, patient: &Address) -> Result<Vec<Address>> {
        self.providers_where(patient, "getGrantedProviders", |s| s.access)
    }

    async fn events(&self, filter: &EventFilter) -> Result<Vec<ConsentEvent>> {
        let inner = self.read()?;
        if inner.event_queries_failing {
            return Err(LedgerError::Provider(MemoryLedgerError::Unavailable));
        }
        Ok(inner
            .events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect())
    }
}
