use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::provider::{
    ConsentEvent, ConsentEventKind, ConsentLedger, EventFilter, LedgerError, LedgerPosition,
};
use crate::records::{AccessRequest, AccessRequestStatus};
use crate::wallet::Address;

/// Consent between one patient and one provider
///
/// `Approved` and `Denied` are not terminal: a new request or a grant moves
/// the pair again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStatus {
    NeverRequested,
    Pending,
    Approved,
    Denied,
}

/// A reconciled answer together with how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Straight from the ledger's own state queries
    Ledger(T),
    /// Rebuilt from the event log because state queries were unavailable or
    ///  inconclusive
    Replayed(T),
    /// Neither source answered; carries the last failure
    Unknown(String),
}

impl<T> Resolution<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ledger(value) | Self::Replayed(value) => Some(value),
            Self::Unknown(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ledger(value) | Self::Replayed(value) => Some(value),
            Self::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

#[derive(Default)]
struct Latest {
    requested: Option<LedgerPosition>,
    granted: Option<LedgerPosition>,
    denied: Option<LedgerPosition>,
}

impl Latest {
    fn observe(&mut self, event: &ConsentEvent) {
        let slot = match event.kind {
            kind if kind.is_denial() => &mut self.denied,
            ConsentEventKind::Requested => &mut self.requested,
            _ => &mut self.granted,
        };
        *slot = (*slot).max(Some(event.position));
    }

    fn decision(&self) -> Option<LedgerPosition> {
        self.granted.max(self.denied)
    }

    fn is_granted(&self) -> bool {
        match (self.granted, self.denied) {
            (Some(granted), Some(denied)) => granted > denied,
            (Some(_), None) => true,
            _ => false,
        }
    }

    fn is_pending(&self) -> bool {
        match (self.requested, self.decision()) {
            (Some(requested), Some(decision)) => requested > decision,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Derive a pair's status from its events
///
/// The latest grant is compared against the latest revocation or rejection.
/// A request newer than both does not make the pair pending here: replay only
/// decides between never-requested, approved and denied.
pub fn replay_status(events: &[ConsentEvent]) -> ConsentStatus {
    let mut latest = Latest::default();
    events.iter().for_each(|event| latest.observe(event));

    if latest.requested.is_none() {
        return ConsentStatus::NeverRequested;
    }
    if latest.is_granted() {
        ConsentStatus::Approved
    } else {
        ConsentStatus::Denied
    }
}

fn latest_by_provider(events: &[ConsentEvent]) -> BTreeMap<&Address, Latest> {
    let mut by_provider: BTreeMap<&Address, Latest> = BTreeMap::new();
    for event in events {
        by_provider.entry(&event.provider).or_default().observe(event);
    }
    by_provider
}

/// Providers whose latest grant is newer than their latest revocation/rejection
pub fn replay_granted(events: &[ConsentEvent]) -> Vec<Address> {
    latest_by_provider(events)
        .into_iter()
        .filter(|(_, latest)| latest.is_granted())
        .map(|(provider, _)| provider.clone())
        .collect()
}

/// Providers whose latest request is newer than any decision on it
pub fn replay_pending(events: &[ConsentEvent]) -> Vec<Address> {
    latest_by_provider(events)
        .into_iter()
        .filter(|(_, latest)| latest.is_pending())
        .map(|(provider, _)| provider.clone())
        .collect()
}

/// Reads consent state from a ledger, tolerating partial failure
///
/// Nothing here returns an error: a failing direct query falls through to
/// replay, and a failing replay becomes [`Resolution::Unknown`].
#[derive(Debug, Clone)]
pub struct ConsentReconciler<L> {
    ledger: L,
    call_timeout: Duration,
}

/// Upper bound on any single ledger read
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(10);

impl<L: ConsentLedger> ConsentReconciler<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            call_timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, LedgerError<L::Error>>>,
    ) -> Result<T, LedgerError<L::Error>> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(LedgerError::Timeout(self.call_timeout)))
    }

    pub async fn status(&self, patient: &Address, provider: &Address) -> Resolution<ConsentStatus> {
        let direct = tokio::try_join!(
            self.bounded(self.ledger.has_access(patient, provider)),
            self.bounded(self.ledger.is_pending(patient, provider)),
        );

        match direct {
            Ok((true, _)) => return Resolution::Ledger(ConsentStatus::Approved),
            Ok((false, true)) => return Resolution::Ledger(ConsentStatus::Pending),
            Ok((false, false)) => {}
            Err(e) => {
                tracing::warn!(
                    %patient,
                    %provider,
                    error = %e,
                    "direct consent query failed, replaying events"
                );
            }
        }

        let events = self
            .bounded(self.ledger.events(&EventFilter::pair(patient, provider)))
            .await;
        match events {
            Ok(events) => Resolution::Replayed(replay_status(&events)),
            Err(e) => {
                tracing::warn!(%patient, %provider, error = %e, "consent event replay failed");
                Resolution::Unknown(e.to_string())
            }
        }
    }

    pub async fn granted_providers(&self, patient: &Address) -> Resolution<Vec<Address>> {
        match self.bounded(self.ledger.granted_providers(patient)).await {
            Ok(providers) => return Resolution::Ledger(sorted(providers)),
            Err(e) => {
                tracing::warn!(
                    %patient,
                    error = %e,
                    "granted providers query failed, replaying events"
                );
            }
        }
        match self.bounded(self.ledger.events(&EventFilter::patient(patient))).await {
            Ok(events) => Resolution::Replayed(replay_granted(&events)),
            Err(e) => {
                tracing::warn!(%patient, error = %e, "consent event replay failed");
                Resolution::Unknown(e.to_string())
            }
        }
    }

    pub async fn pending_requests(&self, patient: &Address) -> Resolution<Vec<Address>> {
        match self.bounded(self.ledger.pending_requests(patient)).await {
            Ok(providers) => return Resolution::Ledger(sorted(providers)),
            Err(e) => {
                tracing::warn!(
                    %patient,
                    error = %e,
                    "pending requests query failed, replaying events"
                );
            }
        }
        match self.bounded(self.ledger.events(&EventFilter::patient(patient))).await {
            Ok(events) => Resolution::Replayed(replay_pending(&events)),
            Err(e) => {
                tracing::warn!(%patient, error = %e, "consent event replay failed");
                Resolution::Unknown(e.to_string())
            }
        }
    }
}

fn sorted(providers: Vec<Address>) -> Vec<Address> {
    providers
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessSource {
    Ledger,
    Replayed,
    /// The off-chain request record, used only because the ledger was silent
    OffChainCache,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveAccess {
    pub status: Option<ConsentStatus>,
    pub source: AccessSource,
}

/// Merge a ledger resolution with the off-chain access request
///
/// Whatever the ledger produced wins. The off-chain status is only consulted
/// when the ledger is unknown, and the result says so.
pub fn effective_access(
    ledger: &Resolution<ConsentStatus>,
    off_chain: Option<&AccessRequest>,
) -> EffectiveAccess {
    match ledger {
        Resolution::Ledger(status) => EffectiveAccess {
            status: Some(*status),
            source: AccessSource::Ledger,
        },
        Resolution::Replayed(status) => EffectiveAccess {
            status: Some(*status),
            source: AccessSource::Replayed,
        },
        Resolution::Unknown(_) => match off_chain {
            Some(request) => EffectiveAccess {
                status: Some(match request.status {
                    AccessRequestStatus::Pending => ConsentStatus::Pending,
                    AccessRequestStatus::Approved => ConsentStatus::Approved,
                    AccessRequestStatus::Rejected => ConsentStatus::Denied,
                }),
                source: AccessSource::OffChainCache,
            },
            None => EffectiveAccess {
                status: None,
                source: AccessSource::Unknown,
            },
        },
    }
}
