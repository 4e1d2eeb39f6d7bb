//! Consent ledger access and reconciliation
//!
//! The ledger is the source of truth for whether a provider may read a
//! patient's records. [`ConsentLedger`] is the seam to it; [`MemoryLedger`]
//! is an in-process implementation for tests and local runs. The
//! [`ConsentReconciler`] turns whatever the ledger can answer into a status,
//! falling back from direct state queries to event replay.

mod memory;
mod provider;
mod reconciler;

pub use memory::{MemoryLedger, MemoryLedgerError};
pub use provider::{
    ConsentEvent, ConsentEventKind, ConsentLedger, EventFilter, LedgerError, LedgerPosition,
    Receipt,
};
pub use reconciler::{
    effective_access, replay_granted, replay_pending, replay_status, AccessSource,
    ConsentReconciler, ConsentStatus, EffectiveAccess, Resolution, DEFAULT_LEDGER_TIMEOUT,
};
