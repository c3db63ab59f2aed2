//! Tamper-evident custody event ledger.
//!
//! The ledger records what happened to inventory items: creations, transfers,
//! status changes, physical verifications, maintenance and corrections. It is
//! an audit trail next to the relational store that owns current state, not a
//! replacement for it.
//!
//! - Every event table is append-only and hash-chained.
//! - Vocabulary columns are validated before anything is written.
//! - Backends are chosen from configuration and describe themselves through
//!   [`LedgerCapabilities`].
//! - Integrity checks distinguish "could not check" (`Err`) from "tampered"
//!   (`Ok(false)` / [`Verification::Compromised`]).

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod backend;
mod chain;
mod draft;
mod error;
pub mod event;
mod gate;
mod history;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;
pub mod verify;

pub use backend::{BackendConfig, LedgerBackend, LedgerConfig};
pub use error::{LedgerError, LedgerResult};
pub use event::{
    CorrectionEvent, ItemCreationEvent, ItemStatus, LedgerStamp, MaintenanceEntry,
    MaintenanceEvent, MaintenanceEventType, RecordType, StatusChangeEvent, TransferEvent,
    TransferEventType, VerificationEvent, VerificationStatus, Vocabulary,
};
pub use history::merge_histories;
pub use memory::InMemoryLedger;
pub use model::{
    CorrectionStrategy, EventReceipt, HistoryKey, HistoryRecord, LedgerCapabilities,
    VerificationGranularity,
};
#[cfg(feature = "postgres")]
pub use postgres::PostgresLedger;
pub use traits::CustodyLedger;
pub use verify::{
    IntegrityReport, IntegrityTarget, IntegrityVerifier, TamperFinding, TamperIssue, Verification,
};
