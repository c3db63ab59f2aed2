//! Custody service: the relational system of record plus ledger forwarding.
//!
//! The store and the ledger are written in sequence without a distributed
//! transaction. Ledger writes are at-most-once and best-effort for primary
//! operations; gaps surface as warnings rather than failures.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod service;
pub mod store;

pub use error::{ServiceError, ServiceResult, StoreError, StoreResult};
pub use service::{CustodyService, Logged};
pub use store::{InMemoryInventoryStore, InventoryStore};
