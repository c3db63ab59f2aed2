//! Backend selection from configuration.

use crate::event::MaintenanceEntry;
use crate::memory::InMemoryLedger;
use crate::model::{CorrectionStrategy, EventReceipt, HistoryKey, HistoryRecord, LedgerCapabilities};
#[cfg(feature = "postgres")]
use crate::postgres::PostgresLedger;
use crate::traits::CustodyLedger;
use crate::verify::{IntegrityReport, IntegrityTarget};
use crate::LedgerResult;
use async_trait::async_trait;
use custody_types::{InventoryItem, ItemId, Transfer, UserId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    /// Upper bound on one integrity check.
    #[serde(default = "default_verification_timeout")]
    pub verification_timeout_secs: u64,

    #[serde(default)]
    pub corrections: CorrectionStrategy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            verification_timeout_secs: default_verification_timeout(),
            corrections: CorrectionStrategy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }
}

/// Which store backs the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory ledger (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL ledger
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_verification_timeout() -> u64 {
    30
}

/// A ledger backend chosen at startup.
pub enum LedgerBackend {
    Memory(InMemoryLedger),
    #[cfg(feature = "postgres")]
    Postgres(PostgresLedger),
}

impl LedgerBackend {
    /// Build the configured backend. Does not run `initialize`.
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        match &config.backend {
            BackendConfig::Memory => {
                if config.corrections != CorrectionStrategy::SideTable {
                    tracing::warn!(
                        corrections = ?config.corrections,
                        "memory ledger records corrections in a side table only"
                    );
                }
                Ok(Self::Memory(InMemoryLedger::new()))
            }
            #[cfg(feature = "postgres")]
            BackendConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                let ledger =
                    PostgresLedger::connect_with_options(url, *max_connections, *connect_timeout_secs)
                        .await?
                        .with_corrections(config.corrections);
                Ok(Self::Postgres(ledger))
            }
            #[cfg(not(feature = "postgres"))]
            BackendConfig::Postgres { .. } => Err(crate::LedgerError::Unimplemented(
                "postgres backend (built without the `postgres` feature)".to_string(),
            )),
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $ledger:ident => $body:expr) => {
        match $self {
            LedgerBackend::Memory($ledger) => $body,
            #[cfg(feature = "postgres")]
            LedgerBackend::Postgres($ledger) => $body,
        }
    };
}

#[async_trait]
impl CustodyLedger for LedgerBackend {
    fn capabilities(&self) -> LedgerCapabilities {
        dispatch!(self, l => l.capabilities())
    }

    async fn initialize(&self) -> LedgerResult<()> {
        dispatch!(self, l => l.initialize().await)
    }

    async fn log_item_creation(
        &self,
        item: &InventoryItem,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt> {
        dispatch!(self, l => l.log_item_creation(item, user_id).await)
    }

    async fn log_transfer_event(
        &self,
        transfer: &Transfer,
        serial_number: &str,
    ) -> LedgerResult<EventReceipt> {
        dispatch!(self, l => l.log_transfer_event(transfer, serial_number).await)
    }

    async fn log_status_change(
        &self,
        item_id: ItemId,
        serial_number: &str,
        old_status: Option<&str>,
        new_status: &str,
        user_id: UserId,
        reason: Option<&str>,
    ) -> LedgerResult<EventReceipt> {
        dispatch!(self, l => {
            l.log_status_change(item_id, serial_number, old_status, new_status, user_id, reason)
                .await
        })
    }

    async fn log_verification_event(
        &self,
        item_id: ItemId,
        serial_number: &str,
        user_id: UserId,
        verification_type: &str,
        notes: Option<&str>,
    ) -> LedgerResult<EventReceipt> {
        dispatch!(self, l => {
            l.log_verification_event(item_id, serial_number, user_id, verification_type, notes)
                .await
        })
    }

    async fn log_maintenance_event(&self, entry: MaintenanceEntry) -> LedgerResult<EventReceipt> {
        dispatch!(self, l => l.log_maintenance_event(entry).await)
    }

    async fn log_correction_event(
        &self,
        original_event_id: &str,
        event_type: &str,
        reason: &str,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt> {
        dispatch!(self, l => {
            l.log_correction_event(original_event_id, event_type, reason, user_id)
                .await
        })
    }

    async fn get_item_history(&self, key: &HistoryKey) -> LedgerResult<Vec<HistoryRecord>> {
        dispatch!(self, l => l.get_item_history(key).await)
    }

    async fn check_integrity(&self, target: &IntegrityTarget) -> LedgerResult<IntegrityReport> {
        dispatch!(self, l => l.check_integrity(target).await)
    }

    async fn close(&self) -> LedgerResult<()> {
        dispatch!(self, l => l.close().await)
    }
}
