//! In-memory ledger backend.
//!
//! Events are kept per table, hash-chained exactly as the durable backend
//! chains them, so validation, ordering and integrity checks behave the same
//! under test. Nothing survives the process.

use crate::chain::{seal, verify_chain};
use crate::event::{MaintenanceEntry, RecordType, Vocabulary};
use crate::gate::ShutdownGate;
use crate::history::HistoryReconstructor;
use crate::model::{
    CorrectionStrategy, EventReceipt, HistoryKey, HistoryRecord, LedgerCapabilities,
    VerificationGranularity,
};
use crate::traits::{CustodyLedger, EventTables};
use crate::verify::{IntegrityReport, IntegrityTarget};
use crate::{draft, LedgerError, LedgerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custody_types::{InventoryItem, ItemId, Transfer, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Default)]
struct Tables {
    by_type: HashMap<RecordType, Vec<HistoryRecord>>,
    /// Latest timestamp handed out across all tables.
    last_recorded_at: Option<DateTime<Utc>>,
}

/// Process-local ledger for development and tests.
#[derive(Default)]
pub struct InMemoryLedger {
    gate: ShutdownGate,
    tables: RwLock<Tables>,
    initialized: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one table in append order.
    pub fn events(&self, record_type: RecordType) -> LedgerResult<Vec<HistoryRecord>> {
        let guard = self.read_tables()?;
        Ok(guard
            .by_type
            .get(&record_type)
            .cloned()
            .unwrap_or_default())
    }

    /// Total number of events across all tables.
    pub fn len(&self) -> LedgerResult<usize> {
        let guard = self.read_tables()?;
        Ok(guard.by_type.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read_tables(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| LedgerError::Read("ledger tables lock poisoned".to_string()))
    }

    async fn append(&self, mut record: HistoryRecord) -> LedgerResult<EventReceipt> {
        let _pass = self.gate.enter().await?;
        let receipt = {
            let mut guard = self
                .tables
                .write()
                .map_err(|_| LedgerError::Write("ledger tables lock poisoned".to_string()))?;
            let now = Utc::now();
            let recorded_at = guard.last_recorded_at.map_or(now, |last| last.max(now));
            *record.recorded_at_mut() = recorded_at;

            let table = guard.by_type.entry(record.record_type()).or_default();
            seal(&mut record, table.last().map(HistoryRecord::stamp))?;
            let receipt = record.receipt();
            let item_id = record.item_id();
            table.push(record);
            guard.last_recorded_at = Some(recorded_at);
            (receipt, item_id)
        };
        let (receipt, item_id) = receipt;

        tracing::info!(
            item_id = ?item_id,
            event_type = receipt.record_type.as_str(),
            event_id = %receipt.event_id,
            sequence = receipt.sequence,
            "ledger event recorded"
        );
        Ok(receipt)
    }

    #[cfg(test)]
    pub(crate) fn tamper_with(
        &self,
        record_type: RecordType,
        index: usize,
        edit: impl FnOnce(&mut Vec<HistoryRecord>, usize),
    ) {
        let mut guard = self.tables.write().unwrap();
        let table = guard.by_type.entry(record_type).or_default();
        edit(table, index);
    }
}

#[async_trait]
impl EventTables for InMemoryLedger {
    async fn items_with_serial(&self, serial_number: &str) -> LedgerResult<Vec<ItemId>> {
        let guard = self.read_tables()?;
        let mut ids: Vec<ItemId> = RecordType::ITEM_EVENTS
            .iter()
            .filter_map(|t| guard.by_type.get(t))
            .flatten()
            .filter(|record| record.serial_number() == Some(serial_number))
            .filter_map(HistoryRecord::item_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn item_events(
        &self,
        record_type: RecordType,
        item_id: ItemId,
    ) -> LedgerResult<Vec<HistoryRecord>> {
        let guard = self.read_tables()?;
        Ok(guard
            .by_type
            .get(&record_type)
            .map(|table| {
                table
                    .iter()
                    .filter(|record| record.item_id() == Some(item_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn corrections_for(&self, event_ids: &[String]) -> LedgerResult<Vec<HistoryRecord>> {
        let guard = self.read_tables()?;
        Ok(guard
            .by_type
            .get(&RecordType::Correction)
            .map(|table| {
                table
                    .iter()
                    .filter(|record| match record {
                        HistoryRecord::Correction(c) => event_ids.contains(&c.original_event_id),
                        _ => false,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CustodyLedger for InMemoryLedger {
    fn capabilities(&self) -> LedgerCapabilities {
        LedgerCapabilities {
            backend: "memory",
            verification: VerificationGranularity::Store,
            corrections: CorrectionStrategy::SideTable,
            server_timestamps: false,
            durable: false,
        }
    }

    async fn initialize(&self) -> LedgerResult<()> {
        let _pass = self.gate.enter().await?;
        let mut guard = self
            .tables
            .write()
            .map_err(|_| LedgerError::Write("ledger tables lock poisoned".to_string()))?;
        for record_type in RecordType::ALL {
            guard.by_type.entry(*record_type).or_default();
        }
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::info!(backend = "memory", "ledger initialized");
        }
        Ok(())
    }

    async fn log_item_creation(
        &self,
        item: &InventoryItem,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt> {
        self.append(draft::item_creation(item, user_id)).await
    }

    async fn log_transfer_event(
        &self,
        transfer: &Transfer,
        serial_number: &str,
    ) -> LedgerResult<EventReceipt> {
        self.append(draft::transfer(transfer, serial_number)?).await
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
        let record =
            draft::status_change(item_id, serial_number, old_status, new_status, user_id, reason)?;
        self.append(record).await
    }

    async fn log_verification_event(
        &self,
        item_id: ItemId,
        serial_number: &str,
        user_id: UserId,
        verification_type: &str,
        notes: Option<&str>,
    ) -> LedgerResult<EventReceipt> {
        let record =
            draft::verification(item_id, serial_number, user_id, verification_type, notes)?;
        self.append(record).await
    }

    async fn log_maintenance_event(&self, entry: MaintenanceEntry) -> LedgerResult<EventReceipt> {
        self.append(draft::maintenance(entry)?).await
    }

    async fn log_correction_event(
        &self,
        original_event_id: &str,
        event_type: &str,
        reason: &str,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt> {
        let record = draft::correction(original_event_id, event_type, reason, user_id)?;
        self.append(record).await
    }

    async fn get_item_history(&self, key: &HistoryKey) -> LedgerResult<Vec<HistoryRecord>> {
        let _pass = self.gate.enter().await?;
        HistoryReconstructor::new(self).reconstruct(key).await
    }

    async fn check_integrity(&self, target: &IntegrityTarget) -> LedgerResult<IntegrityReport> {
        let _pass = self.gate.enter().await?;
        let guard = self.read_tables()?;
        let mut checked_entries = 0;
        let mut findings = Vec::new();

        for table in target.tables() {
            let rows = guard.by_type.get(&table).map(Vec::as_slice).unwrap_or(&[]);
            match target {
                IntegrityTarget::Document { event_id, .. } => {
                    let position = rows
                        .iter()
                        .position(|r| r.event_id() == event_id)
                        .ok_or_else(|| {
                            LedgerError::InvalidInput(format!(
                                "event {event_id} not found in {}",
                                table.table_name()
                            ))
                        })?;
                    let anchor = position.checked_sub(1).map(|p| rows[p].stamp());
                    findings.extend(verify_chain(table, anchor, &rows[position..=position])?);
                    checked_entries += 1;
                }
                IntegrityTarget::Store | IntegrityTarget::Table { .. } => {
                    findings.extend(verify_chain(table, None, rows)?);
                    checked_entries += rows.len();
                }
            }
        }

        Ok(IntegrityReport {
            target: target.clone(),
            checked_entries,
            findings,
        })
    }

    async fn close(&self) -> LedgerResult<()> {
        if self.gate.close().await {
            tracing::info!(backend = "memory", "ledger closed");
        }
        Ok(())
    }
}
