use crate::event::{MaintenanceEntry, RecordType};
use crate::model::{EventReceipt, HistoryKey, HistoryRecord, LedgerCapabilities};
use crate::verify::{IntegrityReport, IntegrityTarget};
use crate::LedgerResult;
use async_trait::async_trait;
use custody_types::{InventoryItem, ItemId, Transfer, UserId};

/// The event-logging contract every ledger backend implements.
///
/// Logging operations validate their vocabulary arguments before writing and
/// return [`crate::LedgerError::Validation`] without side effects when a value
/// is outside its set. Nothing here is transactional with the relational
/// store that owns current item state.
#[async_trait]
pub trait CustodyLedger: Send + Sync {
    /// Static description of what this backend supports.
    fn capabilities(&self) -> LedgerCapabilities;

    /// Backend setup. Idempotent.
    async fn initialize(&self) -> LedgerResult<()>;

    /// Record that `item` entered the inventory. Uniqueness is not checked.
    async fn log_item_creation(
        &self,
        item: &InventoryItem,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt>;

    /// Record the transfer's current status as a transfer event.
    async fn log_transfer_event(
        &self,
        transfer: &Transfer,
        serial_number: &str,
    ) -> LedgerResult<EventReceipt>;

    /// Record a status change. `new_status` must be an [`crate::ItemStatus`].
    async fn log_status_change(
        &self,
        item_id: ItemId,
        serial_number: &str,
        old_status: Option<&str>,
        new_status: &str,
        user_id: UserId,
        reason: Option<&str>,
    ) -> LedgerResult<EventReceipt>;

    /// Record a physical verification. `verification_type` must be a
    /// [`crate::VerificationStatus`].
    async fn log_verification_event(
        &self,
        item_id: ItemId,
        serial_number: &str,
        user_id: UserId,
        verification_type: &str,
        notes: Option<&str>,
    ) -> LedgerResult<EventReceipt>;

    /// Record a maintenance stage. A performing user is kept only for
    /// `Started` and `Completed`.
    async fn log_maintenance_event(&self, entry: MaintenanceEntry) -> LedgerResult<EventReceipt>;

    /// Record an annotation against an earlier event. `event_type` names the
    /// original event's [`RecordType`].
    async fn log_correction_event(
        &self,
        original_event_id: &str,
        event_type: &str,
        reason: &str,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt>;

    /// Every event for one item, ascending by timestamp. Empty when none exist.
    async fn get_item_history(&self, key: &HistoryKey) -> LedgerResult<Vec<HistoryRecord>>;

    /// Run the backend's tamper check over `target`.
    ///
    /// A completed check that finds damage is `Ok` with findings; `Err` means
    /// the check itself did not complete.
    async fn check_integrity(&self, target: &IntegrityTarget) -> LedgerResult<IntegrityReport>;

    /// `Ok(true)` when no tampering was found, `Ok(false)` when the check ran
    /// and found some. Requests finer than the backend's granularity are
    /// widened to what it can check.
    async fn verify_document(&self, document_id: &str, table_name: &str) -> LedgerResult<bool> {
        let target = IntegrityTarget::parse(document_id, table_name)?
            .widen_to(self.capabilities().verification);
        Ok(self.check_integrity(&target).await?.is_intact())
    }

    /// Release backend resources after in-flight calls drain. A second call
    /// is a no-op.
    async fn close(&self) -> LedgerResult<()>;
}

/// Per-table reads a backend exposes to the history reconstructor.
#[async_trait]
pub(crate) trait EventTables: Send + Sync {
    /// Item ids whose serial-bearing events carry `serial_number`.
    async fn items_with_serial(&self, serial_number: &str) -> LedgerResult<Vec<ItemId>>;

    /// One table's events for one item, ordered by sequence.
    async fn item_events(
        &self,
        record_type: RecordType,
        item_id: ItemId,
    ) -> LedgerResult<Vec<HistoryRecord>>;

    /// Corrections whose original event is one of `event_ids`, ordered by sequence.
    async fn corrections_for(&self, event_ids: &[String]) -> LedgerResult<Vec<HistoryRecord>>;
}
