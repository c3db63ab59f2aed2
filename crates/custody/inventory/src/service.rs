//! Custody operations with best-effort ledger forwarding.
//!
//! Primary operations commit to the [`InventoryStore`] first, then log to the
//! ledger. A ledger failure after a successful commit does not fail the
//! operation: it is logged and returned as [`Logged::ledger_warning`] so an
//! operator can reconcile the gap. Ledger-only operations propagate errors.

use crate::store::InventoryStore;
use crate::ServiceResult;
use chrono::Utc;
use custody_ledger::{
    CustodyLedger, EventReceipt, HistoryKey, HistoryRecord, IntegrityVerifier, LedgerResult,
    MaintenanceEntry, TransferEventType, Verification, Vocabulary,
};
use custody_types::{
    InventoryItem, ItemId, NewInventoryItem, NewTransfer, Transfer, TransferId, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A committed primary record plus the outcome of its ledger write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Logged<T> {
    pub value: T,
    /// Set when the record committed but its ledger event did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_warning: Option<String>,
}

impl<T> Logged<T> {
    pub fn is_recorded(&self) -> bool {
        self.ledger_warning.is_none()
    }
}

/// Orchestrates the relational store and the ledger.
pub struct CustodyService {
    store: Arc<dyn InventoryStore>,
    ledger: Arc<dyn CustodyLedger>,
    verifier: IntegrityVerifier,
}

impl CustodyService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        ledger: Arc<dyn CustodyLedger>,
        verification_timeout: Duration,
    ) -> Self {
        let verifier = IntegrityVerifier::new(Arc::clone(&ledger), verification_timeout);
        Self {
            store,
            ledger,
            verifier,
        }
    }

    pub async fn create_item(
        &self,
        item: NewInventoryItem,
        user_id: UserId,
    ) -> ServiceResult<Logged<InventoryItem>> {
        let item = self.store.insert_item(item).await?;
        let outcome = self.ledger.log_item_creation(&item, user_id).await;
        Ok(forward(item.id, "item creation", item, outcome))
    }

    pub async fn update_item_status(
        &self,
        item_id: ItemId,
        status: &str,
        user_id: UserId,
        reason: Option<&str>,
    ) -> ServiceResult<Logged<InventoryItem>> {
        let (item, previous) = self.store.set_item_status(item_id, status).await?;
        let outcome = self
            .ledger
            .log_status_change(
                item.id,
                &item.serial_number,
                Some(previous.as_str()),
                &item.status,
                user_id,
                reason,
            )
            .await;
        Ok(forward(item.id, "status change", item, outcome))
    }

    /// Open a transfer. The ledger records `from_user_id` as the initiating
    /// user; `user_id` is only traced.
    pub async fn create_transfer(
        &self,
        transfer: NewTransfer,
        user_id: UserId,
    ) -> ServiceResult<Logged<Transfer>> {
        let item = self.store.get_item(transfer.item_id).await?;
        let transfer = self.store.insert_transfer(transfer).await?;
        tracing::debug!(transfer_id = transfer.id, requested_by = user_id, "transfer created");
        let outcome = self
            .ledger
            .log_transfer_event(&transfer, &item.serial_number)
            .await;
        Ok(forward(item.id, "transfer", transfer, outcome))
    }

    /// Move a transfer to `status`. Approval records `user_id` as approver;
    /// every stage after `Requested` stamps the resolution time.
    pub async fn update_transfer_status(
        &self,
        transfer_id: TransferId,
        status: &str,
        notes: Option<String>,
        user_id: UserId,
    ) -> ServiceResult<Logged<Transfer>> {
        let mut transfer = self.store.get_transfer(transfer_id).await?;
        let item = self.store.get_item(transfer.item_id).await?;

        transfer.status = status.to_string();
        if notes.is_some() {
            transfer.notes = notes;
        }
        let stage = TransferEventType::parse(status).ok();
        transfer.resolved_at = match stage {
            Some(
                TransferEventType::Approved
                | TransferEventType::Rejected
                | TransferEventType::Completed
                | TransferEventType::Cancelled,
            ) => Some(Utc::now()),
            _ => None,
        };
        if stage == Some(TransferEventType::Approved) {
            transfer.approved_by = Some(user_id);
        }

        let transfer = self.store.save_transfer(transfer).await?;
        let outcome = self
            .ledger
            .log_transfer_event(&transfer, &item.serial_number)
            .await;
        Ok(forward(item.id, "transfer", transfer, outcome))
    }

    pub async fn record_verification(
        &self,
        item_id: ItemId,
        user_id: UserId,
        verification_type: &str,
        notes: Option<&str>,
    ) -> ServiceResult<EventReceipt> {
        let item = self.store.get_item(item_id).await?;
        Ok(self
            .ledger
            .log_verification_event(item.id, &item.serial_number, user_id, verification_type, notes)
            .await?)
    }

    pub async fn record_maintenance(&self, entry: MaintenanceEntry) -> ServiceResult<EventReceipt> {
        self.store.get_item(entry.item_id).await?;
        Ok(self.ledger.log_maintenance_event(entry).await?)
    }

    pub async fn record_correction(
        &self,
        original_event_id: &str,
        event_type: &str,
        reason: &str,
        user_id: UserId,
    ) -> ServiceResult<EventReceipt> {
        Ok(self
            .ledger
            .log_correction_event(original_event_id, event_type, reason, user_id)
            .await?)
    }

    pub async fn item_history(&self, key: &HistoryKey) -> ServiceResult<Vec<HistoryRecord>> {
        Ok(self.ledger.get_item_history(key).await?)
    }

    /// Bounded integrity check over the scope named by `(document_id, table_name)`.
    pub async fn ledger_status(
        &self,
        document_id: &str,
        table_name: &str,
    ) -> ServiceResult<Verification> {
        Ok(self.verifier.verify(document_id, table_name).await?)
    }
}

fn forward<T>(
    item_id: ItemId,
    event: &'static str,
    value: T,
    outcome: LedgerResult<EventReceipt>,
) -> Logged<T> {
    match outcome {
        Ok(receipt) => {
            tracing::debug!(item_id, event, sequence = receipt.sequence, "ledger write confirmed");
            Logged {
                value,
                ledger_warning: None,
            }
        }
        Err(err) => {
            tracing::warn!(
                item_id,
                event,
                error = %err,
                "primary record committed but ledger write failed"
            );
            Logged {
                value,
                ledger_warning: Some(format!("{event} not recorded in ledger: {err}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;
    use custody_ledger::{InMemoryLedger, RecordType};

    fn service() -> (CustodyService, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = CustodyService::new(
            Arc::new(InMemoryInventoryStore::new()),
            ledger.clone(),
            Duration::from_secs(30),
        );
        (service, ledger)
    }

    fn rifle(serial: &str) -> NewInventoryItem {
        NewInventoryItem {
            name: "M4 Carbine".to_string(),
            serial_number: serial.to_string(),
            description: None,
            category: Some("Weapons".to_string()),
            status: "Operational".to_string(),
            assigned_user_id: Some(7),
        }
    }

    #[tokio::test]
    async fn transfer_approval_stamps_approver_and_resolution() {
        let (service, ledger) = service();
        let item = service.create_item(rifle("W-1"), 7).await.unwrap().value;
        let transfer = service
            .create_transfer(
                NewTransfer {
                    item_id: item.id,
                    from_user_id: 7,
                    to_user_id: 8,
                    status: "Requested".to_string(),
                    notes: None,
                },
                7,
            )
            .await
            .unwrap();
        assert!(transfer.is_recorded());
        assert!(transfer.value.resolved_at.is_none());

        let approved = service
            .update_transfer_status(transfer.value.id, "Approved", None, 11)
            .await
            .unwrap();
        assert!(approved.is_recorded());
        assert_eq!(approved.value.approved_by, Some(11));
        assert!(approved.value.resolved_at.is_some());

        let events = ledger.events(RecordType::Transfer).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_transfer_is_resolved() {
        let (service, _) = service();
        let item = service.create_item(rifle("W-5"), 7).await.unwrap().value;
        let transfer = service
            .create_transfer(
                NewTransfer {
                    item_id: item.id,
                    from_user_id: 7,
                    to_user_id: 8,
                    status: "Requested".to_string(),
                    notes: None,
                },
                7,
            )
            .await
            .unwrap()
            .value;

        let cancelled = service
            .update_transfer_status(transfer.id, "Cancelled", Some("unit redeployed".into()), 7)
            .await
            .unwrap();
        assert!(cancelled.is_recorded());
        assert!(cancelled.value.resolved_at.is_some());
        assert_eq!(cancelled.value.approved_by, None);
    }

    #[test]
    fn warning_is_omitted_when_recorded() {
        let recorded = Logged {
            value: 1,
            ledger_warning: None,
        };
        assert_eq!(
            serde_json::to_value(&recorded).unwrap(),
            serde_json::json!({ "value": 1 })
        );

        let gap = Logged {
            value: 1,
            ledger_warning: Some("transfer not recorded in ledger".to_string()),
        };
        let json = serde_json::to_value(&gap).unwrap();
        assert_eq!(json["ledger_warning"], "transfer not recorded in ledger");
    }

    #[tokio::test]
    async fn out_of_vocabulary_status_commits_with_warning() {
        let (service, ledger) = service();
        let item = service.create_item(rifle("W-2"), 7).await.unwrap().value;
        let updated = service
            .update_item_status(item.id, "Misplaced", 7, None)
            .await
            .unwrap();
        assert_eq!(updated.value.status, "Misplaced");
        assert!(updated.ledger_warning.is_some());
        assert!(ledger.events(RecordType::StatusChange).unwrap().is_empty());
    }

    #[tokio::test]
    async fn ledger_only_operations_propagate() {
        let (service, _) = service();
        let item = service.create_item(rifle("W-3"), 7).await.unwrap().value;
        let err = service
            .record_verification(item.id, 7, "Looked at it", None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::ServiceError::Ledger(_)));
    }

    #[tokio::test]
    async fn status_reports_intact_ledger() {
        let (service, _) = service();
        service.create_item(rifle("W-4"), 7).await.unwrap();
        assert!(service.ledger_status("N/A", "N/A").await.unwrap().is_intact());
    }
}
