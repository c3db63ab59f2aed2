//! Primary writes survive ledger outages; ledger-only writes do not hide them.

use async_trait::async_trait;
use custody_inventory::{CustodyService, InMemoryInventoryStore, InventoryStore, ServiceError};
use custody_ledger::{
    CorrectionStrategy, CustodyLedger, EventReceipt, HistoryKey, HistoryRecord, IntegrityReport,
    IntegrityTarget, LedgerCapabilities, LedgerError, LedgerResult, MaintenanceEntry,
    VerificationGranularity,
};
use custody_types::{InventoryItem, ItemId, NewInventoryItem, NewTransfer, Transfer, UserId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ledger whose backend is unreachable for every call.
#[derive(Default)]
struct UnreachableLedger {
    attempts: AtomicUsize,
}

impl UnreachableLedger {
    fn fail<T>(&self) -> LedgerResult<T> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError::Connectivity("connection refused".to_string()))
    }
}

#[async_trait]
impl CustodyLedger for UnreachableLedger {
    fn capabilities(&self) -> LedgerCapabilities {
        LedgerCapabilities {
            backend: "unreachable",
            verification: VerificationGranularity::Store,
            corrections: CorrectionStrategy::SideTable,
            server_timestamps: true,
            durable: true,
        }
    }

    async fn initialize(&self) -> LedgerResult<()> {
        self.fail()
    }

    async fn log_item_creation(&self, _: &InventoryItem, _: UserId) -> LedgerResult<EventReceipt> {
        self.fail()
    }

    async fn log_transfer_event(&self, _: &Transfer, _: &str) -> LedgerResult<EventReceipt> {
        self.fail()
    }

    async fn log_status_change(
        &self,
        _: ItemId,
        _: &str,
        _: Option<&str>,
        _: &str,
        _: UserId,
        _: Option<&str>,
    ) -> LedgerResult<EventReceipt> {
        self.fail()
    }

    async fn log_verification_event(
        &self,
        _: ItemId,
        _: &str,
        _: UserId,
        _: &str,
        _: Option<&str>,
    ) -> LedgerResult<EventReceipt> {
        self.fail()
    }

    async fn log_maintenance_event(&self, _: MaintenanceEntry) -> LedgerResult<EventReceipt> {
        self.fail()
    }

    async fn log_correction_event(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: UserId,
    ) -> LedgerResult<EventReceipt> {
        self.fail()
    }

    async fn get_item_history(&self, _: &HistoryKey) -> LedgerResult<Vec<HistoryRecord>> {
        self.fail()
    }

    async fn check_integrity(&self, _: &IntegrityTarget) -> LedgerResult<IntegrityReport> {
        self.fail()
    }

    async fn close(&self) -> LedgerResult<()> {
        Ok(())
    }
}

struct Harness {
    service: CustodyService,
    store: Arc<InMemoryInventoryStore>,
    ledger: Arc<UnreachableLedger>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryInventoryStore::new());
    let ledger = Arc::new(UnreachableLedger::default());
    let service = CustodyService::new(store.clone(), ledger.clone(), Duration::from_secs(5));
    Harness {
        service,
        store,
        ledger,
    }
}

fn radio() -> NewInventoryItem {
    NewInventoryItem {
        name: "AN/PRC-117G".to_string(),
        serial_number: "SN123".to_string(),
        description: Some("Manpack radio".to_string()),
        category: Some("Communications".to_string()),
        status: "Operational".to_string(),
        assigned_user_id: Some(7),
    }
}

#[tokio::test]
async fn primary_operations_commit_with_warning() {
    let h = harness();

    let created = h.service.create_item(radio(), 7).await.unwrap();
    assert!(!created.is_recorded());
    assert!(created
        .ledger_warning
        .as_deref()
        .unwrap()
        .contains("connection refused"));
    let item = h.store.get_item(created.value.id).await.unwrap();
    assert_eq!(item.serial_number, "SN123");

    let updated = h
        .service
        .update_item_status(item.id, "Damaged", 7, Some("dropped"))
        .await
        .unwrap();
    assert!(updated.ledger_warning.is_some());
    assert_eq!(h.store.get_item(item.id).await.unwrap().status, "Damaged");

    let transfer = h
        .service
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
    assert!(transfer.ledger_warning.is_some());
    assert!(h.store.get_transfer(transfer.value.id).await.is_ok());

    assert_eq!(h.ledger.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn ledger_writes_are_not_retried() {
    let h = harness();
    h.service.create_item(radio(), 7).await.unwrap();
    assert_eq!(h.ledger.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ledger_only_operations_surface_failure() {
    let h = harness();
    let item = h.service.create_item(radio(), 7).await.unwrap().value;

    let err = h
        .service
        .record_verification(item.id, 7, "Verified Present", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Ledger(LedgerError::Connectivity(_))
    ));

    let err = h
        .service
        .record_correction("ev-1", "StatusChange", "wrong status", 7)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Ledger(_)));

    assert!(h.service.item_history(&HistoryKey::ItemId(item.id)).await.is_err());
}

#[tokio::test]
async fn unreachable_verification_is_not_tampering() {
    let h = harness();
    let err = h.service.ledger_status("N/A", "N/A").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Ledger(LedgerError::Connectivity(_))
    ));
}

#[tokio::test]
async fn store_failure_skips_ledger() {
    let h = harness();
    let err = h
        .service
        .update_item_status(404, "Lost", 7, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Store(_)));
    assert_eq!(h.ledger.attempts.load(Ordering::SeqCst), 0);
}
