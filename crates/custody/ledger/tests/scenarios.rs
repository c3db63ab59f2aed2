//! Ledger contract scenarios played against the in-memory backend.

use chrono::Utc;
use custody_ledger::{
    CustodyLedger, HistoryKey, HistoryRecord, InMemoryLedger, IntegrityVerifier, ItemStatus,
    LedgerError, MaintenanceEntry, RecordType, Verification,
};
use custody_types::{InventoryItem, Transfer};
use std::sync::Arc;
use std::time::Duration;

fn item(id: u64, serial: &str) -> InventoryItem {
    InventoryItem {
        id,
        name: "AN/PRC-152 Radio".to_string(),
        serial_number: serial.to_string(),
        description: None,
        category: Some("Communications".to_string()),
        status: "Operational".to_string(),
        assigned_user_id: Some(7),
        assigned_at: None,
        created_at: Utc::now(),
    }
}

fn transfer(item_id: u64, status: &str) -> Transfer {
    Transfer {
        id: 900,
        item_id,
        from_user_id: 7,
        to_user_id: 8,
        status: status.to_string(),
        approved_by: None,
        requested_at: Utc::now(),
        resolved_at: None,
        notes: None,
    }
}

async fn ready_ledger() -> InMemoryLedger {
    let ledger = InMemoryLedger::new();
    ledger.initialize().await.unwrap();
    ledger
}

fn assert_non_decreasing(history: &[HistoryRecord]) {
    assert!(history
        .windows(2)
        .all(|w| w[0].recorded_at() <= w[1].recorded_at()));
}

#[tokio::test]
async fn creation_then_status_changes() {
    let ledger = ready_ledger().await;
    let key = HistoryKey::from("SN123");

    ledger.log_item_creation(&item(1, "SN123"), 7).await.unwrap();
    let history = ledger.get_item_history(&key).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].record_type(), RecordType::ItemCreation);

    ledger
        .log_status_change(1, "SN123", Some("Operational"), "Damaged", 7, None)
        .await
        .unwrap();
    let history = ledger.get_item_history(&key).await.unwrap();
    assert_eq!(history.len(), 2);
    match &history[1] {
        HistoryRecord::StatusChange(event) => assert_eq!(event.new_status, ItemStatus::Damaged),
        other => panic!("expected status change, got {other:?}"),
    }

    let err = ledger
        .log_status_change(1, "SN123", Some("Damaged"), "Bogus", 7, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
    assert_eq!(ledger.get_item_history(&key).await.unwrap(), history);
}

#[tokio::test]
async fn pending_transfer_is_rejected() {
    let ledger = ready_ledger().await;
    let err = ledger
        .log_transfer_event(&transfer(1, "Pending"), "SN123")
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(ledger.is_empty().unwrap());
}

#[tokio::test]
async fn out_of_vocabulary_writes_leave_history_unchanged() {
    let ledger = ready_ledger().await;
    ledger.log_item_creation(&item(2, "SN200"), 7).await.unwrap();
    let before = ledger.get_item_history(&HistoryKey::ItemId(2)).await.unwrap();

    assert!(ledger
        .log_verification_event(2, "SN200", 7, "verified present", None)
        .await
        .unwrap_err()
        .is_validation());
    assert!(ledger
        .log_maintenance_event(MaintenanceEntry {
            maintenance_record_id: "MR-1".to_string(),
            item_id: 2,
            initiating_user: 7,
            performing_user: None,
            event_type: "Paused".to_string(),
            maintenance_type: None,
            description: String::new(),
        })
        .await
        .unwrap_err()
        .is_validation());
    assert!(ledger
        .log_transfer_event(&transfer(2, "Accepted"), "SN200")
        .await
        .unwrap_err()
        .is_validation());

    assert_eq!(
        ledger.get_item_history(&HistoryKey::ItemId(2)).await.unwrap(),
        before
    );
}

#[tokio::test]
async fn initialize_twice_has_no_side_effects() {
    let ledger = ready_ledger().await;
    ledger.log_item_creation(&item(3, "SN300"), 7).await.unwrap();
    ledger.initialize().await.unwrap();
    assert_eq!(ledger.len().unwrap(), 1);
}

#[tokio::test]
async fn fresh_ledger_verifies_clean() {
    let ledger = ready_ledger().await;
    assert!(ledger.verify_document("N/A", "N/A").await.unwrap());

    let ledger: Arc<dyn CustodyLedger> = Arc::new(ledger);
    let verifier = IntegrityVerifier::new(ledger, Duration::from_secs(30));
    let outcome = verifier
        .verify("", "custody_transfer_events")
        .await
        .unwrap();
    assert!(matches!(outcome, Verification::Intact { checked_entries: 0, .. }));
}

#[tokio::test]
async fn full_lifecycle_history_is_ordered() {
    let ledger = ready_ledger().await;
    let created = ledger.log_item_creation(&item(4, "SN400"), 7).await.unwrap();
    for status in ["Requested", "Approved", "Completed"] {
        let mut t = transfer(4, status);
        if status != "Requested" {
            t.approved_by = Some(9);
        }
        ledger.log_transfer_event(&t, "SN400").await.unwrap();
    }
    ledger
        .log_verification_event(4, "SN400", 8, "Verified Present", Some("arms room"))
        .await
        .unwrap();
    ledger
        .log_maintenance_event(MaintenanceEntry {
            maintenance_record_id: "MR-4".to_string(),
            item_id: 4,
            initiating_user: 8,
            performing_user: Some(12),
            event_type: "Started".to_string(),
            maintenance_type: Some("Battery replacement".to_string()),
            description: "Swap battery".to_string(),
        })
        .await
        .unwrap();
    ledger
        .log_correction_event(&created.event_id, "ItemCreation", "category mistyped", 7)
        .await
        .unwrap();

    let history = ledger.get_item_history(&HistoryKey::ItemId(4)).await.unwrap();
    assert_eq!(history.len(), 7);
    assert_non_decreasing(&history);
    assert_eq!(history[0].event_id(), created.event_id);
    assert_eq!(history[6].record_type(), RecordType::Correction);

    let transfer_requests: Vec<&str> = history
        .iter()
        .filter_map(|r| match r {
            HistoryRecord::Transfer(e) => Some(e.transfer_request_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(transfer_requests, ["900", "900", "900"]);
}

#[tokio::test]
async fn unknown_item_has_empty_history() {
    let ledger = ready_ledger().await;
    assert!(ledger
        .get_item_history(&HistoryKey::from("NOPE"))
        .await
        .unwrap()
        .is_empty());
    assert!(ledger
        .get_item_history(&HistoryKey::ItemId(404))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn concurrent_writers_keep_chains_intact() {
    let ledger = Arc::new(ready_ledger().await);
    let mut handles = Vec::new();
    for n in 0..16u64 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger
                .log_status_change(5, "SN500", None, "Operational", n, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rows = ledger.events(RecordType::StatusChange).unwrap();
    let sequences: Vec<u64> = rows.iter().map(|r| r.stamp().sequence).collect();
    assert_eq!(sequences, (1..=16).collect::<Vec<_>>());
    assert!(ledger.verify_document("", "StatusChange").await.unwrap());
}

#[tokio::test]
async fn closed_ledger_refuses_work() {
    let ledger = ready_ledger().await;
    ledger.close().await.unwrap();
    assert!(matches!(
        ledger.get_item_history(&HistoryKey::ItemId(1)).await,
        Err(LedgerError::Closed)
    ));
    assert!(matches!(
        ledger.verify_document("N/A", "N/A").await,
        Err(LedgerError::Closed)
    ));
}
