//! Validated, unsealed event records.
//!
//! Backends call these before touching storage. Each returns a record with a
//! provisional timestamp and an empty stamp; the backend replaces both when it
//! appends the record to its table.

use crate::event::{
    non_empty, new_event_id, CorrectionEvent, ItemCreationEvent, ItemStatus, LedgerStamp,
    MaintenanceEntry, MaintenanceEvent, RecordType, StatusChangeEvent, TransferEvent,
    TransferEventType, VerificationEvent, VerificationStatus, Vocabulary,
};
use crate::{HistoryRecord, LedgerError, LedgerResult};
use chrono::Utc;
use custody_types::{InventoryItem, ItemId, Transfer, UserId};

pub(crate) fn item_creation(item: &InventoryItem, user_id: UserId) -> HistoryRecord {
    HistoryRecord::ItemCreation(ItemCreationEvent {
        event_id: new_event_id(),
        item_id: item.id,
        serial_number: item.serial_number.clone(),
        name: item.name.clone(),
        category: non_empty(item.category.as_deref()),
        performing_user: user_id,
        recorded_at: Utc::now(),
        stamp: LedgerStamp::default(),
    })
}

/// The event type is the transfer's current status. The initiator is the
/// releasing custodian.
pub(crate) fn transfer(transfer: &Transfer, serial_number: &str) -> LedgerResult<HistoryRecord> {
    let event_type = TransferEventType::parse(&transfer.status)?;
    Ok(HistoryRecord::Transfer(TransferEvent {
        event_id: new_event_id(),
        transfer_request_id: transfer.id.to_string(),
        item_id: transfer.item_id,
        serial_number: serial_number.to_string(),
        from_user: transfer.from_user_id,
        to_user: transfer.to_user_id,
        initiating_user: transfer.from_user_id,
        approving_user: transfer.approved_by,
        event_type,
        notes: non_empty(transfer.notes.as_deref()),
        recorded_at: Utc::now(),
        stamp: LedgerStamp::default(),
    }))
}

pub(crate) fn status_change(
    item_id: ItemId,
    serial_number: &str,
    old_status: Option<&str>,
    new_status: &str,
    user_id: UserId,
    reason: Option<&str>,
) -> LedgerResult<HistoryRecord> {
    let new_status = ItemStatus::parse(new_status)?;
    Ok(HistoryRecord::StatusChange(StatusChangeEvent {
        event_id: new_event_id(),
        item_id,
        serial_number: serial_number.to_string(),
        reporting_user: user_id,
        previous_status: non_empty(old_status),
        new_status,
        reason: non_empty(reason),
        recorded_at: Utc::now(),
        stamp: LedgerStamp::default(),
    }))
}

pub(crate) fn verification(
    item_id: ItemId,
    serial_number: &str,
    user_id: UserId,
    verification_type: &str,
    notes: Option<&str>,
) -> LedgerResult<HistoryRecord> {
    let status = VerificationStatus::parse(verification_type)?;
    Ok(HistoryRecord::Verification(VerificationEvent {
        event_id: new_event_id(),
        item_id,
        serial_number: serial_number.to_string(),
        verifying_user: user_id,
        status,
        notes: non_empty(notes),
        recorded_at: Utc::now(),
        stamp: LedgerStamp::default(),
    }))
}

pub(crate) fn maintenance(entry: MaintenanceEntry) -> LedgerResult<HistoryRecord> {
    let draft = entry.validate()?;
    Ok(HistoryRecord::Maintenance(MaintenanceEvent {
        event_id: new_event_id(),
        maintenance_record_id: draft.maintenance_record_id,
        item_id: draft.item_id,
        initiating_user: draft.initiating_user,
        performing_user: draft.performing_user,
        event_type: draft.event_type,
        maintenance_type: draft.maintenance_type,
        description: draft.description,
        recorded_at: Utc::now(),
        stamp: LedgerStamp::default(),
    }))
}

pub(crate) fn correction(
    original_event_id: &str,
    event_type: &str,
    reason: &str,
    user_id: UserId,
) -> LedgerResult<HistoryRecord> {
    let original_event_type = RecordType::parse(event_type)?;
    let original_event_id = original_event_id.trim();
    if original_event_id.is_empty() {
        return Err(LedgerError::InvalidInput(
            "correction must reference an original event id".to_string(),
        ));
    }
    let reason = non_empty(Some(reason)).ok_or_else(|| {
        LedgerError::InvalidInput("correction must state a reason".to_string())
    })?;
    Ok(HistoryRecord::Correction(CorrectionEvent {
        event_id: new_event_id(),
        original_event_id: original_event_id.to_string(),
        original_event_type,
        reason,
        correcting_user: user_id,
        recorded_at: Utc::now(),
        stamp: LedgerStamp::default(),
    }))
}
