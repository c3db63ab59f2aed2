use crate::event::{
    CorrectionEvent, ItemCreationEvent, LedgerStamp, MaintenanceEvent, RecordType,
    StatusChangeEvent, TransferEvent, VerificationEvent, Vocabulary,
};
use crate::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use custody_types::ItemId;
use serde::{Deserialize, Serialize};

/// One ledger entry of any type, tagged with its record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record_type", content = "event")]
pub enum HistoryRecord {
    ItemCreation(ItemCreationEvent),
    Transfer(TransferEvent),
    StatusChange(StatusChangeEvent),
    Verification(VerificationEvent),
    Maintenance(MaintenanceEvent),
    Correction(CorrectionEvent),
}

macro_rules! each_event {
    ($record:expr, $event:ident => $body:expr) => {
        match $record {
            HistoryRecord::ItemCreation($event) => $body,
            HistoryRecord::Transfer($event) => $body,
            HistoryRecord::StatusChange($event) => $body,
            HistoryRecord::Verification($event) => $body,
            HistoryRecord::Maintenance($event) => $body,
            HistoryRecord::Correction($event) => $body,
        }
    };
}

impl HistoryRecord {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::ItemCreation(_) => RecordType::ItemCreation,
            Self::Transfer(_) => RecordType::Transfer,
            Self::StatusChange(_) => RecordType::StatusChange,
            Self::Verification(_) => RecordType::Verification,
            Self::Maintenance(_) => RecordType::Maintenance,
            Self::Correction(_) => RecordType::Correction,
        }
    }

    pub fn event_id(&self) -> &str {
        each_event!(self, e => &e.event_id)
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        each_event!(self, e => e.recorded_at)
    }

    pub fn stamp(&self) -> &LedgerStamp {
        each_event!(self, e => &e.stamp)
    }

    pub(crate) fn stamp_mut(&mut self) -> &mut LedgerStamp {
        each_event!(self, e => &mut e.stamp)
    }

    pub(crate) fn recorded_at_mut(&mut self) -> &mut DateTime<Utc> {
        each_event!(self, e => &mut e.recorded_at)
    }

    /// Item the event belongs to. Corrections reference events, not items.
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::ItemCreation(e) => Some(e.item_id),
            Self::Transfer(e) => Some(e.item_id),
            Self::StatusChange(e) => Some(e.item_id),
            Self::Verification(e) => Some(e.item_id),
            Self::Maintenance(e) => Some(e.item_id),
            Self::Correction(_) => None,
        }
    }

    /// Serial number carried by the event, where the table stores one.
    pub fn serial_number(&self) -> Option<&str> {
        match self {
            Self::ItemCreation(e) => Some(&e.serial_number),
            Self::Transfer(e) => Some(&e.serial_number),
            Self::StatusChange(e) => Some(&e.serial_number),
            Self::Verification(e) => Some(&e.serial_number),
            Self::Maintenance(_) | Self::Correction(_) => None,
        }
    }

    /// Event fields covered by the chain hash: everything except the stamp.
    pub fn canonical_payload(&self) -> LedgerResult<serde_json::Value> {
        let mut value = each_event!(self, e => serde_json::to_value(e))
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.remove("stamp");
        }
        Ok(value)
    }

    pub fn receipt(&self) -> EventReceipt {
        let stamp = self.stamp();
        EventReceipt {
            event_id: self.event_id().to_string(),
            record_type: self.record_type(),
            sequence: stamp.sequence,
            recorded_at: self.recorded_at(),
            hash: stamp.hash.clone(),
        }
    }
}

/// Acknowledgement of a durably committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReceipt {
    pub event_id: String,
    pub record_type: RecordType,
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub hash: String,
}

/// Key for an item history lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKey {
    /// Canonical key. Always present and never reused.
    ItemId(ItemId),
    /// Resolved to item ids through the serial-bearing event tables.
    SerialNumber(String),
}

impl From<ItemId> for HistoryKey {
    fn from(value: ItemId) -> Self {
        Self::ItemId(value)
    }
}

impl From<&str> for HistoryKey {
    fn from(value: &str) -> Self {
        Self::SerialNumber(value.to_string())
    }
}

impl RecordType {
    /// Tables holding per-item events, in the order history fetches them.
    pub const ITEM_EVENTS: [RecordType; 5] = [
        RecordType::ItemCreation,
        RecordType::Transfer,
        RecordType::StatusChange,
        RecordType::Verification,
        RecordType::Maintenance,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::ItemCreation => "custody_item_creation_events",
            Self::Transfer => "custody_transfer_events",
            Self::StatusChange => "custody_status_change_events",
            Self::Verification => "custody_verification_events",
            Self::Maintenance => "custody_maintenance_events",
            Self::Correction => "custody_correction_events",
        }
    }

    /// Accepts a table name or a record type name.
    pub fn from_table_name(raw: &str) -> LedgerResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.table_name() == raw || t.as_str() == raw)
            .ok_or_else(|| LedgerError::validation("ledger table", raw))
    }
}

/// Finest unit a backend can verify on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationGranularity {
    Store,
    Table,
    Document,
}

/// How a backend records corrections against append-only events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStrategy {
    /// Annotations go to a dedicated append-only table.
    #[default]
    SideTable,
    /// Corrections rewrite the original row through a history-keeping ledger table.
    UpdatableLedger,
}

/// What a backend can do, so callers never infer it from the backend's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerCapabilities {
    pub backend: &'static str,
    pub verification: VerificationGranularity,
    pub corrections: CorrectionStrategy,
    /// Timestamps come from the store's clock rather than the caller's.
    pub server_timestamps: bool,
    pub durable: bool,
}
