//! Ledger event records and their closed vocabularies.
//!
//! Every status or type column in the ledger is drawn from a fixed set of
//! strings. Parsing a raw string into one of these enums is the validation
//! step; a value that fails to parse never reaches a backend write.

use crate::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use custody_types::{ItemId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A closed set of accepted strings for one ledger column.
pub trait Vocabulary: Sized + Copy + 'static {
    /// Human name of the column, used in validation errors.
    const KIND: &'static str;

    /// Every accepted value, in declaration order.
    const ALL: &'static [Self];

    /// Alternate spellings accepted on input. Never stored.
    const ALIASES: &'static [(&'static str, Self)] = &[];

    /// Canonical stored spelling.
    fn as_str(&self) -> &'static str;

    /// Parse an exact, case-sensitive match against [`Self::ALL`], then
    /// [`Self::ALIASES`].
    fn parse(raw: &str) -> LedgerResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == raw)
            .or_else(|| {
                Self::ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == raw)
                    .map(|(_, value)| *value)
            })
            .ok_or_else(|| LedgerError::validation(Self::KIND, raw))
    }
}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
        $(aliases {
            $($alias:literal => $target:ident),+ $(,)?
        })?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl Vocabulary for $name {
            const KIND: &'static str = $kind;
            const ALL: &'static [Self] = &[$(Self::$variant),+];
            $(const ALIASES: &'static [(&'static str, Self)] = &[$(($alias, Self::$target)),+];)?

            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(raw: &str) -> LedgerResult<Self> {
                <Self as Vocabulary>::parse(raw)
            }
        }
    };
}

vocabulary! {
    /// Stage of a transfer's lifecycle. One transfer yields one event per stage.
    TransferEventType, "transfer event type" {
        Requested => "Requested",
        Approved => "Approved",
        Rejected => "Rejected",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

vocabulary! {
    /// Operational status an item can be moved into.
    ItemStatus, "item status" {
        Operational => "Operational",
        NonOperational => "Non-Operational",
        Damaged => "Damaged",
        Lost => "Lost",
        Found => "Found",
        InRepair => "In Repair",
    }
}

vocabulary! {
    /// Outcome of a physical inventory verification.
    VerificationStatus, "verification status" {
        VerifiedPresent => "Verified Present",
        Missing => "Missing",
        RequiresAttention => "Requires Attention",
        StatusUnchanged => "Status Unchanged",
    }
}

vocabulary! {
    /// Stage of a maintenance record.
    MaintenanceEventType, "maintenance event type" {
        Scheduled => "Scheduled",
        Started => "Started",
        Completed => "Completed",
        Cancelled => "Cancelled",
        ReportedDefect => "Reported Defect",
    }
}

vocabulary! {
    /// Discriminator for the event tables that make up the ledger.
    RecordType, "record type" {
        ItemCreation => "ItemCreation",
        Transfer => "Transfer",
        StatusChange => "StatusChange",
        Verification => "Verification",
        Maintenance => "Maintenance",
        Correction => "Correction",
    }
    aliases {
        "EquipmentEvent" => ItemCreation,
        "TransferEvent" => Transfer,
        "StatusChangeEvent" => StatusChange,
        "VerificationEvent" => Verification,
        "MaintenanceEvent" => Maintenance,
        "CorrectionEvent" => Correction,
    }
}

impl MaintenanceEventType {
    /// Only work that is under way or done has a performing user.
    pub fn has_performer(&self) -> bool {
        matches!(self, Self::Started | Self::Completed)
    }
}

/// Hash-chain position of a stored event within its table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStamp {
    /// 1-based, gap-free position within the event's table.
    pub sequence: u64,
    pub previous_hash: Option<String>,
    pub hash: String,
}

/// An item entered the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreationEvent {
    pub event_id: String,
    pub item_id: ItemId,
    pub serial_number: String,
    pub name: String,
    pub category: Option<String>,
    pub performing_user: UserId,
    pub recorded_at: DateTime<Utc>,
    pub stamp: LedgerStamp,
}

/// One status transition of a transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub event_id: String,
    /// Groups every event of one transfer lifecycle.
    pub transfer_request_id: String,
    pub item_id: ItemId,
    pub serial_number: String,
    pub from_user: UserId,
    pub to_user: UserId,
    pub initiating_user: UserId,
    pub approving_user: Option<UserId>,
    pub event_type: TransferEventType,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub stamp: LedgerStamp,
}

/// An item's operational status changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub event_id: String,
    pub item_id: ItemId,
    pub serial_number: String,
    pub reporting_user: UserId,
    /// Absent on an item's first recorded status.
    pub previous_status: Option<String>,
    pub new_status: ItemStatus,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub stamp: LedgerStamp,
}

/// A user physically verified an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub event_id: String,
    pub item_id: ItemId,
    pub serial_number: String,
    pub verifying_user: UserId,
    pub status: VerificationStatus,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub stamp: LedgerStamp,
}

/// A stage of a maintenance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceEvent {
    pub event_id: String,
    pub maintenance_record_id: String,
    pub item_id: ItemId,
    pub initiating_user: UserId,
    /// Present only for `Started` and `Completed`.
    pub performing_user: Option<UserId>,
    pub event_type: MaintenanceEventType,
    pub maintenance_type: Option<String>,
    pub description: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub stamp: LedgerStamp,
}

/// An annotation over an earlier event. The original is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub event_id: String,
    pub original_event_id: String,
    pub original_event_type: RecordType,
    pub reason: String,
    pub correcting_user: UserId,
    pub recorded_at: DateTime<Utc>,
    pub stamp: LedgerStamp,
}

/// Arguments for logging a maintenance event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceEntry {
    pub maintenance_record_id: String,
    pub item_id: ItemId,
    pub initiating_user: UserId,
    pub performing_user: Option<UserId>,
    pub event_type: String,
    pub maintenance_type: Option<String>,
    pub description: String,
}

/// Validated, normalized form of a [`MaintenanceEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MaintenanceDraft {
    pub maintenance_record_id: String,
    pub item_id: ItemId,
    pub initiating_user: UserId,
    pub performing_user: Option<UserId>,
    pub event_type: MaintenanceEventType,
    pub maintenance_type: Option<String>,
    pub description: Option<String>,
}

impl MaintenanceEntry {
    /// Validate the event type and drop a performing user the stage cannot have.
    pub(crate) fn validate(self) -> LedgerResult<MaintenanceDraft> {
        let event_type = MaintenanceEventType::parse(&self.event_type)?;
        let performing_user = if event_type.has_performer() {
            self.performing_user
        } else {
            None
        };
        Ok(MaintenanceDraft {
            maintenance_record_id: self.maintenance_record_id,
            item_id: self.item_id,
            initiating_user: self.initiating_user,
            performing_user,
            event_type,
            maintenance_type: non_empty(self.maintenance_type.as_deref()),
            description: non_empty(Some(&self.description)),
        })
    }
}

/// Empty and whitespace-only text is stored as absent.
pub(crate) fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Fresh event identifier.
pub(crate) fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
