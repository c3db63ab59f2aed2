//! Primary records for equipment custody.
//!
//! These are the shapes owned by the relational system of record. The ledger
//! never mutates them; it receives them by reference when a lifecycle event
//! is logged and copies out the fields it needs.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric primary key of an inventory item. Stable for the item's lifetime.
pub type ItemId = u64;

/// Numeric primary key of a user.
pub type UserId = u64;

/// Numeric primary key of a transfer request.
pub type TransferId = u64;

/// A tracked physical asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    pub serial_number: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Current operational status, as stored by the relational layer.
    pub status: String,
    pub assigned_user_id: Option<UserId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInventoryItem {
    pub name: String,
    pub serial_number: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub status: String,
    #[serde(default)]
    pub assigned_user_id: Option<UserId>,
}

/// A custody-change request between two users.
///
/// `status` is free-form at this layer; the ledger validates it against its
/// transfer vocabulary when the transfer is logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: TransferId,
    pub item_id: ItemId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub status: String,
    /// User who approved the transfer, once it has been approved.
    pub approved_by: Option<UserId>,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Input for opening a transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransfer {
    pub item_id: ItemId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}
