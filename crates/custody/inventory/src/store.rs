//! Boundary to the relational system of record.

use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use custody_types::{InventoryItem, ItemId, NewInventoryItem, NewTransfer, Transfer, TransferId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Owner of current item and transfer state.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Insert a new item. Serial numbers are unique.
    async fn insert_item(&self, item: NewInventoryItem) -> StoreResult<InventoryItem>;

    async fn get_item(&self, item_id: ItemId) -> StoreResult<InventoryItem>;

    /// Set an item's status, returning the updated item and its previous status.
    async fn set_item_status(
        &self,
        item_id: ItemId,
        status: &str,
    ) -> StoreResult<(InventoryItem, String)>;

    async fn insert_transfer(&self, transfer: NewTransfer) -> StoreResult<Transfer>;

    async fn get_transfer(&self, transfer_id: TransferId) -> StoreResult<Transfer>;

    /// Replace a stored transfer with `transfer`.
    async fn save_transfer(&self, transfer: Transfer) -> StoreResult<Transfer>;
}

#[derive(Default)]
struct Records {
    items: HashMap<ItemId, InventoryItem>,
    transfers: HashMap<TransferId, Transfer>,
    next_item_id: ItemId,
    next_transfer_id: TransferId,
}

/// In-memory store for development and tests.
#[derive(Default)]
pub struct InMemoryInventoryStore {
    records: RwLock<Records>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| StoreError::Backend("inventory lock poisoned".to_string()))
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| StoreError::Backend("inventory lock poisoned".to_string()))
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn insert_item(&self, item: NewInventoryItem) -> StoreResult<InventoryItem> {
        let mut guard = self.write()?;
        if guard
            .items
            .values()
            .any(|existing| existing.serial_number == item.serial_number)
        {
            return Err(StoreError::Conflict(format!(
                "serial number {} already registered",
                item.serial_number
            )));
        }

        guard.next_item_id += 1;
        let now = Utc::now();
        let record = InventoryItem {
            id: guard.next_item_id,
            name: item.name,
            serial_number: item.serial_number,
            description: item.description,
            category: item.category,
            status: item.status,
            assigned_at: item.assigned_user_id.map(|_| now),
            assigned_user_id: item.assigned_user_id,
            created_at: now,
        };
        guard.items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_item(&self, item_id: ItemId) -> StoreResult<InventoryItem> {
        self.read()?
            .items
            .get(&item_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("inventory item {item_id}")))
    }

    async fn set_item_status(
        &self,
        item_id: ItemId,
        status: &str,
    ) -> StoreResult<(InventoryItem, String)> {
        let mut guard = self.write()?;
        let item = guard
            .items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::NotFound(format!("inventory item {item_id}")))?;
        let previous = std::mem::replace(&mut item.status, status.to_string());
        Ok((item.clone(), previous))
    }

    async fn insert_transfer(&self, transfer: NewTransfer) -> StoreResult<Transfer> {
        let mut guard = self.write()?;
        if !guard.items.contains_key(&transfer.item_id) {
            return Err(StoreError::NotFound(format!(
                "inventory item {}",
                transfer.item_id
            )));
        }

        guard.next_transfer_id += 1;
        let record = Transfer {
            id: guard.next_transfer_id,
            item_id: transfer.item_id,
            from_user_id: transfer.from_user_id,
            to_user_id: transfer.to_user_id,
            status: transfer.status,
            approved_by: None,
            requested_at: Utc::now(),
            resolved_at: None,
            notes: transfer.notes,
        };
        guard.transfers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_transfer(&self, transfer_id: TransferId) -> StoreResult<Transfer> {
        self.read()?
            .transfers
            .get(&transfer_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transfer {transfer_id}")))
    }

    async fn save_transfer(&self, transfer: Transfer) -> StoreResult<Transfer> {
        let mut guard = self.write()?;
        let slot = guard
            .transfers
            .get_mut(&transfer.id)
            .ok_or_else(|| StoreError::NotFound(format!("transfer {}", transfer.id)))?;
        *slot = transfer.clone();
        Ok(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item(serial: &str) -> NewInventoryItem {
        NewInventoryItem {
            name: "Night vision goggles".to_string(),
            serial_number: serial.to_string(),
            description: None,
            category: None,
            status: "Operational".to_string(),
            assigned_user_id: Some(3),
        }
    }

    #[tokio::test]
    async fn duplicate_serial_conflicts() {
        let store = InMemoryInventoryStore::new();
        let first = store.insert_item(new_item("NV-1")).await.unwrap();
        assert_eq!(first.id, 1);
        assert!(first.assigned_at.is_some());
        assert!(matches!(
            store.insert_item(new_item("NV-1")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn status_update_returns_previous() {
        let store = InMemoryInventoryStore::new();
        let item = store.insert_item(new_item("NV-2")).await.unwrap();
        let (updated, previous) = store.set_item_status(item.id, "In Repair").await.unwrap();
        assert_eq!(previous, "Operational");
        assert_eq!(updated.status, "In Repair");
        assert!(matches!(
            store.set_item_status(99, "Lost").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn transfer_requires_known_item() {
        let store = InMemoryInventoryStore::new();
        let err = store
            .insert_transfer(NewTransfer {
                item_id: 5,
                from_user_id: 1,
                to_user_id: 2,
                status: "Requested".to_string(),
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
