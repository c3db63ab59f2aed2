//! Item history reconstruction.
//!
//! Each event table is read on its own, then the per-table sequences are
//! merged by timestamp. The merge is a stable sort over the concatenation in
//! fetch order, so events sharing a timestamp keep table order
//! (`RecordType::ITEM_EVENTS`, then corrections) and, within one table,
//! sequence order.

use crate::event::RecordType;
use crate::model::{HistoryKey, HistoryRecord};
use crate::traits::EventTables;
use crate::LedgerResult;

pub(crate) struct HistoryReconstructor<'a, T: EventTables + ?Sized> {
    tables: &'a T,
}

impl<'a, T: EventTables + ?Sized> HistoryReconstructor<'a, T> {
    pub(crate) fn new(tables: &'a T) -> Self {
        Self { tables }
    }

    pub(crate) async fn reconstruct(&self, key: &HistoryKey) -> LedgerResult<Vec<HistoryRecord>> {
        let item_ids = match key {
            HistoryKey::ItemId(id) => vec![*id],
            HistoryKey::SerialNumber(serial) => self.tables.items_with_serial(serial).await?,
        };

        let mut sources = Vec::with_capacity(item_ids.len() * RecordType::ITEM_EVENTS.len() + 1);
        for item_id in &item_ids {
            for record_type in RecordType::ITEM_EVENTS {
                sources.push(self.tables.item_events(record_type, *item_id).await?);
            }
        }

        let event_ids: Vec<String> = sources
            .iter()
            .flatten()
            .map(|record| record.event_id().to_string())
            .collect();
        if !event_ids.is_empty() {
            sources.push(self.tables.corrections_for(&event_ids).await?);
        }

        let history = merge_histories(sources);
        tracing::debug!(
            key = ?key,
            items = item_ids.len(),
            events = history.len(),
            "reconstructed item history"
        );
        Ok(history)
    }
}

/// Merge per-table event sequences into one ascending-by-timestamp sequence.
pub fn merge_histories(sources: Vec<Vec<HistoryRecord>>) -> Vec<HistoryRecord> {
    let mut merged: Vec<HistoryRecord> = sources.into_iter().flatten().collect();
    merged.sort_by_key(HistoryRecord::recorded_at);
    merged
}
