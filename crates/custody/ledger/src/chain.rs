//! Per-table hash chains.
//!
//! Each ledger table is its own chain: the n-th row commits to its event
//! payload, its sequence number and the hash of row n-1.

use crate::event::{LedgerStamp, RecordType};
use crate::verify::{TamperFinding, TamperIssue};
use crate::{HistoryRecord, LedgerError, LedgerResult};

pub(crate) fn compute_entry_hash(
    record: &HistoryRecord,
    previous_hash: Option<&str>,
    sequence: u64,
) -> LedgerResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "record_type": record.record_type(),
        "event": record.canonical_payload()?,
    });
    let serialized = serde_json::to_vec(&serializable)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}

/// Stamp `record` as the row following `previous` in its table.
pub(crate) fn seal(record: &mut HistoryRecord, previous: Option<&LedgerStamp>) -> LedgerResult<()> {
    let sequence = previous.map_or(1, |p| p.sequence + 1);
    let previous_hash = previous.map(|p| p.hash.clone());
    let hash = compute_entry_hash(record, previous_hash.as_deref(), sequence)?;
    *record.stamp_mut() = LedgerStamp {
        sequence,
        previous_hash,
        hash,
    };
    Ok(())
}

/// Check a contiguous run of one table's rows, ordered by sequence.
///
/// `anchor` is the stamp of the row just before `entries`, or `None` when the
/// run starts at the head of the table. Every row is checked against its own
/// stored link so one damaged row yields findings for that row only.
pub(crate) fn verify_chain(
    table: RecordType,
    anchor: Option<&LedgerStamp>,
    entries: &[HistoryRecord],
) -> LedgerResult<Vec<TamperFinding>> {
    let mut findings = Vec::new();
    let mut expected_sequence = anchor.map_or(1, |a| a.sequence + 1);
    let mut expected_previous = anchor.map(|a| a.hash.clone());

    for entry in entries {
        let stamp = entry.stamp();
        let finding = |issue| TamperFinding {
            table,
            event_id: entry.event_id().to_string(),
            sequence: stamp.sequence,
            issue,
        };

        if stamp.sequence != expected_sequence {
            findings.push(finding(TamperIssue::SequenceGap {
                expected: expected_sequence,
                found: stamp.sequence,
            }));
        }
        if stamp.previous_hash != expected_previous {
            findings.push(finding(TamperIssue::BrokenLink {
                expected: expected_previous.clone(),
                found: stamp.previous_hash.clone(),
            }));
        }
        let computed = compute_entry_hash(entry, stamp.previous_hash.as_deref(), stamp.sequence)?;
        if computed != stamp.hash {
            findings.push(finding(TamperIssue::HashMismatch {
                stored: stamp.hash.clone(),
                computed,
            }));
        }

        expected_sequence = stamp.sequence + 1;
        expected_previous = Some(stamp.hash.clone());
    }

    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ItemCreationEvent, RecordType};
    use chrono::Utc;

    fn creation(item_id: u64) -> HistoryRecord {
        HistoryRecord::ItemCreation(ItemCreationEvent {
            event_id: format!("ev-{item_id}"),
            item_id,
            serial_number: format!("SN{item_id}"),
            name: "Rifle".to_string(),
            category: None,
            performing_user: 1,
            recorded_at: Utc::now(),
            stamp: LedgerStamp::default(),
        })
    }

    fn sealed_chain(len: u64) -> Vec<HistoryRecord> {
        let mut chain: Vec<HistoryRecord> = Vec::new();
        for id in 1..=len {
            let mut record = creation(id);
            seal(&mut record, chain.last().map(HistoryRecord::stamp)).unwrap();
            chain.push(record);
        }
        chain
    }

    #[test]
    fn sealed_chain_verifies() {
        let chain = sealed_chain(4);
        assert_eq!(chain[0].stamp().sequence, 1);
        assert!(chain[0].stamp().previous_hash.is_none());
        assert_eq!(
            chain[3].stamp().previous_hash.as_deref(),
            Some(chain[2].stamp().hash.as_str())
        );
        assert!(verify_chain(RecordType::ItemCreation, None, &chain)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn edited_payload_is_a_hash_mismatch() {
        let mut chain = sealed_chain(3);
        if let HistoryRecord::ItemCreation(event) = &mut chain[1] {
            event.serial_number = "SN-FORGED".to_string();
        }
        let findings = verify_chain(RecordType::ItemCreation, None, &chain).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].sequence, 2);
        assert!(matches!(findings[0].issue, TamperIssue::HashMismatch { .. }));
    }

    #[test]
    fn removed_row_breaks_sequence_and_link() {
        let mut chain = sealed_chain(3);
        chain.remove(1);
        let findings = verify_chain(RecordType::ItemCreation, None, &chain).unwrap();
        assert!(findings
            .iter()
            .any(|f| matches!(f.issue, TamperIssue::SequenceGap { expected: 2, found: 3 })));
        assert!(findings
            .iter()
            .any(|f| matches!(f.issue, TamperIssue::BrokenLink { .. })));
    }

    #[test]
    fn run_checked_from_anchor() {
        let chain = sealed_chain(3);
        let findings =
            verify_chain(RecordType::ItemCreation, Some(chain[1].stamp()), &chain[2..]).unwrap();
        assert!(findings.is_empty());
    }
}
