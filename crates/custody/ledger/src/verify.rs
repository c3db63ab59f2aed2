//! Integrity verification.
//!
//! Three outcomes are kept apart: the check could not run (`Err`), the check
//! ran clean ([`Verification::Intact`]), and the check ran and found damage
//! ([`Verification::Compromised`]).

use crate::event::{RecordType, Vocabulary};
use crate::model::VerificationGranularity;
use crate::{CustodyLedger, LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What an integrity check covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum IntegrityTarget {
    /// Every ledger table.
    Store,
    Table { table: RecordType },
    /// One event and its link to the row before it.
    Document { table: RecordType, event_id: String },
}

fn unspecified(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw == "*" || raw.eq_ignore_ascii_case("n/a")
}

impl IntegrityTarget {
    /// Interpret the `(document_id, table_name)` pair of `verify_document`.
    ///
    /// An unspecified table means the whole store, whatever the document id.
    pub fn parse(document_id: &str, table_name: &str) -> LedgerResult<Self> {
        if unspecified(table_name) {
            return Ok(Self::Store);
        }
        let table = RecordType::from_table_name(table_name.trim())?;
        if unspecified(document_id) {
            Ok(Self::Table { table })
        } else {
            Ok(Self::Document {
                table,
                event_id: document_id.trim().to_string(),
            })
        }
    }

    pub fn granularity(&self) -> VerificationGranularity {
        match self {
            Self::Store => VerificationGranularity::Store,
            Self::Table { .. } => VerificationGranularity::Table,
            Self::Document { .. } => VerificationGranularity::Document,
        }
    }

    /// Widen a request finer than `supported` to the nearest scope covering it.
    pub fn widen_to(self, supported: VerificationGranularity) -> Self {
        if self.granularity() <= supported {
            return self;
        }
        tracing::warn!(
            requested = ?self.granularity(),
            supported = ?supported,
            "backend cannot verify at requested granularity; widening check"
        );
        match (self, supported) {
            (Self::Document { table, .. }, VerificationGranularity::Table) => Self::Table { table },
            _ => Self::Store,
        }
    }

    /// Tables the check must read.
    pub fn tables(&self) -> Vec<RecordType> {
        match self {
            Self::Store => RecordType::ALL.to_vec(),
            Self::Table { table } | Self::Document { table, .. } => vec![*table],
        }
    }
}

/// A single inconsistency found in a table's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperFinding {
    pub table: RecordType,
    pub event_id: String,
    pub sequence: u64,
    pub issue: TamperIssue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TamperIssue {
    /// Stored hash does not match the row's contents.
    HashMismatch { stored: String, computed: String },
    /// Row does not point at its predecessor's hash.
    BrokenLink {
        expected: Option<String>,
        found: Option<String>,
    },
    /// Rows are missing or reordered.
    SequenceGap { expected: u64, found: u64 },
}

/// Result of a completed integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub target: IntegrityTarget,
    pub checked_entries: usize,
    pub findings: Vec<TamperFinding>,
}

impl IntegrityReport {
    pub fn is_intact(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Normalized verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Intact {
        target: IntegrityTarget,
        checked_entries: usize,
    },
    Compromised(IntegrityReport),
}

impl Verification {
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

/// Runs backend integrity checks under a time bound.
#[derive(Clone)]
pub struct IntegrityVerifier {
    ledger: Arc<dyn CustodyLedger>,
    timeout: Duration,
}

impl IntegrityVerifier {
    pub fn new(ledger: Arc<dyn CustodyLedger>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    /// Verify the scope named by a `(document_id, table_name)` pair.
    pub async fn verify(&self, document_id: &str, table_name: &str) -> LedgerResult<Verification> {
        let target = IntegrityTarget::parse(document_id, table_name)?
            .widen_to(self.ledger.capabilities().verification);
        self.verify_target(target).await
    }

    pub async fn verify_target(&self, target: IntegrityTarget) -> LedgerResult<Verification> {
        let report = tokio::time::timeout(self.timeout, self.ledger.check_integrity(&target))
            .await
            .map_err(|_| {
                LedgerError::VerificationIncomplete(format!(
                    "integrity check exceeded {}s",
                    self.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| match e {
                LedgerError::Read(message) => LedgerError::VerificationIncomplete(message),
                other => other,
            })?;

        if report.is_intact() {
            tracing::info!(
                scope = ?report.target,
                checked_entries = report.checked_entries,
                "ledger integrity verified"
            );
            Ok(Verification::Intact {
                target: report.target,
                checked_entries: report.checked_entries,
            })
        } else {
            tracing::error!(
                scope = ?report.target,
                findings = report.findings.len(),
                "ledger integrity check found tampering"
            );
            Ok(Verification::Compromised(report))
        }
    }

    /// Boolean form of [`Self::verify`]: tampering is `Ok(false)`.
    pub async fn verify_document(&self, document_id: &str, table_name: &str) -> LedgerResult<bool> {
        Ok(self.verify(document_id, table_name).await?.is_intact())
    }
}
