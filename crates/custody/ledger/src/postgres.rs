//! PostgreSQL ledger backend.
//!
//! Every event type has its own append-only table. Appends run in a
//! transaction holding an exclusive lock on the target table, take their
//! timestamp from the server's `clock_timestamp()` and extend the table's
//! hash chain. Triggers reject `UPDATE`, `DELETE` and `TRUNCATE`, so rows can
//! only be altered by someone able to drop the triggers, and such edits break
//! the chain. Requires PostgreSQL 14 or newer (`CREATE OR REPLACE TRIGGER`).

use crate::chain::{seal, verify_chain};
use crate::event::{
    CorrectionEvent, ItemCreationEvent, LedgerStamp, MaintenanceEntry, MaintenanceEvent,
    RecordType, StatusChangeEvent, TransferEvent, VerificationEvent, Vocabulary,
};
use crate::gate::ShutdownGate;
use crate::history::HistoryReconstructor;
use crate::model::{
    CorrectionStrategy, EventReceipt, HistoryKey, HistoryRecord, LedgerCapabilities,
    VerificationGranularity,
};
use crate::traits::{CustodyLedger, EventTables};
use crate::verify::{IntegrityReport, IntegrityTarget};
use crate::{draft, LedgerError, LedgerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custody_types::{InventoryItem, ItemId, Transfer, UserId};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use std::time::Duration;

/// Columns every ledger table starts with, in insert order.
const STAMP_COLUMNS: [(&str, &str); 5] = [
    ("sequence", "BIGINT PRIMARY KEY"),
    ("event_id", "TEXT NOT NULL UNIQUE"),
    ("recorded_at", "TIMESTAMPTZ NOT NULL"),
    ("previous_hash", "TEXT"),
    ("hash", "TEXT NOT NULL"),
];

/// Event columns of one table, in insert order.
fn payload_columns(record_type: RecordType) -> &'static [(&'static str, &'static str)] {
    match record_type {
        RecordType::ItemCreation => &[
            ("item_id", "BIGINT NOT NULL"),
            ("serial_number", "TEXT NOT NULL"),
            ("name", "TEXT NOT NULL"),
            ("category", "TEXT"),
            ("performing_user", "BIGINT NOT NULL"),
        ],
        RecordType::Transfer => &[
            ("transfer_request_id", "TEXT NOT NULL"),
            ("item_id", "BIGINT NOT NULL"),
            ("serial_number", "TEXT NOT NULL"),
            ("from_user", "BIGINT NOT NULL"),
            ("to_user", "BIGINT NOT NULL"),
            ("initiating_user", "BIGINT NOT NULL"),
            ("approving_user", "BIGINT"),
            ("event_type", "TEXT NOT NULL"),
            ("notes", "TEXT"),
        ],
        RecordType::StatusChange => &[
            ("item_id", "BIGINT NOT NULL"),
            ("serial_number", "TEXT NOT NULL"),
            ("reporting_user", "BIGINT NOT NULL"),
            ("previous_status", "TEXT"),
            ("new_status", "TEXT NOT NULL"),
            ("reason", "TEXT"),
        ],
        RecordType::Verification => &[
            ("item_id", "BIGINT NOT NULL"),
            ("serial_number", "TEXT NOT NULL"),
            ("verifying_user", "BIGINT NOT NULL"),
            ("status", "TEXT NOT NULL"),
            ("notes", "TEXT"),
        ],
        RecordType::Maintenance => &[
            ("maintenance_record_id", "TEXT NOT NULL"),
            ("item_id", "BIGINT NOT NULL"),
            ("initiating_user", "BIGINT NOT NULL"),
            ("performing_user", "BIGINT"),
            ("event_type", "TEXT NOT NULL"),
            ("maintenance_type", "TEXT"),
            ("description", "TEXT"),
        ],
        RecordType::Correction => &[
            ("original_event_id", "TEXT NOT NULL"),
            ("original_event_type", "TEXT NOT NULL"),
            ("reason", "TEXT NOT NULL"),
            ("correcting_user", "BIGINT NOT NULL"),
        ],
    }
}

fn column_names(record_type: RecordType) -> Vec<&'static str> {
    STAMP_COLUMNS
        .iter()
        .chain(payload_columns(record_type))
        .map(|(name, _)| *name)
        .collect()
}

/// Idempotent DDL for every ledger table and its guard triggers.
pub(crate) fn schema_statements() -> Vec<String> {
    let mut ddl = vec![r#"
        CREATE OR REPLACE FUNCTION custody_reject_mutation() RETURNS trigger
        LANGUAGE plpgsql AS $$
        BEGIN
            RAISE EXCEPTION 'custody ledger table % is append-only', TG_TABLE_NAME;
        END;
        $$
        "#
    .to_string()];

    for record_type in RecordType::ALL {
        let table = record_type.table_name();
        let columns = STAMP_COLUMNS
            .iter()
            .chain(payload_columns(*record_type))
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect::<Vec<_>>()
            .join(", ");
        ddl.push(format!("CREATE TABLE IF NOT EXISTS {table} ({columns})"));

        let lookup = if *record_type == RecordType::Correction {
            "original_event_id"
        } else {
            "item_id"
        };
        ddl.push(format!(
            "CREATE INDEX IF NOT EXISTS {table}_{lookup}_idx ON {table} ({lookup})"
        ));
        if payload_columns(*record_type)
            .iter()
            .any(|(name, _)| *name == "serial_number")
        {
            ddl.push(format!(
                "CREATE INDEX IF NOT EXISTS {table}_serial_number_idx ON {table} (serial_number)"
            ));
        }

        ddl.push(format!(
            "CREATE OR REPLACE TRIGGER {table}_append_only \
             BEFORE UPDATE OR DELETE ON {table} \
             FOR EACH ROW EXECUTE FUNCTION custody_reject_mutation()"
        ));
        ddl.push(format!(
            "CREATE OR REPLACE TRIGGER {table}_no_truncate \
             BEFORE TRUNCATE ON {table} \
             FOR EACH STATEMENT EXECUTE FUNCTION custody_reject_mutation()"
        ));
    }
    ddl
}

fn insert_sql(record_type: RecordType) -> String {
    let columns = column_names(record_type);
    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        record_type.table_name(),
        columns.join(", ")
    )
}

fn select_sql(record_type: RecordType, filter: &str) -> String {
    format!(
        "SELECT {} FROM {} {filter} ORDER BY sequence",
        column_names(record_type).join(", "),
        record_type.table_name()
    )
}

/// Serial lookup across every table that stores a serial number.
fn serial_lookup_sql() -> String {
    RecordType::ITEM_EVENTS
        .iter()
        .filter(|t| payload_columns(**t).iter().any(|(name, _)| *name == "serial_number"))
        .map(|t| format!("SELECT item_id FROM {} WHERE serial_number = $1", t.table_name()))
        .collect::<Vec<_>>()
        .join(" UNION ")
        + " ORDER BY item_id"
}

/// PostgreSQL-backed custody ledger.
pub struct PostgresLedger {
    pool: PgPool,
    gate: ShutdownGate,
    corrections: CorrectionStrategy,
}

impl PostgresLedger {
    /// Connect with default pool parameters. Call `initialize` before logging.
    pub async fn connect(database_url: &str) -> LedgerResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> LedgerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::Connectivity(format!("failed to connect postgres: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            gate: ShutdownGate::new(),
            corrections: CorrectionStrategy::SideTable,
        }
    }

    /// Choose how corrections are recorded. Only the side table is implemented;
    /// the other strategy is accepted so that correction calls report it.
    pub fn with_corrections(mut self, corrections: CorrectionStrategy) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn append(&self, record: HistoryRecord) -> LedgerResult<EventReceipt> {
        let _pass = self.gate.enter().await?;
        let record_type = record.record_type();
        let item_id = record.item_id();
        let result = self.append_locked(record).await;
        if let Err(e) = &result {
            tracing::error!(
                item_id = ?item_id,
                event_type = record_type.as_str(),
                error = %e,
                "ledger write failed"
            );
        }
        result
    }

    async fn append_locked(&self, mut record: HistoryRecord) -> LedgerResult<EventReceipt> {
        let record_type = record.record_type();
        let table = record_type.table_name();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, LedgerError::Write))?;

        sqlx::query(&format!("LOCK TABLE {table} IN EXCLUSIVE MODE"))
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, LedgerError::Write))?;

        let last = sqlx::query(&format!(
            "SELECT sequence, previous_hash, hash FROM {table} ORDER BY sequence DESC LIMIT 1"
        ))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| classify(e, LedgerError::Write))?;
        let previous = last.as_ref().map(stamp_from_row).transpose()?;

        let recorded_at: DateTime<Utc> = sqlx::query_scalar("SELECT clock_timestamp()")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, LedgerError::Write))?;
        *record.recorded_at_mut() = recorded_at;
        seal(&mut record, previous.as_ref())?;

        insert(&mut *tx, &record).await?;
        tx.commit()
            .await
            .map_err(|e| classify(e, LedgerError::Write))?;

        let receipt = record.receipt();
        tracing::info!(
            item_id = ?record.item_id(),
            event_type = record_type.as_str(),
            event_id = %receipt.event_id,
            sequence = receipt.sequence,
            "ledger event recorded"
        );
        Ok(receipt)
    }

    async fn read_table(&self, record_type: RecordType) -> LedgerResult<Vec<HistoryRecord>> {
        let rows = sqlx::query(&select_sql(record_type, ""))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, LedgerError::Read))?;
        rows.iter().map(|row| decode_row(record_type, row)).collect()
    }

    /// One row plus the stamp of the row before it.
    async fn read_document(
        &self,
        record_type: RecordType,
        event_id: &str,
    ) -> LedgerResult<(Option<LedgerStamp>, HistoryRecord)> {
        let row = sqlx::query(&select_sql(record_type, "WHERE event_id = $1"))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, LedgerError::Read))?
            .ok_or_else(|| {
                LedgerError::InvalidInput(format!(
                    "event {event_id} not found in {}",
                    record_type.table_name()
                ))
            })?;
        let record = decode_row(record_type, &row)?;

        let sequence = record.stamp().sequence;
        if sequence <= 1 {
            return Ok((None, record));
        }
        let previous = sqlx::query(&format!(
            "SELECT sequence, previous_hash, hash FROM {} WHERE sequence = $1",
            record_type.table_name()
        ))
        .bind(to_i64(sequence - 1)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, LedgerError::Read))?;
        let anchor = previous.as_ref().map(stamp_from_row).transpose()?;
        Ok((anchor, record))
    }
}

async fn insert(conn: &mut PgConnection, record: &HistoryRecord) -> LedgerResult<()> {
    let sql = insert_sql(record.record_type());
    let stamp = record.stamp();
    let query = sqlx::query(&sql)
        .bind(to_i64(stamp.sequence)?)
        .bind(record.event_id())
        .bind(record.recorded_at())
        .bind(stamp.previous_hash.as_deref())
        .bind(stamp.hash.as_str());

    let query = match record {
        HistoryRecord::ItemCreation(e) => query
            .bind(to_i64(e.item_id)?)
            .bind(e.serial_number.as_str())
            .bind(e.name.as_str())
            .bind(e.category.as_deref())
            .bind(to_i64(e.performing_user)?),
        HistoryRecord::Transfer(e) => query
            .bind(e.transfer_request_id.as_str())
            .bind(to_i64(e.item_id)?)
            .bind(e.serial_number.as_str())
            .bind(to_i64(e.from_user)?)
            .bind(to_i64(e.to_user)?)
            .bind(to_i64(e.initiating_user)?)
            .bind(e.approving_user.map(to_i64).transpose()?)
            .bind(e.event_type.as_str())
            .bind(e.notes.as_deref()),
        HistoryRecord::StatusChange(e) => query
            .bind(to_i64(e.item_id)?)
            .bind(e.serial_number.as_str())
            .bind(to_i64(e.reporting_user)?)
            .bind(e.previous_status.as_deref())
            .bind(e.new_status.as_str())
            .bind(e.reason.as_deref()),
        HistoryRecord::Verification(e) => query
            .bind(to_i64(e.item_id)?)
            .bind(e.serial_number.as_str())
            .bind(to_i64(e.verifying_user)?)
            .bind(e.status.as_str())
            .bind(e.notes.as_deref()),
        HistoryRecord::Maintenance(e) => query
            .bind(e.maintenance_record_id.as_str())
            .bind(to_i64(e.item_id)?)
            .bind(to_i64(e.initiating_user)?)
            .bind(e.performing_user.map(to_i64).transpose()?)
            .bind(e.event_type.as_str())
            .bind(e.maintenance_type.as_deref())
            .bind(e.description.as_deref()),
        HistoryRecord::Correction(e) => query
            .bind(e.original_event_id.as_str())
            .bind(e.original_event_type.as_str())
            .bind(e.reason.as_str())
            .bind(to_i64(e.correcting_user)?),
    };

    query
        .execute(conn)
        .await
        .map_err(|e| classify(e, LedgerError::Write))?;
    Ok(())
}

#[async_trait]
impl EventTables for PostgresLedger {
    async fn items_with_serial(&self, serial_number: &str) -> LedgerResult<Vec<ItemId>> {
        let ids: Vec<i64> = sqlx::query_scalar(&serial_lookup_sql())
            .bind(serial_number)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, LedgerError::Read))?;
        ids.into_iter().map(from_i64).collect()
    }

    async fn item_events(
        &self,
        record_type: RecordType,
        item_id: ItemId,
    ) -> LedgerResult<Vec<HistoryRecord>> {
        let rows = sqlx::query(&select_sql(record_type, "WHERE item_id = $1"))
            .bind(to_i64(item_id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, LedgerError::Read))?;
        rows.iter().map(|row| decode_row(record_type, row)).collect()
    }

    async fn corrections_for(&self, event_ids: &[String]) -> LedgerResult<Vec<HistoryRecord>> {
        let rows = sqlx::query(&select_sql(
            RecordType::Correction,
            "WHERE original_event_id = ANY($1)",
        ))
        .bind(event_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, LedgerError::Read))?;
        rows.iter()
            .map(|row| decode_row(RecordType::Correction, row))
            .collect()
    }
}

#[async_trait]
impl CustodyLedger for PostgresLedger {
    fn capabilities(&self) -> LedgerCapabilities {
        LedgerCapabilities {
            backend: "postgres",
            verification: VerificationGranularity::Document,
            corrections: self.corrections,
            server_timestamps: true,
            durable: true,
        }
    }

    async fn initialize(&self) -> LedgerResult<()> {
        let _pass = self.gate.enter().await?;
        for stmt in schema_statements() {
            sqlx::query(&stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    classify(e, |m| LedgerError::Write(format!("schema init failed: {m}")))
                })?;
        }
        tracing::info!(backend = "postgres", "ledger schema ready");
        Ok(())
    }

    async fn log_item_creation(
        &self,
        item: &InventoryItem,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt> {
        self.append(draft::item_creation(item, user_id)).await
    }

    async fn log_transfer_event(
        &self,
        transfer: &Transfer,
        serial_number: &str,
    ) -> LedgerResult<EventReceipt> {
        self.append(draft::transfer(transfer, serial_number)?).await
    }

    async fn log_status_change(
        &self,
        item_id: ItemId,
        serial_number: &str,
        old_status: Option<&str>,
        new_status: &str,
        user_id: UserId,
        reason: Option<&str>,
    ) -> LedgerResult<EventReceipt> {
        let record =
            draft::status_change(item_id, serial_number, old_status, new_status, user_id, reason)?;
        self.append(record).await
    }

    async fn log_verification_event(
        &self,
        item_id: ItemId,
        serial_number: &str,
        user_id: UserId,
        verification_type: &str,
        notes: Option<&str>,
    ) -> LedgerResult<EventReceipt> {
        let record =
            draft::verification(item_id, serial_number, user_id, verification_type, notes)?;
        self.append(record).await
    }

    async fn log_maintenance_event(&self, entry: MaintenanceEntry) -> LedgerResult<EventReceipt> {
        self.append(draft::maintenance(entry)?).await
    }

    async fn log_correction_event(
        &self,
        original_event_id: &str,
        event_type: &str,
        reason: &str,
        user_id: UserId,
    ) -> LedgerResult<EventReceipt> {
        let record = draft::correction(original_event_id, event_type, reason, user_id)?;
        if self.corrections == CorrectionStrategy::UpdatableLedger {
            return Err(LedgerError::Unimplemented(
                "corrections through an updatable ledger table".to_string(),
            ));
        }
        self.append(record).await
    }

    async fn get_item_history(&self, key: &HistoryKey) -> LedgerResult<Vec<HistoryRecord>> {
        let _pass = self.gate.enter().await?;
        HistoryReconstructor::new(self).reconstruct(key).await
    }

    async fn check_integrity(&self, target: &IntegrityTarget) -> LedgerResult<IntegrityReport> {
        let _pass = self.gate.enter().await?;
        let mut checked_entries = 0;
        let mut findings = Vec::new();

        match target {
            IntegrityTarget::Document { table, event_id } => {
                let (anchor, record) = self.read_document(*table, event_id).await?;
                findings.extend(verify_chain(*table, anchor.as_ref(), &[record])?);
                checked_entries = 1;
            }
            IntegrityTarget::Store | IntegrityTarget::Table { .. } => {
                for table in target.tables() {
                    let rows = self.read_table(table).await?;
                    findings.extend(verify_chain(table, None, &rows)?);
                    checked_entries += rows.len();
                }
            }
        }

        Ok(IntegrityReport {
            target: target.clone(),
            checked_entries,
            findings,
        })
    }

    async fn close(&self) -> LedgerResult<()> {
        if self.gate.close().await {
            self.pool.close().await;
            tracing::info!(backend = "postgres", "ledger closed");
        }
        Ok(())
    }
}

fn decode_row(record_type: RecordType, row: &PgRow) -> LedgerResult<HistoryRecord> {
    let event_id: String = column(row, "event_id")?;
    let recorded_at: DateTime<Utc> = column(row, "recorded_at")?;
    let stamp = stamp_from_row(row)?;

    Ok(match record_type {
        RecordType::ItemCreation => HistoryRecord::ItemCreation(ItemCreationEvent {
            event_id,
            item_id: id_column(row, "item_id")?,
            serial_number: column(row, "serial_number")?,
            name: column(row, "name")?,
            category: column(row, "category")?,
            performing_user: id_column(row, "performing_user")?,
            recorded_at,
            stamp,
        }),
        RecordType::Transfer => HistoryRecord::Transfer(TransferEvent {
            event_id,
            transfer_request_id: column(row, "transfer_request_id")?,
            item_id: id_column(row, "item_id")?,
            serial_number: column(row, "serial_number")?,
            from_user: id_column(row, "from_user")?,
            to_user: id_column(row, "to_user")?,
            initiating_user: id_column(row, "initiating_user")?,
            approving_user: column::<Option<i64>>(row, "approving_user")?
                .map(from_i64)
                .transpose()?,
            event_type: vocabulary_column(row, "event_type")?,
            notes: column(row, "notes")?,
            recorded_at,
            stamp,
        }),
        RecordType::StatusChange => HistoryRecord::StatusChange(StatusChangeEvent {
            event_id,
            item_id: id_column(row, "item_id")?,
            serial_number: column(row, "serial_number")?,
            reporting_user: id_column(row, "reporting_user")?,
            previous_status: column(row, "previous_status")?,
            new_status: vocabulary_column(row, "new_status")?,
            reason: column(row, "reason")?,
            recorded_at,
            stamp,
        }),
        RecordType::Verification => HistoryRecord::Verification(VerificationEvent {
            event_id,
            item_id: id_column(row, "item_id")?,
            serial_number: column(row, "serial_number")?,
            verifying_user: id_column(row, "verifying_user")?,
            status: vocabulary_column(row, "status")?,
            notes: column(row, "notes")?,
            recorded_at,
            stamp,
        }),
        RecordType::Maintenance => HistoryRecord::Maintenance(MaintenanceEvent {
            event_id,
            maintenance_record_id: column(row, "maintenance_record_id")?,
            item_id: id_column(row, "item_id")?,
            initiating_user: id_column(row, "initiating_user")?,
            performing_user: column::<Option<i64>>(row, "performing_user")?
                .map(from_i64)
                .transpose()?,
            event_type: vocabulary_column(row, "event_type")?,
            maintenance_type: column(row, "maintenance_type")?,
            description: column(row, "description")?,
            recorded_at,
            stamp,
        }),
        RecordType::Correction => HistoryRecord::Correction(CorrectionEvent {
            event_id,
            original_event_id: column(row, "original_event_id")?,
            original_event_type: vocabulary_column(row, "original_event_type")?,
            reason: column(row, "reason")?,
            correcting_user: id_column(row, "correcting_user")?,
            recorded_at,
            stamp,
        }),
    })
}

fn stamp_from_row(row: &PgRow) -> LedgerResult<LedgerStamp> {
    Ok(LedgerStamp {
        sequence: from_i64(column(row, "sequence")?)?,
        previous_hash: column(row, "previous_hash")?,
        hash: column(row, "hash")?,
    })
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> LedgerResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| LedgerError::Read(format!("column {name}: {e}")))
}

fn id_column(row: &PgRow, name: &str) -> LedgerResult<u64> {
    from_i64(column(row, name)?)
}

fn vocabulary_column<V: Vocabulary>(row: &PgRow, name: &str) -> LedgerResult<V> {
    let raw: String = column(row, name)?;
    V::parse(&raw)
        .map_err(|_| LedgerError::Read(format!("stored {} `{raw}` is not recognized", V::KIND)))
}

/// Pool, transport and protocol failures mean the database is unreachable;
/// anything else is attributed to the operation.
fn classify(err: sqlx::Error, otherwise: impl FnOnce(String) -> LedgerError) -> LedgerError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => LedgerError::Connectivity(err.to_string()),
        other => otherwise(other.to_string()),
    }
}

fn to_i64(value: u64) -> LedgerResult<i64> {
    i64::try_from(value)
        .map_err(|_| LedgerError::InvalidInput(format!("id {value} exceeds BIGINT range")))
}

fn from_i64(value: i64) -> LedgerResult<u64> {
    u64::try_from(value).map_err(|_| LedgerError::Read(format!("negative id {value} in ledger")))
}
