// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail: append-only, hash-chained SQLite log of every
// security-relevant operation.
//
// Schema:
//   audit_log(
//     id                INTEGER PRIMARY KEY AUTOINCREMENT,
//     user_id           INTEGER,            -- nulled when the user is deleted
//     action            TEXT    NOT NULL,   -- e.g. "USER_CREATED"
//     details           TEXT,               -- JSON, never sensitive content
//     ip_address        TEXT,               -- optional network origin
//     timestamp         TEXT    NOT NULL,   -- RFC 3339, fixed width
//     previous_checksum TEXT,               -- checksum of the preceding entry
//     checksum          TEXT    NOT NULL    -- SHA-256 over this link
//   )
//
// Entries are written on the caller's connection, normally inside the same
// transaction as the mutation they describe, so both commit or neither does.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hipaa_core::Clock;
use hipaa_core::error::{ComplianceError, Result};
use hipaa_core::types::{ActionCode, UserId, format_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::integrity::chain_checksum;
use crate::sql::{column, storage_err, timestamp_column};

/// DDL for the audit table, its indexes, and the append-only guard.
///
/// `user_id` is excluded from the guard because deleting a user sets it to
/// NULL through the foreign key.
pub const AUDIT_SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id           INTEGER REFERENCES users(id) ON DELETE SET NULL,
        action            TEXT    NOT NULL,
        details           TEXT,
        ip_address        TEXT,
        timestamp         TEXT    NOT NULL,
        previous_checksum TEXT,
        checksum          TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id);
    CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
    CREATE TRIGGER IF NOT EXISTS audit_log_append_only
    BEFORE UPDATE OF id, action, details, ip_address, timestamp, previous_checksum, checksum
    ON audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit_log is append-only');
    END;
"#;

const SELECT_COLUMNS: &str =
    "id, user_id, action, details, ip_address, timestamp, previous_checksum, checksum";

/// Recorded in place of an origin that is not an IP address.
pub const UNKNOWN_ORIGIN: &str = "0.0.0.0";

/// Validate a caller-supplied network origin.
///
/// IPv4 and IPv6 literals are kept as given (surrounding whitespace
/// trimmed); anything else is recorded as [`UNKNOWN_ORIGIN`].
pub fn normalize_origin(raw: &str) -> String {
    let trimmed = raw.trim();
    match IpAddr::from_str(trimmed) {
        Ok(_) => trimmed.to_owned(),
        Err(_) => {
            warn!(origin = raw, "rejected malformed audit origin");
            UNKNOWN_ORIGIN.to_owned()
        }
    }
}

/// Audit-write failures abort the surrounding transaction.
fn audit_err(e: rusqlite::Error) -> ComplianceError {
    ComplianceError::AuditWrite(e.to_string())
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub action: ActionCode,
    pub details: Option<String>,
    pub origin: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub previous_checksum: Option<String>,
    pub checksum: String,
}

impl AuditEntry {
    fn expected_checksum(&self) -> String {
        let timestamp = format_timestamp(&self.timestamp);
        link_checksum(
            self.previous_checksum.as_deref(),
            &timestamp,
            self.action,
            self.details.as_deref().unwrap_or(""),
            self.origin.as_deref(),
        )
    }
}

fn link_checksum(
    previous: Option<&str>,
    timestamp: &str,
    action: ActionCode,
    detail: &str,
    origin: Option<&str>,
) -> String {
    chain_checksum(
        previous,
        &[timestamp, action.as_str(), detail, origin.unwrap_or("")],
    )
}

fn decode_entry(row: &Row<'_>) -> Result<AuditEntry> {
    let action: String = column(row, "action")?;
    Ok(AuditEntry {
        id: column(row, "id")?,
        user_id: column::<Option<i64>>(row, "user_id")?.map(UserId),
        action: action.parse()?,
        details: column(row, "details")?,
        origin: column(row, "ip_address")?,
        timestamp: timestamp_column(row, "timestamp")?,
        previous_checksum: column(row, "previous_checksum")?,
        checksum: column(row, "checksum")?,
    })
}

/// Writes and reads the `audit_log` table on a borrowed connection.
#[derive(Clone)]
pub struct AuditLogger {
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Create the audit table if it does not already exist.
    pub fn install_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(AUDIT_SCHEMA_SQL).map_err(storage_err)
    }

    /// Append one entry with no network origin.
    pub fn log_action(
        &self,
        conn: &Connection,
        user_id: Option<UserId>,
        action: ActionCode,
        detail: &str,
    ) -> Result<i64> {
        self.log_action_from(conn, user_id, action, detail, None)
    }

    /// Append one entry, chained to the most recent one. `origin` passes
    /// through [`normalize_origin`] before it is hashed and stored.
    ///
    /// Any storage failure is returned as `AuditWrite`; callers propagate it
    /// so the enclosing transaction rolls back.
    #[instrument(skip(self, conn, detail), fields(%action, user_id = ?user_id.map(|u| u.0)))]
    pub fn log_action_from(
        &self,
        conn: &Connection,
        user_id: Option<UserId>,
        action: ActionCode,
        detail: &str,
        origin: Option<&str>,
    ) -> Result<i64> {
        let origin = origin.map(normalize_origin);
        let origin = origin.as_deref();
        let timestamp = format_timestamp(&self.clock.now());
        let previous: Option<String> = conn
            .query_row(
                "SELECT checksum FROM audit_log ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(audit_err)?;
        let checksum = link_checksum(previous.as_deref(), &timestamp, action, detail, origin);

        conn.execute(
            "INSERT INTO audit_log
                 (user_id, action, details, ip_address, timestamp, previous_checksum, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id.map(|u| u.0),
                action.as_str(),
                detail,
                origin,
                timestamp,
                previous,
                checksum
            ],
        )
        .map_err(audit_err)?;

        let id = conn.last_insert_rowid();
        debug!(entry_id = id, "audit entry recorded");
        Ok(id)
    }

    /// All entries referencing `user_id`, oldest first.
    pub fn entries_for_user(&self, conn: &Connection, user_id: UserId) -> Result<Vec<AuditEntry>> {
        query_entries(
            conn,
            &format!("SELECT {SELECT_COLUMNS} FROM audit_log WHERE user_id = ?1 ORDER BY id ASC"),
            params![user_id.0],
        )
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, conn: &Connection, limit: u32) -> Result<Vec<AuditEntry>> {
        query_entries(
            conn,
            &format!("SELECT {SELECT_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?1"),
            params![limit],
        )
    }

    /// Total number of entries.
    pub fn count(&self, conn: &Connection) -> Result<u64> {
        conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(storage_err)
    }

    /// Number of entries carrying `action`.
    pub fn count_action(&self, conn: &Connection, action: ActionCode) -> Result<u64> {
        conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE action = ?1",
            params![action.as_str()],
            |row| row.get(0),
        )
        .map_err(storage_err)
    }

    /// Walk the chain oldest-first and recompute every link.
    ///
    /// The earliest surviving entry anchors the chain, so a retention purge
    /// does not break verification. Returns the number of entries checked.
    #[instrument(skip_all)]
    pub fn verify_chain(&self, conn: &Connection) -> Result<u64> {
        let mut stmt = conn
            .prepare(&format!("SELECT {SELECT_COLUMNS} FROM audit_log ORDER BY id ASC"))
            .map_err(storage_err)?;
        let mut rows = stmt.query([]).map_err(storage_err)?;

        let mut prior: Option<String> = None;
        let mut checked = 0u64;
        while let Some(row) = rows.next().map_err(storage_err)? {
            let entry = decode_entry(row)?;

            if let Some(expected) = &prior {
                if entry.previous_checksum.as_deref() != Some(expected.as_str()) {
                    warn!(entry_id = entry.id, "audit chain link mismatch");
                    return Err(ComplianceError::AuditChainBroken {
                        entry_id: entry.id,
                        expected: expected.clone(),
                        actual: entry.previous_checksum.unwrap_or_default(),
                    });
                }
            }

            let expected = entry.expected_checksum();
            if expected != entry.checksum {
                warn!(entry_id = entry.id, "audit entry checksum mismatch");
                return Err(ComplianceError::AuditChainBroken {
                    entry_id: entry.id,
                    expected,
                    actual: entry.checksum,
                });
            }

            prior = Some(entry.checksum);
            checked += 1;
        }

        debug!(checked, "audit chain verified");
        Ok(checked)
    }

    /// Delete entries older than `cutoff`. Only the retention policy calls this.
    pub fn purge_before(&self, conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
        conn.execute(
            "DELETE FROM audit_log WHERE timestamp < ?1",
            params![format_timestamp(&cutoff)],
        )
        .map_err(audit_err)
    }
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(sql).map_err(storage_err)?;
    let mut rows = stmt.query(params).map_err(storage_err)?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next().map_err(storage_err)? {
        entries.push(decode_entry(row)?);
    }
    Ok(entries)
}
