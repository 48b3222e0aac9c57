// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store self-check: the field cipher, the SQLite file and schema, and the
// audit hash chain. A failing check is reported, never raised.

use chrono::{DateTime, Utc};
use hipaa_core::error::{ComplianceError, Result};
use hipaa_security::sql::storage_err;
use hipaa_security::{AuditLogger, Cipher};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::schema::{REQUIRED_INDEXES, REQUIRED_TABLES};

const CANARY: &[u8] = b"hipaa-store health check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Outcome of [`crate::Database::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    /// The field cipher sealed and reopened a canary value.
    pub encryption: bool,
    /// SQLite's quick check passed and every table and index is present.
    pub database: bool,
    /// Every audit checksum recomputed to its stored value.
    pub audit_chain: bool,
    /// Entries verified; zero when the chain check failed.
    pub audit_entries: u64,
    /// One line per failed check, prefixed with the check's name.
    pub failures: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

pub(crate) fn run(
    conn: &Connection,
    cipher: &Cipher,
    audit: &AuditLogger,
    checked_at: DateTime<Utc>,
) -> HealthReport {
    let mut failures = Vec::new();

    let encryption = passed(&mut failures, "encryption", check_cipher(cipher));
    let database = passed(&mut failures, "database", check_database(conn));
    let chain = audit.verify_chain(conn);
    let audit_entries = *chain.as_ref().unwrap_or(&0);
    let audit_chain = passed(&mut failures, "audit_chain", chain.map(|_| ()));

    let status = if failures.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    info!(?status, audit_entries, "health check complete");

    HealthReport {
        status,
        checked_at,
        encryption,
        database,
        audit_chain,
        audit_entries,
        failures,
    }
}

fn passed(failures: &mut Vec<String>, check: &str, outcome: Result<()>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(err) => {
            warn!(check, %err, "health check failed");
            failures.push(format!("{check}: {err}"));
            false
        }
    }
}

fn check_cipher(cipher: &Cipher) -> Result<()> {
    let sealed = cipher.encrypt(CANARY)?;
    if cipher.decrypt(&sealed)? == CANARY {
        Ok(())
    } else {
        Err(ComplianceError::Integrity(
            "cipher round trip returned different bytes".into(),
        ))
    }
}

fn check_database(conn: &Connection) -> Result<()> {
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(storage_err)?;
    if verdict != "ok" {
        return Err(ComplianceError::Storage(format!("quick_check: {verdict}")));
    }

    let objects = REQUIRED_TABLES
        .iter()
        .map(|name| ("table", name))
        .chain(REQUIRED_INDEXES.iter().map(|name| ("index", name)));
    for (kind, name) in objects {
        let found: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                params![kind, name],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        if found == 0 {
            return Err(ComplianceError::Storage(format!("{kind} {name} is missing")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use hipaa_core::types::Role;
    use hipaa_core::Clock;

    #[test]
    fn fresh_store_is_healthy() {
        let (mut db, clock) = memory_db();
        db.create_user("henry", "Henry", Role::Staff).unwrap();

        let report = db.health_check();
        assert!(report.is_healthy(), "{:?}", report.failures);
        assert!(report.encryption && report.database && report.audit_chain);
        assert_eq!(report.audit_entries, 1);
        assert_eq!(report.checked_at, clock.now());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn tampered_audit_trail_is_unhealthy() {
        let (mut db, _) = memory_db();
        db.create_user("irene", "Irene", Role::Staff).unwrap();
        db.with_transaction(|tx| {
            tx.execute_batch(
                "DROP TRIGGER audit_log_append_only;
                 UPDATE audit_log SET details = '{}';",
            )
            .map_err(storage_err)
        })
        .unwrap();

        let report = db.health_check();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.encryption);
        assert!(report.database);
        assert!(!report.audit_chain);
        assert_eq!(report.audit_entries, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].starts_with("audit_chain: "));
    }

    #[test]
    fn missing_table_is_unhealthy() {
        let (mut db, _) = memory_db();
        db.with_transaction(|tx| {
            tx.execute_batch("DROP TABLE certificates").map_err(storage_err)
        })
        .unwrap();

        let report = db.health_check();
        assert!(!report.is_healthy());
        assert!(!report.database);
        assert!(report.audit_chain);
        assert!(report.failures[0].contains("table certificates is missing"));
    }

    #[test]
    fn report_serialises_status_in_lowercase() {
        let (db, _) = memory_db();
        let json = serde_json::to_value(db.health_check()).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
