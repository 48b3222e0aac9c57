// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Relational schema for users, training progress, and certificates. The
// audit table comes from `hipaa_security::audit`.
//
// Every statement is `IF NOT EXISTS`, so two processes initialising the same
// file concurrently both succeed.

use hipaa_core::error::Result;
use hipaa_security::audit::AuditLogger;
use hipaa_security::sql::storage_err;
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

const USERS_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        username   TEXT    NOT NULL UNIQUE,
        full_name  TEXT    NOT NULL,
        role       TEXT    NOT NULL CHECK (role IN ('admin', 'staff', 'auditor')),
        created_at TEXT    NOT NULL,
        CONSTRAINT valid_username CHECK (length(username) BETWEEN 3 AND 50),
        CONSTRAINT valid_name CHECK (length(full_name) > 0)
    );
"#;

const PROGRESS_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS training_progress (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id              INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        lesson_title         TEXT,
        quiz_score           REAL CHECK (quiz_score IS NULL OR quiz_score BETWEEN 0 AND 100),
        checklist_data       TEXT,
        checklist_ciphertext BLOB,
        completed_at         TEXT    NOT NULL,
        CONSTRAINT one_checklist_form CHECK (
            checklist_data IS NULL OR checklist_ciphertext IS NULL
        )
    );
    CREATE INDEX IF NOT EXISTS idx_progress_user ON training_progress(user_id);
    CREATE TRIGGER IF NOT EXISTS training_progress_append_only
    BEFORE UPDATE ON training_progress
    BEGIN
        SELECT RAISE(ABORT, 'training_progress is append-only');
    END;
"#;

const CERTIFICATES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS certificates (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        certificate_id    TEXT    NOT NULL UNIQUE,
        user_id           INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        score             REAL    NOT NULL,
        issued_at         TEXT    NOT NULL,
        expires_at        TEXT    NOT NULL,
        revoked           INTEGER NOT NULL DEFAULT 0 CHECK (revoked IN (0, 1)),
        revoked_at        TEXT,
        revocation_reason TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_certificates_user ON certificates(user_id);
    CREATE INDEX IF NOT EXISTS idx_certificates_expiry ON certificates(expires_at);
    CREATE TRIGGER IF NOT EXISTS certificates_issued_fields_immutable
    BEFORE UPDATE OF certificate_id, user_id, score, issued_at, expires_at ON certificates
    BEGIN
        SELECT RAISE(ABORT, 'certificate issuance fields are immutable');
    END;
    CREATE TRIGGER IF NOT EXISTS certificates_revocation_terminal
    BEFORE UPDATE OF revoked, revoked_at, revocation_reason ON certificates
    WHEN OLD.revoked = 1
    BEGIN
        SELECT RAISE(ABORT, 'certificate is already revoked');
    END;
"#;

/// Tables a usable store must contain.
pub const REQUIRED_TABLES: [&str; 4] = ["users", "training_progress", "certificates", "audit_log"];

/// Names of every index the statistics and lookup queries rely on.
pub const REQUIRED_INDEXES: [&str; 5] = [
    "idx_progress_user",
    "idx_certificates_user",
    "idx_certificates_expiry",
    "idx_audit_user",
    "idx_audit_timestamp",
];

/// Create all tables, indexes, and triggers inside one transaction.
///
/// The write lock is taken up front so a concurrent initialiser waits on the
/// busy timeout instead of failing a lock upgrade.
pub fn init_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(storage_err)?;
    tx.execute_batch(USERS_SQL).map_err(storage_err)?;
    tx.execute_batch(PROGRESS_SQL).map_err(storage_err)?;
    tx.execute_batch(CERTIFICATES_SQL).map_err(storage_err)?;
    AuditLogger::install_schema(&tx)?;
    tx.commit().map_err(storage_err)?;

    debug!("schema initialised");
    Ok(())
}
