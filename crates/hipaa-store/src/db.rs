// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistence core: the single SQLite connection behind every registry and
// manager call.
//
// Each public mutation runs inside exactly one transaction that also writes
// its audit entry. If the mutation or the audit write fails, the transaction
// rolls back and nothing is persisted.
//
// All methods are synchronous because `rusqlite` does not support async
// natively. Share one `Database` between components through
// `SharedDatabase`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Months, SubsecRound, Utc};
use hipaa_core::error::{ComplianceError, Result};
use hipaa_core::types::{
    ActionCode, Certificate, CertificateId, ChecklistPayload, ComplianceStats, ProgressRecord,
    Role, User, UserId, format_timestamp,
};
use hipaa_core::{Clock, SystemClock, TrainingConfig};
use hipaa_security::sql::storage_err;
use hipaa_security::{AuditEntry, AuditLogger, Cipher, hash_bytes, normalize_origin, verify_hash};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::decode::{
    CERTIFICATE_COLUMNS, PROGRESS_COLUMNS, USER_COLUMNS, decode_certificate, decode_progress,
    decode_user,
};
use crate::health::{self, HealthReport};
use crate::schema;

/// How long a writer waits for another process's lock before failing.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// A database handle shared by the registry, the training manager, and the
/// reporter.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// Wrap a database for sharing.
pub fn shared(db: Database) -> SharedDatabase {
    Arc::new(Mutex::new(db))
}

/// Lock a shared handle, reporting poisoning as a storage error.
pub(crate) fn lock(db: &SharedDatabase) -> Result<MutexGuard<'_, Database>> {
    db.lock()
        .map_err(|_| ComplianceError::Storage("database handle poisoned".into()))
}

/// Reject NaN, infinities, and anything outside 0–100.
pub(crate) fn validate_score(score: f64) -> Result<()> {
    if score.is_finite() && (0.0..=100.0).contains(&score) {
        Ok(())
    } else {
        Err(ComplianceError::invalid("score", format!("{score} is not between 0 and 100")))
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn constraint_err(e: rusqlite::Error) -> ComplianceError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK =>
        {
            ComplianceError::invalid("record", e.to_string())
        }
        _ => storage_err(e),
    }
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// If `f` panics, dropping the `Transaction` rolls back as well, so the
/// connection never stays inside an open transaction.
fn run_in_transaction<T, F>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    f: F,
) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn
        .transaction_with_behavior(behavior)
        .map_err(storage_err)?;

    match f(&tx) {
        Ok(value) => {
            tx.commit().map_err(storage_err)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(%rollback_err, "rollback failed");
            }
            debug!(%err, "transaction rolled back");
            Err(err)
        }
    }
}

fn ensure_user(conn: &Connection, user_id: UserId) -> Result<()> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id.0], |row| row.get(0))
        .optional()
        .map_err(storage_err)?;
    match found {
        Some(_) => Ok(()),
        None => Err(ComplianceError::NotFound(format!("user {user_id}"))),
    }
}

fn fetch_certificate(conn: &Connection, id: CertificateId) -> Result<Option<Certificate>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_id = ?1"
        ))
        .map_err(storage_err)?;
    let mut rows = stmt.query(params![id.to_string()]).map_err(storage_err)?;
    match rows.next().map_err(storage_err)? {
        Some(row) => decode_certificate(row).map(Some),
        None => Ok(None),
    }
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    decode: fn(&rusqlite::Row<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(storage_err)?;
    let mut rows = stmt.query(params).map_err(storage_err)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(storage_err)? {
        out.push(decode(row)?);
    }
    Ok(out)
}

/// What [`Database::encrypt_evidence`] wrote, for the caller to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceReceipt {
    pub user_id: UserId,
    pub file_name: String,
    pub encrypted_path: PathBuf,
    pub plaintext_bytes: u64,
    /// SHA-256 of the encrypted file, lowercase hex.
    pub sha256: String,
}

/// The training store.
pub struct Database {
    conn: Connection,
    cipher: Cipher,
    audit: AuditLogger,
    clock: Arc<dyn Clock>,
    origin: Option<String>,
    pass_threshold: f64,
    validity_days: u32,
    retention_years: u32,
}

impl Database {
    /// Open (or create) the database named by `config`.
    ///
    /// The field key is derived before any file is touched, so a bad secret
    /// fails without side effects.
    pub fn open(config: &TrainingConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    #[instrument(skip_all, fields(path = %config.database_path().display()))]
    pub fn open_with_clock(config: &TrainingConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let cipher = Cipher::from_config(config)?;
        let path = config.database_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ComplianceError::Storage(format!("open {}: {e}", path.display())))?;
        let db = Self::from_connection(conn, cipher, config, clock)?;
        restrict_permissions(path)?;

        info!("training database opened");
        Ok(db)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory(config: &TrainingConfig) -> Result<Self> {
        Self::open_in_memory_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_in_memory_with_clock(
        config: &TrainingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cipher = Cipher::from_config(config)?;
        let conn = Connection::open_in_memory()
            .map_err(|e| ComplianceError::Storage(format!("open in-memory: {e}")))?;
        let db = Self::from_connection(conn, cipher, config, clock)?;
        debug!("in-memory training database opened");
        Ok(db)
    }

    fn from_connection(
        mut conn: Connection,
        cipher: Cipher,
        config: &TrainingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| ComplianceError::Storage(format!("foreign_keys pragma: {e}")))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| ComplianceError::Storage(format!("WAL pragma: {e}")))?;
        debug!(journal_mode = %mode, "journal mode set");

        schema::init_schema(&mut conn)?;

        Ok(Self {
            conn,
            cipher,
            audit: AuditLogger::new(clock.clone()),
            clock,
            origin: None,
            pass_threshold: config.pass_threshold(),
            validity_days: config.certificate_validity_days(),
            retention_years: config.audit_retention_years(),
        })
    }

    /// Current time at the microsecond precision timestamps are stored with,
    /// so values returned by a mutation equal the ones read back.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    /// Network origin recorded on subsequent audit entries. Anything that is
    /// not an IP address is recorded as `0.0.0.0`.
    pub fn set_origin(&mut self, origin: Option<&str>) {
        self.origin = origin.map(normalize_origin);
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    pub fn certificate_validity_days(&self) -> u32 {
        self.validity_days
    }

    /// Run `f` in a write transaction: commit on `Ok`, roll back and return
    /// the error otherwise.
    pub fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, f)
    }

    /// Like [`Database::with_transaction`] but without taking the write lock
    /// up front; for consistent multi-statement reads.
    pub fn with_read_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        run_in_transaction(&mut self.conn, TransactionBehavior::Deferred, f)
    }

    // -- Users ---------------------------------------------------------------

    /// Insert a user and its `USER_CREATED` entry.
    ///
    /// Inputs are stored as given; validation and sanitisation belong to the
    /// registry.
    #[instrument(skip(self, full_name))]
    pub fn create_user(&mut self, username: &str, full_name: &str, role: Role) -> Result<UserId> {
        let created_at = format_timestamp(&self.now());
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        let id = run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            tx.execute(
                "INSERT INTO users (username, full_name, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, full_name, role.as_str(), created_at],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ComplianceError::DuplicateUser(username.to_owned())
                } else {
                    constraint_err(e)
                }
            })?;
            let id = UserId(tx.last_insert_rowid());

            let detail = json!({ "username": username, "role": role.as_str() }).to_string();
            audit.log_action_from(tx, Some(id), ActionCode::UserCreated, &detail, origin)?;
            Ok(id)
        })?;

        info!(user_id = %id, "user created");
        Ok(id)
    }

    pub fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let mut users = query_all(
            &self.conn,
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![user_id.0],
            decode_user,
        )?;
        Ok(users.pop())
    }

    pub fn user_exists(&self, user_id: UserId) -> Result<bool> {
        match ensure_user(&self.conn, user_id) {
            Ok(()) => Ok(true),
            Err(ComplianceError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn user_count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(storage_err)
    }

    /// Delete a user. Progress and certificates cascade; audit entries keep
    /// their history with the user reference cleared.
    #[instrument(skip(self))]
    pub fn delete_user(&mut self, user_id: UserId) -> Result<()> {
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            let username: Option<String> = tx
                .query_row(
                    "SELECT username FROM users WHERE id = ?1",
                    params![user_id.0],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            let username =
                username.ok_or_else(|| ComplianceError::NotFound(format!("user {user_id}")))?;

            tx.execute("DELETE FROM users WHERE id = ?1", params![user_id.0])
                .map_err(storage_err)?;

            let detail =
                json!({ "deleted_user_id": user_id.0, "username": username }).to_string();
            audit.log_action_from(tx, None, ActionCode::UserDeleted, &detail, origin)?;
            Ok(())
        })?;

        info!(user_id = %user_id, "user deleted");
        Ok(())
    }

    // -- Progress ------------------------------------------------------------

    /// Append a plain progress record and its `PROGRESS_SAVED` entry.
    #[instrument(skip(self, checklist))]
    pub fn record_progress(
        &mut self,
        user_id: UserId,
        lesson_title: Option<&str>,
        score: Option<f64>,
        checklist: Option<&serde_json::Value>,
    ) -> Result<i64> {
        if let Some(score) = score {
            validate_score(score)?;
        }
        let checklist_json = checklist.map(serde_json::to_string).transpose()?;
        let completed_at = format_timestamp(&self.now());
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        let record_id = run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            ensure_user(tx, user_id)?;
            tx.execute(
                "INSERT INTO training_progress
                     (user_id, lesson_title, quiz_score, checklist_data, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id.0, lesson_title, score, checklist_json, completed_at],
            )
            .map_err(constraint_err)?;
            let record_id = tx.last_insert_rowid();

            let detail = json!({
                "record_id": record_id,
                "lesson_title": lesson_title,
                "score": score,
                "has_checklist": checklist_json.is_some(),
            })
            .to_string();
            audit.log_action_from(tx, Some(user_id), ActionCode::ProgressSaved, &detail, origin)?;
            Ok(record_id)
        })?;

        debug!(record_id, "progress saved");
        Ok(record_id)
    }

    /// Append a progress record whose checklist is encrypted before it
    /// reaches the database. The audit entry never contains the checklist.
    #[instrument(skip(self, checklist))]
    pub fn record_encrypted_progress(
        &mut self,
        user_id: UserId,
        checklist: &serde_json::Value,
        score: Option<f64>,
    ) -> Result<i64> {
        if let Some(score) = score {
            validate_score(score)?;
        }
        let ciphertext = self.cipher.encrypt(&serde_json::to_vec(checklist)?)?;
        let completed_at = format_timestamp(&self.now());
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        let record_id = run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            ensure_user(tx, user_id)?;
            tx.execute(
                "INSERT INTO training_progress
                     (user_id, quiz_score, checklist_ciphertext, completed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id.0, score, ciphertext, completed_at],
            )
            .map_err(constraint_err)?;
            let record_id = tx.last_insert_rowid();

            let detail = json!({
                "record_id": record_id,
                "score": score,
                "ciphertext_bytes": ciphertext.len(),
            })
            .to_string();
            let action = ActionCode::SensitiveProgressSaved;
            audit.log_action_from(tx, Some(user_id), action, &detail, origin)?;
            Ok(record_id)
        })?;

        debug!(record_id, "sensitive progress saved");
        Ok(record_id)
    }

    /// Return the checklist attached to a progress record.
    ///
    /// Reading an encrypted checklist is itself audited as
    /// `SENSITIVE_PROGRESS_VIEWED` on behalf of `accessed_by`.
    #[instrument(skip(self))]
    pub fn decrypt_checklist(
        &mut self,
        record_id: i64,
        accessed_by: Option<UserId>,
    ) -> Result<serde_json::Value> {
        let cipher = &self.cipher;
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            let mut records = query_all(
                tx,
                &format!("SELECT {PROGRESS_COLUMNS} FROM training_progress WHERE id = ?1"),
                params![record_id],
                decode_progress,
            )?;
            let record = records
                .pop()
                .ok_or_else(|| ComplianceError::NotFound(format!("progress record {record_id}")))?;

            match record.checklist {
                None => Err(ComplianceError::NotFound(format!(
                    "progress record {record_id} has no checklist"
                ))),
                Some(ChecklistPayload::Plain(value)) => Ok(value),
                Some(ChecklistPayload::Encrypted(blob)) => {
                    let plaintext = cipher.decrypt(&blob)?;
                    let value = serde_json::from_slice(&plaintext).map_err(|e| {
                        ComplianceError::Format(format!("decrypted checklist is not JSON: {e}"))
                    })?;
                    let detail = json!({
                        "record_id": record_id,
                        "owner_user_id": record.user_id.0,
                    })
                    .to_string();
                    let action = ActionCode::SensitiveProgressViewed;
                    audit.log_action_from(tx, accessed_by, action, &detail, origin)?;
                    Ok(value)
                }
            }
        })
    }

    /// All progress records for a user, oldest first.
    pub fn progress_for_user(&self, user_id: UserId) -> Result<Vec<ProgressRecord>> {
        query_all(
            &self.conn,
            &format!(
                "SELECT {PROGRESS_COLUMNS} FROM training_progress
                 WHERE user_id = ?1 ORDER BY id ASC"
            ),
            params![user_id.0],
            decode_progress,
        )
    }

    // -- Evidence ------------------------------------------------------------

    /// Encrypt an evidence file to `dest` and log `EVIDENCE_ENCRYPTED` with
    /// the ciphertext's SHA-256.
    ///
    /// Files over the configured `max_evidence_bytes` are rejected before
    /// they are read. If the audit write fails, `dest` is removed again.
    #[instrument(skip(self, source, dest), fields(source = %source.display()))]
    pub fn encrypt_evidence(
        &mut self,
        user_id: UserId,
        source: &Path,
        dest: &Path,
    ) -> Result<EvidenceReceipt> {
        ensure_user(&self.conn, user_id)?;
        let plaintext_bytes = self.cipher.encrypt_file(source, dest)?;
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let receipt = EvidenceReceipt {
            user_id,
            file_name,
            encrypted_path: dest.to_path_buf(),
            plaintext_bytes,
            sha256: String::new(),
        };

        match self.log_evidence(receipt) {
            Ok(receipt) => {
                info!(user_id = %user_id, bytes = plaintext_bytes, "evidence encrypted");
                Ok(receipt)
            }
            Err(err) => {
                if let Err(remove_err) = fs::remove_file(dest) {
                    warn!(%remove_err, path = %dest.display(), "could not remove evidence");
                }
                Err(err)
            }
        }
    }

    fn log_evidence(&mut self, mut receipt: EvidenceReceipt) -> Result<EvidenceReceipt> {
        receipt.sha256 = hash_bytes(&fs::read(&receipt.encrypted_path)?);
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            ensure_user(tx, receipt.user_id)?;
            let detail = json!({
                "file_name": receipt.file_name,
                "bytes": receipt.plaintext_bytes,
                "sha256": receipt.sha256,
            })
            .to_string();
            let owner = Some(receipt.user_id);
            audit.log_action_from(tx, owner, ActionCode::EvidenceEncrypted, &detail, origin)?;
            Ok(())
        })?;
        Ok(receipt)
    }

    /// Check an encrypted evidence file against the digest in its receipt.
    pub fn verify_evidence(&self, receipt: &EvidenceReceipt) -> Result<()> {
        verify_hash(&fs::read(&receipt.encrypted_path)?, &receipt.sha256)
    }

    /// Verify and decrypt an evidence file to `dest`; returns the bytes
    /// written.
    pub fn decrypt_evidence(&self, receipt: &EvidenceReceipt, dest: &Path) -> Result<u64> {
        self.verify_evidence(receipt)?;
        let source = fs::File::open(&receipt.encrypted_path)?;
        self.cipher.decrypt_stream(source, dest)
    }

    // -- Certificates --------------------------------------------------------

    /// Issue a certificate valid for the configured window and log
    /// `CERTIFICATE_ISSUED`.
    ///
    /// The pass threshold is deliberately not checked here; the calling
    /// workflow owns that gate.
    #[instrument(skip(self))]
    pub fn issue_certificate(&mut self, user_id: UserId, score: f64) -> Result<Certificate> {
        validate_score(score)?;
        let certificate = Certificate::issue(user_id, score, self.now(), self.validity_days);
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            ensure_user(tx, user_id)?;
            tx.execute(
                "INSERT INTO certificates
                     (certificate_id, user_id, score, issued_at, expires_at, revoked)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    certificate.id.to_string(),
                    user_id.0,
                    score,
                    format_timestamp(&certificate.issued_at),
                    format_timestamp(&certificate.expires_at),
                ],
            )
            .map_err(constraint_err)?;

            let detail = json!({
                "certificate_id": certificate.id.to_string(),
                "score": score,
                "expires_at": format_timestamp(&certificate.expires_at),
            })
            .to_string();
            let action = ActionCode::CertificateIssued;
            audit.log_action_from(tx, Some(user_id), action, &detail, origin)?;
            Ok(())
        })?;

        info!(certificate_id = %certificate.id, user_id = %user_id, "certificate issued");
        Ok(certificate)
    }

    /// Revoke a certificate. Unknown ids are `NotFound`; a second revocation
    /// is `AlreadyRevoked` and writes nothing.
    #[instrument(skip(self, reason))]
    pub fn revoke_certificate(&mut self, id: CertificateId, reason: &str) -> Result<Certificate> {
        let now = self.now();
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        let certificate = run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            let mut certificate = fetch_certificate(tx, id)?
                .ok_or_else(|| ComplianceError::NotFound(format!("certificate {id}")))?;
            if certificate.revoked {
                return Err(ComplianceError::AlreadyRevoked(id.to_string()));
            }

            tx.execute(
                "UPDATE certificates
                 SET revoked = 1, revoked_at = ?1, revocation_reason = ?2
                 WHERE certificate_id = ?3",
                params![format_timestamp(&now), reason, id.to_string()],
            )
            .map_err(storage_err)?;

            let detail = json!({
                "certificate_id": id.to_string(),
                "reason": reason,
                "was_expired": certificate.is_expired_at(now),
            })
            .to_string();
            let owner = Some(certificate.user_id);
            audit.log_action_from(tx, owner, ActionCode::CertificateRevoked, &detail, origin)?;

            certificate.revoked = true;
            certificate.revoked_at = Some(now);
            certificate.revocation_reason = Some(reason.to_owned());
            Ok(certificate)
        })?;

        info!(certificate_id = %id, "certificate revoked");
        Ok(certificate)
    }

    pub fn get_certificate(&self, id: CertificateId) -> Result<Option<Certificate>> {
        fetch_certificate(&self.conn, id)
    }

    /// Every certificate a user has ever held, oldest first.
    pub fn certificates_for_user(&self, user_id: UserId) -> Result<Vec<Certificate>> {
        query_all(
            &self.conn,
            &format!(
                "SELECT {CERTIFICATE_COLUMNS} FROM certificates
                 WHERE user_id = ?1 ORDER BY issued_at ASC, id ASC"
            ),
            params![user_id.0],
            decode_certificate,
        )
    }

    /// Certificates that are unrevoked and unexpired right now.
    pub fn active_certificates(&self) -> Result<Vec<Certificate>> {
        query_all(
            &self.conn,
            &format!(
                "SELECT {CERTIFICATE_COLUMNS} FROM certificates
                 WHERE revoked = 0 AND expires_at > ?1 ORDER BY expires_at ASC"
            ),
            params![format_timestamp(&self.now())],
            decode_certificate,
        )
    }

    // -- Statistics ----------------------------------------------------------

    /// Aggregate compliance figures, recomputed from the stored rows inside
    /// one read transaction.
    ///
    /// An empty store yields [`ComplianceStats::empty`], never NaN.
    #[instrument(skip(self))]
    pub fn get_compliance_stats(&mut self) -> Result<ComplianceStats> {
        let now = self.now();
        let now_text = format_timestamp(&now);
        let threshold = self.pass_threshold;

        self.with_read_transaction(|tx| {
            let total_users: u64 = tx
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(storage_err)?;

            let (scored, avg_score, passed): (u64, Option<f64>, u64) = tx
                .query_row(
                    "SELECT COUNT(quiz_score),
                            AVG(quiz_score),
                            COALESCE(SUM(CASE WHEN quiz_score >= ?1 THEN 1 ELSE 0 END), 0)
                     FROM training_progress",
                    params![threshold],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(storage_err)?;

            let certs: (u64, u64, u64, u64) = tx
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(
                                CASE WHEN revoked = 0 AND expires_at > ?1 THEN 1 ELSE 0 END
                            ), 0),
                            COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                            COALESCE(SUM(revoked), 0)
                     FROM certificates",
                    params![now_text],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .map_err(storage_err)?;
            let (total_certs, active_certs, expired_certs, revoked_certs) = certs;

            let pass_rate = if scored == 0 {
                0.0
            } else {
                passed as f64 / scored as f64 * 100.0
            };

            Ok(ComplianceStats {
                total_users,
                avg_score: avg_score.unwrap_or(0.0),
                pass_rate,
                total_certs,
                active_certs,
                expired_certs,
                revoked_certs,
                generated_at: now,
            })
        })
    }

    /// Run the store's self-check. Failures are reported in the result.
    #[instrument(skip(self))]
    pub fn health_check(&self) -> HealthReport {
        health::run(&self.conn, &self.cipher, &self.audit, self.now())
    }

    // -- Audit trail ---------------------------------------------------------

    pub fn audit_entries_for_user(&self, user_id: UserId) -> Result<Vec<AuditEntry>> {
        self.audit.entries_for_user(&self.conn, user_id)
    }

    pub fn recent_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        self.audit.recent_entries(&self.conn, limit)
    }

    pub fn audit_count(&self) -> Result<u64> {
        self.audit.count(&self.conn)
    }

    pub fn audit_count_for(&self, action: ActionCode) -> Result<u64> {
        self.audit.count_action(&self.conn, action)
    }

    /// Recompute the audit hash chain; returns the number of entries checked.
    pub fn verify_audit_chain(&self) -> Result<u64> {
        self.audit.verify_chain(&self.conn)
    }

    /// Remove audit entries older than the configured retention window and
    /// record the purge itself.
    #[instrument(skip(self))]
    pub fn purge_expired_audit(&mut self) -> Result<usize> {
        let now = self.now();
        let months = self.retention_years.saturating_mul(12);
        let cutoff = now.checked_sub_months(Months::new(months)).ok_or_else(|| {
            let years = self.retention_years;
            ComplianceError::Config(format!("retention of {years} years underflows"))
        })?;
        let audit = &self.audit;
        let origin = self.origin.as_deref();

        let removed = run_in_transaction(&mut self.conn, TransactionBehavior::Immediate, |tx| {
            let removed = audit.purge_before(tx, cutoff)?;
            if removed > 0 {
                let detail = json!({
                    "removed": removed,
                    "cutoff": format_timestamp(&cutoff),
                })
                .to_string();
                audit.log_action_from(tx, None, ActionCode::AuditPurged, &detail, origin)?;
            }
            Ok(removed)
        })?;

        info!(removed, "audit retention purge complete");
        Ok(removed)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{day_zero, memory_db, test_config, test_config_at};
    use chrono::Duration;
    use hipaa_core::{EncryptionSecret, TrainingSettings};
    use std::sync::Barrier;

    #[test]
    fn schema_has_required_indexes() {
        let (db, _) = memory_db();
        for index in schema::REQUIRED_INDEXES {
            let found: i64 = db
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
                    params![index],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(found, 1, "missing index {index}");
        }
    }

    #[test]
    fn stats_on_empty_store_are_zero() {
        let (mut db, clock) = memory_db();
        let stats = db.get_compliance_stats().unwrap();
        assert_eq!(stats, ComplianceStats::empty(clock.now()));
        assert!(!stats.avg_score.is_nan());
        assert!(!stats.pass_rate.is_nan());
    }

    #[test]
    fn create_and_get_user() {
        let (mut db, clock) = memory_db();
        let id = db.create_user("alice", "Alice Example", Role::Staff).unwrap();

        let user = db.get_user(id).unwrap().expect("user exists");
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, Role::Staff);
        assert_eq!(user.created_at, clock.now());
        assert!(db.user_exists(id).unwrap());
        assert!(!db.user_exists(UserId(99_999)).unwrap());
        assert!(db.get_user(UserId(99_999)).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_rejected_without_side_effects() {
        let (mut db, _) = memory_db();
        let first = db.create_user("unique.user", "First User", Role::Staff).unwrap();

        let err = db.create_user("unique.user", "Second User", Role::Admin).unwrap_err();
        assert!(matches!(err, ComplianceError::DuplicateUser(name) if name == "unique.user"));

        assert_eq!(db.user_count().unwrap(), 1);
        assert_eq!(db.audit_count_for(ActionCode::UserCreated).unwrap(), 1);
        assert_eq!(db.get_user(first).unwrap().unwrap().full_name, "First User");
    }

    #[test]
    fn each_mutation_writes_one_matching_audit_entry() {
        let (mut db, _) = memory_db();

        let user = db.create_user("bob", "Bob", Role::Staff).unwrap();
        assert_eq!(db.audit_count().unwrap(), 1);

        db.record_progress(user, Some("PHI Basics"), Some(90.0), None).unwrap();
        assert_eq!(db.audit_count().unwrap(), 2);

        let cert = db.issue_certificate(user, 90.0).unwrap();
        assert_eq!(db.audit_count().unwrap(), 3);

        db.revoke_certificate(cert.id, "issued in error").unwrap();
        assert_eq!(db.audit_count().unwrap(), 4);

        let actions: Vec<ActionCode> = db
            .audit_entries_for_user(user)
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                ActionCode::UserCreated,
                ActionCode::ProgressSaved,
                ActionCode::CertificateIssued,
                ActionCode::CertificateRevoked,
            ]
        );
        assert_eq!(db.verify_audit_chain().unwrap(), 4);
    }

    #[test]
    fn failed_validation_writes_no_audit_entry() {
        let (mut db, _) = memory_db();
        let user = db.create_user("carol", "Carol", Role::Auditor).unwrap();
        let before = db.audit_count().unwrap();

        assert!(matches!(
            db.record_progress(user, Some("Test Lesson"), Some(150.0), None),
            Err(ComplianceError::Validation { field: "score", .. })
        ));
        assert!(matches!(
            db.record_progress(UserId(99_999), Some("Test Lesson"), Some(80.0), None),
            Err(ComplianceError::NotFound(_))
        ));
        assert!(matches!(
            db.issue_certificate(user, f64::NAN),
            Err(ComplianceError::Validation { .. })
        ));
        assert!(matches!(
            db.revoke_certificate(CertificateId::new(), "typo"),
            Err(ComplianceError::NotFound(_))
        ));

        assert_eq!(db.audit_count().unwrap(), before);
        assert!(db.progress_for_user(user).unwrap().is_empty());
    }

    #[test]
    fn audit_failure_rolls_back_the_mutation() {
        let (mut db, _) = memory_db();
        db.conn.execute_batch("DROP TABLE audit_log").unwrap();

        let err = db.create_user("dave", "Dave", Role::Staff).unwrap_err();
        assert!(matches!(err, ComplianceError::AuditWrite(_)));
        assert_eq!(db.user_count().unwrap(), 0);
    }

    #[test]
    fn with_transaction_rolls_back_on_error() {
        let (mut db, _) = memory_db();
        let result: Result<()> = db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO users (username, full_name, role, created_at)
                 VALUES ('ghost', 'Ghost', 'staff', '2026-01-01T00:00:00.000000Z')",
                [],
            )
            .map_err(storage_err)?;
            Err(ComplianceError::invalid("test", "forced failure"))
        });

        assert!(result.is_err());
        assert_eq!(db.user_count().unwrap(), 0);
    }

    #[test]
    fn encrypted_checklist_never_stored_in_plaintext() {
        let (mut db, _) = memory_db();
        let user = db.create_user("erin", "Erin", Role::Staff).unwrap();
        let checklist = serde_json::json!({ "Patient chart left unattended": "no" });

        let record_id = db.record_encrypted_progress(user, &checklist, Some(88.0)).unwrap();

        let (plain, blob): (Option<String>, Vec<u8>) = db
            .conn
            .query_row(
                "SELECT checklist_data, checklist_ciphertext FROM training_progress WHERE id = ?1",
                params![record_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(plain.is_none());
        let needle = b"Patient chart";
        assert!(!blob.windows(needle.len()).any(|w| w == needle));

        let entry = &db.recent_audit_entries(1).unwrap()[0];
        assert_eq!(entry.action, ActionCode::SensitiveProgressSaved);
        assert!(!entry.details.as_deref().unwrap_or("").contains("Patient chart"));

        assert_eq!(db.decrypt_checklist(record_id, Some(user)).unwrap(), checklist);
        assert_eq!(db.audit_count_for(ActionCode::SensitiveProgressViewed).unwrap(), 1);

        let records = db.progress_for_user(user).unwrap();
        assert!(records[0].checklist.as_ref().unwrap().is_encrypted());
    }

    #[test]
    fn progress_rows_are_append_only() {
        let (mut db, _) = memory_db();
        let user = db.create_user("frank", "Frank", Role::Staff).unwrap();
        let id = db.record_progress(user, Some("Breach Notification"), Some(70.0), None).unwrap();

        let result = db.conn.execute(
            "UPDATE training_progress SET quiz_score = 100 WHERE id = ?1",
            params![id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn certificate_expiry_window() {
        let (mut db, clock) = memory_db();
        let user = db.create_user("grace", "Grace", Role::Staff).unwrap();

        let cert = db.issue_certificate(user, 85.0).unwrap();
        assert_eq!(cert.issued_at, day_zero());
        assert_eq!(cert.expires_at, day_zero() + Duration::days(365));
        assert_eq!(db.get_certificate(cert.id).unwrap().unwrap(), cert);

        clock.set(day_zero() + Duration::days(364));
        assert_eq!(db.active_certificates().unwrap().len(), 1);
        let stats = db.get_compliance_stats().unwrap();
        assert_eq!((stats.active_certs, stats.expired_certs), (1, 0));

        clock.set(day_zero() + Duration::days(366));
        assert!(db.active_certificates().unwrap().is_empty());
        let stats = db.get_compliance_stats().unwrap();
        assert_eq!((stats.active_certs, stats.expired_certs), (0, 1));
    }

    #[test]
    fn revocation_is_terminal_and_not_double_logged() {
        let (mut db, clock) = memory_db();
        let user = db.create_user("heidi", "Heidi", Role::Staff).unwrap();
        let cert = db.issue_certificate(user, 95.0).unwrap();

        let revoked = db.revoke_certificate(cert.id, "policy violation").unwrap();
        assert!(revoked.revoked);
        assert_eq!(revoked.revocation_reason.as_deref(), Some("policy violation"));
        assert_eq!(db.get_certificate(cert.id).unwrap().unwrap(), revoked);

        let logged = db.audit_count().unwrap();
        assert!(matches!(
            db.revoke_certificate(cert.id, "again"),
            Err(ComplianceError::AlreadyRevoked(_))
        ));
        assert_eq!(db.audit_count().unwrap(), logged);

        // Revoked overrides active, but expiry math is untouched.
        let stats = db.get_compliance_stats().unwrap();
        assert_eq!((stats.active_certs, stats.expired_certs, stats.revoked_certs), (0, 0, 1));
        clock.advance(Duration::days(400));
        let stats = db.get_compliance_stats().unwrap();
        assert_eq!((stats.active_certs, stats.expired_certs, stats.revoked_certs), (0, 1, 1));

        let un_revoke = db.conn.execute(
            "UPDATE certificates SET revoked = 0 WHERE certificate_id = ?1",
            params![cert.id.to_string()],
        );
        assert!(un_revoke.is_err());
    }

    #[test]
    fn expired_certificate_can_still_be_revoked() {
        let (mut db, clock) = memory_db();
        let user = db.create_user("ivan", "Ivan", Role::Staff).unwrap();
        let cert = db.issue_certificate(user, 82.0).unwrap();

        clock.advance(Duration::days(500));
        let revoked = db.revoke_certificate(cert.id, "superseded").unwrap();
        assert!(revoked.is_expired_at(clock.now()));

        let entry = &db.recent_audit_entries(1).unwrap()[0];
        assert!(entry.details.as_deref().unwrap().contains(r#""was_expired":true"#));
    }

    #[test]
    fn stats_average_and_pass_rate() {
        let (mut db, _) = memory_db();
        let user = db.create_user("judy", "Judy", Role::Staff).unwrap();
        for score in [85.0, 90.0, 95.0, 60.0] {
            db.record_progress(user, Some("Final"), Some(score), None).unwrap();
        }
        db.record_progress(user, Some("Intro"), None, None).unwrap();

        let stats = db.get_compliance_stats().unwrap();
        assert!((stats.avg_score - 82.5).abs() < 1e-9);
        assert!((stats.pass_rate - 75.0).abs() < 1e-9);
    }

    #[test]
    fn deleting_user_cascades_and_keeps_history() {
        let (mut db, _) = memory_db();
        let user = db.create_user("mallory", "Mallory", Role::Staff).unwrap();
        db.record_progress(user, Some("PHI Basics"), Some(81.0), None).unwrap();
        let cert = db.issue_certificate(user, 81.0).unwrap();

        db.delete_user(user).unwrap();

        assert!(db.get_user(user).unwrap().is_none());
        assert!(db.progress_for_user(user).unwrap().is_empty());
        assert!(db.get_certificate(cert.id).unwrap().is_none());
        assert!(db.audit_entries_for_user(user).unwrap().is_empty());
        assert_eq!(db.audit_count().unwrap(), 4);
        assert_eq!(db.verify_audit_chain().unwrap(), 4);

        assert!(matches!(db.delete_user(user), Err(ComplianceError::NotFound(_))));
    }

    #[test]
    fn schema_drift_is_format_error() {
        let (db, _) = memory_db();
        db.conn
            .execute(
                "INSERT INTO users (username, full_name, role, created_at)
                 VALUES ('drift', 'Drift', 'staff', 'last tuesday')",
                [],
            )
            .unwrap();
        let id = UserId(db.conn.last_insert_rowid());
        assert!(matches!(db.get_user(id), Err(ComplianceError::Format(_))));
    }

    #[test]
    fn audit_purge_respects_retention() {
        let (mut db, clock) = memory_db();
        db.create_user("old.timer", "Old Timer", Role::Staff).unwrap();

        clock.advance(Duration::days(365 * 8));
        db.create_user("new.comer", "New Comer", Role::Staff).unwrap();

        assert_eq!(db.purge_expired_audit().unwrap(), 1);
        assert_eq!(db.audit_count_for(ActionCode::AuditPurged).unwrap(), 1);
        assert_eq!(db.audit_count().unwrap(), 2);
        assert_eq!(db.verify_audit_chain().unwrap(), 2);

        assert_eq!(db.purge_expired_audit().unwrap(), 0);
        assert_eq!(db.audit_count().unwrap(), 2);
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config_at(dir.path().join("nested").join("hipaa.db"));

        let id = {
            let mut db = Database::open(&config).unwrap();
            db.create_user("persist", "Persisted User", Role::Admin).unwrap()
        };

        let db = Database::open(&config).unwrap();
        assert_eq!(db.get_user(id).unwrap().unwrap().username, "persist");
        assert_eq!(db.verify_audit_chain().unwrap(), 1);
    }

    #[test]
    fn concurrent_schema_initialisation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config_at(dir.path().join("shared.db"));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let config = config.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    Database::open(&config).map(|_| ())
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread panicked").expect("open failed");
        }

        let db = Database::open(&config).unwrap();
        for table in schema::REQUIRED_TABLES {
            let found: i64 = db
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(found, 1, "missing table {table}");
        }
    }

    #[test]
    fn certificates_read_back_equal_under_wall_clock() {
        let mut db = Database::open_in_memory(&test_config()).unwrap();
        let user = db.create_user("walter", "Walter", Role::Staff).unwrap();

        let issued = db.issue_certificate(user, 91.5).unwrap();
        assert_eq!(db.get_certificate(issued.id).unwrap().unwrap(), issued);

        let revoked = db.revoke_certificate(issued.id, "retraining").unwrap();
        assert_eq!(db.get_certificate(issued.id).unwrap().unwrap(), revoked);
        assert_eq!(db.certificates_for_user(user).unwrap(), vec![revoked]);
    }

    #[test]
    fn audit_entries_carry_the_current_origin() {
        let (mut db, _) = memory_db();
        assert_eq!(db.origin(), None);

        db.set_origin(Some("203.0.113.9"));
        let user = db.create_user("olivia", "Olivia", Role::Staff).unwrap();
        db.set_origin(Some("203.0.113.9, 10.0.0.1"));
        assert_eq!(db.origin(), Some("0.0.0.0"));
        db.record_progress(user, Some("PHI Basics"), Some(80.0), None).unwrap();
        db.set_origin(None);
        db.issue_certificate(user, 80.0).unwrap();

        let origins: Vec<Option<String>> = db
            .audit_entries_for_user(user)
            .unwrap()
            .into_iter()
            .map(|e| e.origin)
            .collect();
        assert_eq!(
            origins,
            vec![Some("203.0.113.9".to_owned()), Some("0.0.0.0".to_owned()), None]
        );
        assert_eq!(db.verify_audit_chain().unwrap(), 3);
    }

    fn evidence_db(max_evidence_bytes: u64) -> Database {
        let settings = TrainingSettings {
            kdf_iterations: 1_000,
            max_evidence_bytes,
            ..TrainingSettings::default()
        };
        let secret = EncryptionSecret::new("evidence-secret-0123456789abcdef", "evidence-salt-01");
        let config = TrainingConfig::new(settings, secret.unwrap()).unwrap();
        Database::open_in_memory(&config).unwrap()
    }

    #[test]
    fn evidence_is_encrypted_hashed_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = evidence_db(4096);
        let user = db.create_user("nina", "Nina", Role::Staff).unwrap();
        let source = dir.path().join("shred-log.txt");
        fs::write(&source, b"Shredded 14 patient intake forms").unwrap();
        let dest = dir.path().join("shred-log.enc");

        let receipt = db.encrypt_evidence(user, &source, &dest).unwrap();
        assert_eq!(receipt.file_name, "shred-log.txt");
        assert_eq!(receipt.plaintext_bytes, 32);
        assert_eq!(receipt.sha256, hash_bytes(&fs::read(&dest).unwrap()));
        db.verify_evidence(&receipt).unwrap();

        let entry = &db.recent_audit_entries(1).unwrap()[0];
        assert_eq!(entry.action, ActionCode::EvidenceEncrypted);
        let detail = entry.details.as_deref().unwrap();
        assert!(detail.contains(&receipt.sha256));
        assert!(!detail.contains("patient intake"));

        let restored = dir.path().join("restored.txt");
        assert_eq!(db.decrypt_evidence(&receipt, &restored).unwrap(), 32);
        assert_eq!(fs::read(&restored).unwrap(), fs::read(&source).unwrap());
    }

    #[test]
    fn evidence_over_configured_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = evidence_db(64);
        let user = db.create_user("oscar", "Oscar", Role::Staff).unwrap();
        let source = dir.path().join("scan.pdf");
        fs::write(&source, vec![0u8; 65]).unwrap();
        let dest = dir.path().join("scan.enc");

        assert!(matches!(
            db.encrypt_evidence(user, &source, &dest),
            Err(ComplianceError::Validation { field: "evidence", .. })
        ));
        assert!(!dest.exists());
        assert_eq!(db.audit_count_for(ActionCode::EvidenceEncrypted).unwrap(), 0);

        fs::write(&source, vec![0u8; 64]).unwrap();
        assert!(db.encrypt_evidence(user, &source, &dest).is_ok());
    }

    #[test]
    fn evidence_failures_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = evidence_db(4096);
        let source = dir.path().join("badge.png");
        fs::write(&source, b"png").unwrap();
        let dest = dir.path().join("badge.enc");

        assert!(matches!(
            db.encrypt_evidence(UserId(404), &source, &dest),
            Err(ComplianceError::NotFound(_))
        ));
        assert!(!dest.exists());

        let user = db.create_user("paula", "Paula", Role::Staff).unwrap();
        db.conn.execute_batch("DROP TABLE audit_log").unwrap();
        assert!(matches!(
            db.encrypt_evidence(user, &source, &dest),
            Err(ComplianceError::AuditWrite(_))
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn tampered_evidence_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = evidence_db(4096);
        let user = db.create_user("quinn", "Quinn", Role::Staff).unwrap();
        let source = dir.path().join("note.txt");
        fs::write(&source, b"visitor log reviewed").unwrap();
        let dest = dir.path().join("note.enc");
        let receipt = db.encrypt_evidence(user, &source, &dest).unwrap();

        let mut bytes = fs::read(&dest).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&dest, bytes).unwrap();

        assert!(matches!(db.verify_evidence(&receipt), Err(ComplianceError::Integrity(_))));
        let restored = dir.path().join("note.out");
        assert!(db.decrypt_evidence(&receipt, &restored).is_err());
        assert!(!restored.exists());
    }
}
