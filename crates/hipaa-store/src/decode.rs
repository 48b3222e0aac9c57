// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Explicit row decoders. Each checks that required columns are present and
// correctly typed, and reports drift as `ComplianceError::Format`.

use hipaa_core::error::{ComplianceError, Result};
use hipaa_core::types::{
    Certificate, CertificateId, ChecklistPayload, ProgressRecord, Role, User, UserId,
};
use hipaa_security::sql::{column, optional_timestamp_column, timestamp_column};
use rusqlite::Row;

pub(crate) const USER_COLUMNS: &str = "id, username, full_name, role, created_at";

pub(crate) const PROGRESS_COLUMNS: &str =
    "id, user_id, lesson_title, quiz_score, checklist_data, checklist_ciphertext, completed_at";

pub(crate) const CERTIFICATE_COLUMNS: &str = "certificate_id, user_id, score, issued_at, \
     expires_at, revoked, revoked_at, revocation_reason";

pub(crate) fn decode_user(row: &Row<'_>) -> Result<User> {
    let role: String = column(row, "role")?;
    let role = role
        .parse::<Role>()
        .map_err(|_| ComplianceError::Format(format!("unknown role {role:?} in users table")))?;

    Ok(User {
        id: UserId(column(row, "id")?),
        username: column(row, "username")?,
        full_name: column(row, "full_name")?,
        role,
        created_at: timestamp_column(row, "created_at")?,
    })
}

pub(crate) fn decode_progress(row: &Row<'_>) -> Result<ProgressRecord> {
    let plain: Option<String> = column(row, "checklist_data")?;
    let sealed: Option<Vec<u8>> = column(row, "checklist_ciphertext")?;

    let checklist = match (plain, sealed) {
        (None, None) => None,
        (Some(json), None) => Some(ChecklistPayload::Plain(
            serde_json::from_str(&json)
                .map_err(|e| ComplianceError::Format(format!("checklist_data is not JSON: {e}")))?,
        )),
        (None, Some(blob)) => Some(ChecklistPayload::Encrypted(blob)),
        (Some(_), Some(_)) => {
            return Err(ComplianceError::Format(
                "progress row has both plain and encrypted checklist".into(),
            ));
        }
    };

    Ok(ProgressRecord {
        id: column(row, "id")?,
        user_id: UserId(column(row, "user_id")?),
        lesson_title: column(row, "lesson_title")?,
        quiz_score: column(row, "quiz_score")?,
        checklist,
        completed_at: timestamp_column(row, "completed_at")?,
    })
}

pub(crate) fn decode_certificate(row: &Row<'_>) -> Result<Certificate> {
    let id: String = column(row, "certificate_id")?;
    let revoked: i64 = column(row, "revoked")?;
    let revoked = match revoked {
        0 => false,
        1 => true,
        other => {
            return Err(ComplianceError::Format(format!(
                "certificate {id}: revoked flag {other}"
            )));
        }
    };

    Ok(Certificate {
        id: id.parse::<CertificateId>()?,
        user_id: UserId(column(row, "user_id")?),
        score: column(row, "score")?,
        issued_at: timestamp_column(row, "issued_at")?,
        expires_at: timestamp_column(row, "expires_at")?,
        revoked,
        revoked_at: optional_timestamp_column(row, "revoked_at")?,
        revocation_reason: column(row, "revocation_reason")?,
    })
}
