// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// rusqlite error mapping and typed column access shared by the audit trail
// and the store.

use chrono::{DateTime, Utc};
use hipaa_core::error::ComplianceError;
use hipaa_core::types::parse_timestamp;
use rusqlite::Row;
use rusqlite::types::FromSql;

/// Convert a `rusqlite::Error` into a `ComplianceError::Storage`.
pub fn storage_err(e: rusqlite::Error) -> ComplianceError {
    ComplianceError::Storage(e.to_string())
}

/// Errors raised while decoding a row: a column of the wrong type or a
/// missing column is schema drift, not a storage failure.
pub fn decode_err(e: rusqlite::Error) -> ComplianceError {
    match e {
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnIndex(_)
        | rusqlite::Error::InvalidColumnName(_)
        | rusqlite::Error::IntegralValueOutOfRange(..) => ComplianceError::Format(e.to_string()),
        other => storage_err(other),
    }
}

/// Read a named column as `T`.
pub fn column<T: FromSql>(row: &Row<'_>, name: &str) -> Result<T, ComplianceError> {
    row.get(name).map_err(decode_err)
}

/// Read a named column holding a stored timestamp.
pub fn timestamp_column(row: &Row<'_>, name: &str) -> Result<DateTime<Utc>, ComplianceError> {
    let raw: String = column(row, name)?;
    parse_timestamp(&raw)
}

/// Read a nullable timestamp column.
pub fn optional_timestamp_column(
    row: &Row<'_>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, ComplianceError> {
    let raw: Option<String> = column(row, name)?;
    raw.as_deref().map(parse_timestamp).transpose()
}
