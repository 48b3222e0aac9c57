// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-English messages for the menu front end.
//
// Every typed error maps to a message, a suggestion, and a severity. The
// core never prints these; the embedding CLI decides how to show them.

use crate::error::ComplianceError;

/// Severity of an error from the trainee's or administrator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Storage busy or briefly unavailable; retrying may work.
    Transient,
    /// The person at the keyboard must change their input.
    ActionRequired,
    /// Retrying will not help (tampered data, unknown record).
    Permanent,
    /// The deployment itself is misconfigured; an administrator must act.
    Fatal,
}

/// A human-readable error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

fn human(
    message: &str,
    suggestion: impl Into<String>,
    retriable: bool,
    severity: Severity,
) -> HumanError {
    HumanError {
        message: message.into(),
        suggestion: suggestion.into(),
        retriable,
        severity,
    }
}

/// Convert a `ComplianceError` into something an operator can act on.
pub fn humanize_error(err: &ComplianceError) -> HumanError {
    match err {
        ComplianceError::Config(detail) => human(
            "The training system is not configured correctly.",
            format!("Ask your administrator to check the environment settings. ({detail})"),
            false,
            Severity::Fatal,
        ),

        ComplianceError::Validation { field, reason } => human(
            "Some of the information entered isn't valid.",
            format!("Please check the {field} and try again: {reason}."),
            false,
            Severity::ActionRequired,
        ),

        ComplianceError::DuplicateUser(username) => human(
            "That username is already taken.",
            format!("Choose a different username than {username:?}."),
            false,
            Severity::ActionRequired,
        ),

        ComplianceError::NotFound(what) => human(
            "We couldn't find that record.",
            format!("Check the identifier and try again. ({what})"),
            false,
            Severity::Permanent,
        ),

        ComplianceError::AlreadyRevoked(id) => human(
            "That certificate has already been revoked.",
            format!("No further action is needed for certificate {id}."),
            false,
            Severity::Permanent,
        ),

        ComplianceError::Integrity(_) | ComplianceError::AuditChainBroken { .. } => human(
            "Stored data failed its integrity check.",
            "The data may have been altered. Report this to your compliance officer immediately.",
            false,
            Severity::Permanent,
        ),

        ComplianceError::Format(_) => human(
            "Stored data is in an unexpected format.",
            "The database may have been edited by another tool. Restore a backup if this persists.",
            false,
            Severity::Permanent,
        ),

        ComplianceError::Encryption(_) => human(
            "Sensitive data could not be protected, so it was not saved.",
            "Try again. If this keeps happening, contact your administrator.",
            true,
            Severity::Transient,
        ),

        ComplianceError::UnsupportedFormat(format) => human(
            "That report format isn't supported.",
            format!("Choose csv or json instead of {format:?}."),
            false,
            Severity::ActionRequired,
        ),

        ComplianceError::AuditWrite(_) => human(
            "The action was cancelled because it could not be recorded in the audit log.",
            "Nothing was changed. Check free disk space and try again.",
            true,
            Severity::Transient,
        ),

        ComplianceError::Storage(detail) => {
            if detail.contains("locked") || detail.contains("busy") {
                human(
                    "The training database is busy.",
                    "Another session is saving right now. Wait a moment and try again.",
                    true,
                    Severity::Transient,
                )
            } else {
                human(
                    "The training database had a problem.",
                    "Nothing was changed. Try again; if it keeps happening, check free disk space.",
                    true,
                    Severity::Transient,
                )
            }
        }

        ComplianceError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => human(
                "The file couldn't be found.",
                "It may have been moved or deleted. Check the path and try again.",
                false,
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => human(
                "Permission denied while accessing a file.",
                "Check the file and directory permissions.",
                false,
                Severity::ActionRequired,
            ),
            _ => human(
                "There was a problem reading or writing a file.",
                "Try again. If this keeps happening, the disk may be full.",
                true,
                Severity::Transient,
            ),
        },

        ComplianceError::Serialization(_) => human(
            "The system had an internal data problem.",
            "Try again. If this keeps happening, please report it.",
            true,
            Severity::Transient,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secret_is_fatal() {
        let err = ComplianceError::Config("HIPAA_ENCRYPTION_KEY required".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Fatal);
        assert!(!human.retriable);
    }

    #[test]
    fn duplicate_user_names_the_username() {
        let human = humanize_error(&ComplianceError::DuplicateUser("alice".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.suggestion.contains("alice"));
    }

    #[test]
    fn audit_failure_is_retriable() {
        let human = humanize_error(&ComplianceError::AuditWrite("disk I/O error".into()));
        assert!(human.retriable);
        assert!(human.message.contains("audit"));
    }

    #[test]
    fn locked_database_is_transient() {
        let human = humanize_error(&ComplianceError::Storage("database is locked".into()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.message.contains("busy"));
    }

    #[test]
    fn tampering_is_permanent() {
        let err = ComplianceError::Integrity("authentication tag mismatch".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Permanent);
    }
}
