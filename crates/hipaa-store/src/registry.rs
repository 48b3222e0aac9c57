// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// User registry: validates and sanitises account input before it reaches the
// persistence core.

use std::sync::Arc;

use hipaa_core::error::{ComplianceError, Result};
use hipaa_core::types::{Role, User, UserId};
use tracing::instrument;

use crate::db::{SharedDatabase, lock};
use crate::sanitize::{HtmlSanitizer, Sanitizer};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const FULL_NAME_MAX_LEN: usize = 100;

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ComplianceError::invalid(
            "username",
            format!("must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters, got {len}"),
        ));
    }
    if let Some(bad) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(ComplianceError::invalid(
            "username",
            format!("character {bad:?} not allowed; use letters, digits, '_', '.', '-'"),
        ));
    }
    Ok(())
}

/// Account management on top of a shared [`crate::Database`].
#[derive(Clone)]
pub struct UserRegistry {
    db: SharedDatabase,
    sanitizer: Arc<dyn Sanitizer>,
}

impl UserRegistry {
    pub fn new(db: SharedDatabase) -> Self {
        Self::with_sanitizer(db, Arc::new(HtmlSanitizer))
    }

    pub fn with_sanitizer(db: SharedDatabase, sanitizer: Arc<dyn Sanitizer>) -> Self {
        Self { db, sanitizer }
    }

    /// Create an account. `role` is one of `admin`, `staff`, `auditor`
    /// (case-insensitive).
    ///
    /// All validation happens before the database is touched, so a rejected
    /// request leaves no audit entry.
    #[instrument(skip(self, full_name))]
    pub fn create_user(&self, username: &str, full_name: &str, role: &str) -> Result<UserId> {
        let role: Role = role.parse()?;

        let username = username.trim();
        if username.is_empty() {
            return Err(ComplianceError::invalid("username", "must not be empty"));
        }
        validate_username(username)?;

        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(ComplianceError::invalid("full_name", "must not be empty"));
        }

        let username = self.sanitizer.sanitize(username, USERNAME_MAX_LEN);
        let full_name = self.sanitizer.sanitize(full_name, FULL_NAME_MAX_LEN);
        if username.is_empty() || full_name.is_empty() {
            return Err(ComplianceError::invalid(
                "user",
                "nothing left after sanitisation",
            ));
        }

        lock(&self.db)?.create_user(&username, &full_name, role)
    }

    pub fn user_exists(&self, user_id: UserId) -> Result<bool> {
        lock(&self.db)?.user_exists(user_id)
    }

    pub fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        lock(&self.db)?.get_user(user_id)
    }

    /// Remove an account together with its progress and certificates.
    pub fn delete_user(&self, user_id: UserId) -> Result<()> {
        lock(&self.db)?.delete_user(user_id)
    }

    pub fn user_count(&self) -> Result<u64> {
        lock(&self.db)?.user_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::shared_memory_db;
    use hipaa_core::types::ActionCode;
    use std::sync::Mutex;

    fn audit_count(registry: &UserRegistry) -> u64 {
        lock(&registry.db).unwrap().audit_count().unwrap()
    }

    #[test]
    fn creates_user_with_parsed_role() {
        let (db, _) = shared_memory_db();
        let registry = UserRegistry::new(db);

        let id = registry.create_user("  alice  ", "Alice Example", "Staff").unwrap();
        let user = registry.get_user(id).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, Role::Staff);
        assert!(registry.user_exists(id).unwrap());
        assert_eq!(audit_count(&registry), 1);
    }

    #[test]
    fn rejects_invalid_input_without_audit() {
        let (db, _) = shared_memory_db();
        let registry = UserRegistry::new(db);

        let cases = [
            ("bob", "Bob", "superuser", "role"),
            ("   ", "Bob", "staff", "username"),
            ("ab", "Bob", "staff", "username"),
            ("bob smith", "Bob", "staff", "username"),
            ("<script>", "Bob", "staff", "username"),
            ("bob", "   ", "staff", "full_name"),
        ];
        for (username, full_name, role, expected) in cases {
            match registry.create_user(username, full_name, role) {
                Err(ComplianceError::Validation { field, .. }) => {
                    assert_eq!(field, expected, "input {username:?}/{full_name:?}/{role:?}")
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }

        let too_long = "a".repeat(USERNAME_MAX_LEN + 1);
        assert!(registry.create_user(&too_long, "Long", "staff").is_err());

        assert_eq!(registry.user_count().unwrap(), 0);
        assert_eq!(audit_count(&registry), 0);
    }

    #[test]
    fn full_name_is_escaped_and_capped() {
        let (db, _) = shared_memory_db();
        let registry = UserRegistry::new(db);

        let id = registry.create_user("eve", "<b>Eve</b>", "auditor").unwrap();
        assert_eq!(registry.get_user(id).unwrap().unwrap().full_name, "&lt;b&gt;Eve&lt;/b&gt;");

        let id = registry.create_user("long.name", &"x".repeat(300), "staff").unwrap();
        assert_eq!(
            registry.get_user(id).unwrap().unwrap().full_name.chars().count(),
            FULL_NAME_MAX_LEN
        );
    }

    #[test]
    fn duplicate_username_is_reported() {
        let (db, _) = shared_memory_db();
        let registry = UserRegistry::new(db);

        registry.create_user("dup.user", "First", "staff").unwrap();
        let err = registry.create_user("dup.user", "Second", "admin").unwrap_err();
        assert!(matches!(err, ComplianceError::DuplicateUser(_)));
        assert!(err.to_string().contains("already exists"));
        assert_eq!(registry.user_count().unwrap(), 1);
    }

    struct RecordingSanitizer {
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl Sanitizer for RecordingSanitizer {
        fn sanitize(&self, raw: &str, max_len: usize) -> String {
            self.seen.lock().unwrap().push((raw.to_owned(), max_len));
            raw.to_uppercase()
        }
    }

    #[test]
    fn delegates_to_injected_sanitizer() {
        let (db, _) = shared_memory_db();
        let sanitizer = Arc::new(RecordingSanitizer {
            seen: Mutex::new(Vec::new()),
        });
        let registry = UserRegistry::with_sanitizer(db, sanitizer.clone());

        let id = registry.create_user("trent", "Trent Auditor", "auditor").unwrap();
        assert_eq!(registry.get_user(id).unwrap().unwrap().full_name, "TRENT AUDITOR");
        assert_eq!(
            *sanitizer.seen.lock().unwrap(),
            vec![
                ("trent".to_owned(), USERNAME_MAX_LEN),
                ("Trent Auditor".to_owned(), FULL_NAME_MAX_LEN),
            ]
        );
    }

    #[test]
    fn delete_user_is_audited() {
        let (db, _) = shared_memory_db();
        let registry = UserRegistry::new(db.clone());

        let id = registry.create_user("leaver", "Leaving User", "staff").unwrap();
        registry.delete_user(id).unwrap();

        assert!(!registry.user_exists(id).unwrap());
        let db = lock(&db).unwrap();
        assert_eq!(db.audit_count_for(ActionCode::UserDeleted).unwrap(), 1);
        assert_eq!(db.verify_audit_chain().unwrap(), 2);
    }
}
