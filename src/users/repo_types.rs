use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::error::RepoError;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Option<i64>, // assigned on first save
    pub name: String,
    pub email: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl User {
    /// Transient user, not yet persisted.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Checks the write-time constraints on name and email.
    pub fn validate(&self) -> Result<(), RepoError> {
        if self.name.trim().is_empty() {
            return Err(RepoError::validation("name must not be blank"));
        }
        if !is_valid_email(&self.email) {
            return Err(RepoError::validation(format!(
                "invalid email: {}",
                self.email
            )));
        }
        Ok(())
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Drops sub-microsecond precision, matching what `TIMESTAMPTZ` stores.
pub(crate) fn truncate_micros(ts: OffsetDateTime) -> OffsetDateTime {
    ts.replace_nanosecond(ts.nanosecond() / 1_000 * 1_000)
        .unwrap_or(ts)
}

pub(crate) fn now_micros() -> OffsetDateTime {
    truncate_micros(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_is_transient() {
        let user = User::new("jack", "jack@email.com");
        assert_eq!(user.id, None);
        assert_eq!(user.created_at, None);
        assert_eq!(user.updated_at, None);
    }

    #[test]
    fn validate_rejects_blank_name() {
        let err = User::new("  ", "jack@email.com").validate().unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[test]
    fn validate_rejects_malformed_email() {
        for email in ["", "jack", "jack@", "jack@email", "ja ck@email.com"] {
            let err = User::new("jack", email).validate().unwrap_err();
            assert!(matches!(err, RepoError::Validation(_)), "{email}");
        }
        assert!(User::new("jack", "jack@email.com").validate().is_ok());
    }

    #[test]
    fn now_micros_has_no_sub_microsecond_part() {
        assert_eq!(now_micros().nanosecond() % 1_000, 0);
    }

    #[test]
    fn truncate_micros_keeps_whole_microseconds() {
        let ts = time::macros::datetime!(2024-01-02 03:04:05.123456789 UTC);
        let truncated = truncate_micros(ts);
        assert_eq!(truncated.nanosecond(), 123_456_000);
        assert_eq!(truncate_micros(truncated), truncated);
    }

    #[test]
    fn serializes_timestamps_as_rfc3339() {
        let mut user = User::new("jack", "jack@email.com").with_id(1);
        user.created_at = Some(time::macros::datetime!(2024-01-02 03:04:05 UTC));
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["created_at"], "2024-01-02T03:04:05Z");
        assert!(json["updated_at"].is_null());
    }
}
