use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// Failures surfaced by a `UserRepository`.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("user {id} not found")]
    NotFound { id: i64 },

    #[error("no user with email {email}")]
    EmailNotFound { email: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl RepoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RepoError::NotFound { .. } | RepoError::EmailNotFound { .. } => StatusCode::NOT_FOUND,
            RepoError::Validation(_) => StatusCode::BAD_REQUEST,
            RepoError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handler rejection in the `(StatusCode, String)` shape used by every route.
pub fn reject(e: RepoError) -> (StatusCode, String) {
    let status = e.status();
    if status.is_server_error() {
        error!(error = %e, "repository failure");
    }
    (status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(RepoError::NotFound { id: 7 }.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            RepoError::EmailNotFound { email: "a@b.com".into() }.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(RepoError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RepoError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn reject_keeps_message() {
        let (status, msg) = reject(RepoError::NotFound { id: 3 });
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(msg, "user 3 not found");
    }
}
