//! Error taxonomy shared by the auth core and the moderation engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// No valid session. Also used for every login failure so callers cannot
    /// tell an unknown username from a wrong password.
    #[error("Authentication required")]
    Unauthorized,

    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A composite write was only partially applied and needs operator attention
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    /// Map a unique-constraint violation to `Conflict`, leaving other store errors alone
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.message().contains("UNIQUE constraint failed") {
                return Error::Conflict(format!("{} already exists", what));
            }
        }
        Error::Store(err)
    }
}
