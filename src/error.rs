//! Error kinds surfaced by the repost subsystem.
//!
//! The set is closed: the API boundary formats each kind into a stable
//! public status instead of switching on arbitrary error values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepostError {
    #[error("not found")]
    NotFound,
    #[error("repost request already exists")]
    AlreadyExists,
    #[error("access denied")]
    AccessDenied,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl RepostError {
    /// Public HTTP status for this kind. `AccessDenied` maps to 404: a
    /// URL outside the caller's lineage must look absent.
    pub fn public_status(&self) -> u16 {
        match self {
            RepostError::NotFound | RepostError::AccessDenied => 404,
            RepostError::AlreadyExists => 409,
            RepostError::Database(_) | RepostError::Migrate(_) => 500,
        }
    }
}
