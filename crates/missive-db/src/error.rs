use missive_types::models::MessageId;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced message, parent or notification does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A user id that the operation depends on cannot be resolved.
    #[error("{entity} {id} does not exist")]
    InvalidReference { entity: &'static str, id: String },

    /// Another writer changed the message first. Retrying the whole
    /// operation is safe.
    #[error("message {message_id} was modified concurrently")]
    ConflictingEdit { message_id: MessageId },

    /// A delete and its cascades could not complete; nothing was removed.
    #[error("deleting {entity} {id} failed: {reason}")]
    CascadeFailure {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("username already taken: {0}")]
    DuplicateUser(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("DB lock poisoned")]
    LockPoisoned,

    /// A stored value failed to parse back into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_reference(entity: &'static str, id: impl ToString) -> Self {
        StoreError::InvalidReference {
            entity,
            id: id.to_string(),
        }
    }

    /// SQLite reports a competing writer as BUSY/LOCKED. For an edit that is
    /// a lost race, so surface it the same way as a failed compare-and-swap.
    pub(crate) fn into_conflict(self, message_id: MessageId) -> Self {
        match self {
            StoreError::Sqlite(ref e) if is_busy(e) => StoreError::ConflictingEdit { message_id },
            other => other,
        }
    }

    /// Collapse any failure inside a delete into a single `CascadeFailure`.
    /// Lookup failures pass through unchanged.
    pub(crate) fn into_cascade(self, entity: &'static str, id: impl ToString) -> Self {
        match self {
            e @ (StoreError::NotFound { .. } | StoreError::InvalidReference { .. }) => e,
            other => StoreError::CascadeFailure {
                entity,
                id: id.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
