use thiserror::Error;

/// SQLite primary result codes that mean "someone else holds the lock".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A versioned write found the row changed since it was read.
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Conflicts and lock contention leave nothing behind once the
    /// transaction is rolled back, so the whole unit of work can be replayed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Busy(_))
    }

    pub(crate) fn corrupt(what: impl std::fmt::Display) -> Self {
        StoreError::Corrupt(what.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_lock_contention(&err) {
            StoreError::Busy(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

fn is_lock_contention(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    // Extended codes (e.g. 517 BUSY_SNAPSHOT) carry the primary code in the low byte.
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_and_busy_are_retryable() {
        let conflict = StoreError::Conflict {
            entity: "account",
            id: "abc".into(),
        };
        assert!(conflict.is_retryable());
        assert!(StoreError::Busy("locked".into()).is_retryable());
        assert!(!StoreError::corrupt("bad uuid").is_retryable());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn test_conflict_message() {
        let err = StoreError::Conflict {
            entity: "account",
            id: "abc".into(),
        };
        assert_eq!(err.to_string(), "Concurrent modification of account abc");
    }
}
