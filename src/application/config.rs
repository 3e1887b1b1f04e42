use std::time::Duration;

use crate::storage::StoreOptions;

/// Default database file, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "argentarius.db";

/// Runtime settings for [`LedgerService`](super::LedgerService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database_path: String,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
    /// Extra attempts for a unit of work that lost a write race.
    pub max_conflict_retries: u32,
    /// Page size used when the caller does not ask for one.
    pub default_page_size: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            busy_timeout: Duration::from_secs(5),
            max_conflict_retries: 5,
            default_page_size: 5,
        }
    }
}

impl LedgerConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: self.busy_timeout,
            ..StoreOptions::default()
        }
    }
}
