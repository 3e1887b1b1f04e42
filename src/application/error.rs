use thiserror::Error;

use crate::domain::{AccountId, Cents, CustomerId};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),

    #[error("Bank account not found: {0}")]
    AccountNotFound(AccountId),

    #[error(
        "Insufficient balance on account {account_id}: available {available}, requested {requested}"
    )]
    InsufficientBalance {
        account_id: AccountId,
        available: Cents,
        requested: Cents,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid page size: {0} (must be at least 1)")]
    InvalidPageSize(u32),

    #[error("Customer {customer_id} still owns {accounts} account(s)")]
    CustomerHasAccounts {
        customer_id: CustomerId,
        accounts: i64,
    },

    #[error("Gave up after {attempts} attempts: {source}")]
    ConcurrentModification {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    /// Business-rule failures. Nothing was written.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::CustomerNotFound(_)
                | AppError::AccountNotFound(_)
                | AppError::InsufficientBalance { .. }
                | AppError::InvalidAmount(_)
                | AppError::InvalidPageSize(_)
                | AppError::CustomerHasAccounts { .. }
        )
    }
}
