use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents};

pub type OperationId = i64;

/// Current time at the precision the store keeps (microseconds), so a value
/// read back compares equal to the one that was written.
pub fn ledger_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Debit,
    Credit,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Debit => "DEBIT",
            OperationType::Credit => "CREDIT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEBIT" => Some(OperationType::Debit),
            "CREDIT" => Some(OperationType::Credit),
            _ => None,
        }
    }

    /// Sign applied to the amount when folding operations into a balance.
    pub fn signed(&self, amount: Cents) -> Cents {
        match self {
            OperationType::Debit => -amount,
            OperationType::Credit => amount,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable movement on an account. The amount is always a positive
/// magnitude; the direction lives in `operation_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOperation {
    pub id: OperationId,
    pub account_id: AccountId,
    pub date: DateTime<Utc>,
    pub amount: Cents,
    pub operation_type: OperationType,
    pub description: String,
}

/// An operation about to be appended; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    pub account_id: AccountId,
    pub date: DateTime<Utc>,
    pub amount: Cents,
    pub operation_type: OperationType,
    pub description: String,
}

impl NewOperation {
    pub fn debit(account_id: AccountId, amount: Cents, description: impl Into<String>) -> Self {
        Self::new(account_id, OperationType::Debit, amount, description)
    }

    pub fn credit(account_id: AccountId, amount: Cents, description: impl Into<String>) -> Self {
        Self::new(account_id, OperationType::Credit, amount, description)
    }

    fn new(
        account_id: AccountId,
        operation_type: OperationType,
        amount: Cents,
        description: impl Into<String>,
    ) -> Self {
        assert!(amount > 0, "Operation amount must be positive");
        Self {
            account_id,
            date: ledger_now(),
            amount,
            operation_type,
            description: description.into(),
        }
    }

    pub fn with_id(self, id: OperationId) -> AccountOperation {
        AccountOperation {
            id,
            account_id: self.account_id,
            date: self.date,
            amount: self.amount,
            operation_type: self.operation_type,
            description: self.description,
        }
    }
}
