use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, CustomerId, ledger_now};

pub type AccountId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Created,
    Activated,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Created => "CREATED",
            AccountStatus::Activated => "ACTIVATED",
            AccountStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATED" => Some(AccountStatus::Created),
            "ACTIVATED" => Some(AccountStatus::Activated),
            "SUSPENDED" => Some(AccountStatus::Suspended),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Variant-specific part of an account. The set is closed: every rule that
/// depends on the variant dispatches on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccountKind {
    /// Checking account that may go negative down to `-over_draft`.
    Current { over_draft: Cents },
    /// Saving account; the rate is informational only, nothing accrues.
    Saving { interest_rate: f64 },
}

impl AccountKind {
    /// Discriminator stored in the `account_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Current { .. } => "current",
            AccountKind::Saving { .. } => "saving",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: AccountId,
    /// Cached running balance, written in the same transaction as each operation.
    pub balance: Cents,
    /// Balance the account was opened with. Never changes.
    pub opening_balance: Cents,
    pub created_at: DateTime<Utc>,
    pub status: AccountStatus,
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub kind: AccountKind,
    /// Optimistic concurrency counter, bumped on every balance write.
    #[serde(skip)]
    pub version: i64,
}

impl BankAccount {
    pub fn new_current(initial_balance: Cents, over_draft: Cents, customer_id: CustomerId) -> Self {
        Self::open(initial_balance, customer_id, AccountKind::Current { over_draft })
    }

    pub fn new_saving(initial_balance: Cents, interest_rate: f64, customer_id: CustomerId) -> Self {
        Self::open(
            initial_balance,
            customer_id,
            AccountKind::Saving { interest_rate },
        )
    }

    fn open(initial_balance: Cents, customer_id: CustomerId, kind: AccountKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            balance: initial_balance,
            opening_balance: initial_balance,
            created_at: ledger_now(),
            status: AccountStatus::Created,
            customer_id,
            kind,
            version: 0,
        }
    }

    /// Funds a debit is checked against: the balance for saving accounts,
    /// balance plus overdraft for current accounts. Saturates at `Cents::MAX`.
    pub fn available_funds(&self) -> Cents {
        match self.kind {
            AccountKind::Current { over_draft } => self.balance.saturating_add(over_draft),
            AccountKind::Saving { .. } => self.balance,
        }
    }

    pub fn can_debit(&self, amount: Cents) -> bool {
        self.available_funds() >= amount
    }

    pub fn over_draft(&self) -> Option<Cents> {
        match self.kind {
            AccountKind::Current { over_draft } => Some(over_draft),
            AccountKind::Saving { .. } => None,
        }
    }

    pub fn interest_rate(&self) -> Option<f64> {
        match self.kind {
            AccountKind::Saving { interest_rate } => Some(interest_rate),
            AccountKind::Current { .. } => None,
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self.kind, AccountKind::Current { .. })
    }
}
