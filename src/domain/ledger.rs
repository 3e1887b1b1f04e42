use std::collections::HashMap;

use serde::Serialize;

use super::{AccountId, AccountOperation, BankAccount, Cents, OperationType};

/// Recompute a balance from the opening balance and the operation log.
/// Balance = opening + sum(credits) - sum(debits)
///
/// Returns `None` when the result does not fit in [`Cents`].
pub fn replay_balance(opening_balance: Cents, operations: &[AccountOperation]) -> Option<Cents> {
    let mut totals = OperationTotals::default();
    for op in operations {
        totals.record(op.operation_type, op.amount);
    }
    totals.apply_to(opening_balance)
}

/// Per-account sums over the operation log.
///
/// Sums are kept wide: lifetime credits may exceed `Cents::MAX` while the
/// balance itself stays in range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationTotals {
    pub credits: i128,
    pub debits: i128,
    pub count: i64,
}

impl OperationTotals {
    pub fn record(&mut self, operation_type: OperationType, amount: Cents) {
        match operation_type {
            OperationType::Credit => self.credits += i128::from(amount),
            OperationType::Debit => self.debits += i128::from(amount),
        }
        self.count += 1;
    }

    pub fn net(&self) -> i128 {
        self.credits - self.debits
    }

    /// `opening + net`, or `None` if that leaves the [`Cents`] range.
    pub fn apply_to(&self, opening_balance: Cents) -> Option<Cents> {
        Cents::try_from(i128::from(opening_balance) + self.net()).ok()
    }
}

/// An account whose cached balance disagrees with its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub cached: Cents,
    /// `None` when the log replays to a value outside the [`Cents`] range.
    pub replayed: Option<Cents>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub account_count: usize,
    pub operation_count: i64,
    pub mismatches: Vec<BalanceMismatch>,
    /// Accounts whose balance sits below what the variant allows.
    pub overdrawn: Vec<AccountId>,
}

impl ReconciliationReport {
    pub fn is_healthy(&self) -> bool {
        self.mismatches.is_empty() && self.overdrawn.is_empty()
    }
}

pub fn build_reconciliation_report(
    accounts: &[BankAccount],
    totals: &HashMap<AccountId, OperationTotals>,
) -> ReconciliationReport {
    let mut mismatches = Vec::new();
    let mut overdrawn = Vec::new();
    let mut operation_count = 0;

    for account in accounts {
        let account_totals = totals.get(&account.id).copied().unwrap_or_default();
        operation_count += account_totals.count;

        let replayed = account_totals.apply_to(account.opening_balance);
        if replayed != Some(account.balance) {
            mismatches.push(BalanceMismatch {
                account_id: account.id,
                cached: account.balance,
                replayed,
            });
        }
        // An opening balance may legitimately start below the floor; only
        // flag accounts that moved there.
        if account.available_funds() < 0 && account_totals.count > 0 {
            overdrawn.push(account.id);
        }
    }

    ReconciliationReport {
        account_count: accounts.len(),
        operation_count,
        mismatches,
        overdrawn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewOperation, OperationType};

    fn op(account: AccountId, kind: OperationType, amount: Cents) -> AccountOperation {
        match kind {
            OperationType::Debit => NewOperation::debit(account, amount, "d"),
            OperationType::Credit => NewOperation::credit(account, amount, "c"),
        }
        .with_id(0)
    }

    #[test]
    fn test_replay_empty_log_is_opening_balance() {
        assert_eq!(replay_balance(12_300, &[]), Some(12_300));
    }

    #[test]
    fn test_replay_mixed_log() {
        let account = uuid::Uuid::new_v4();
        let ops = vec![
            op(account, OperationType::Credit, 5_000),
            op(account, OperationType::Debit, 1_500),
            op(account, OperationType::Debit, 8_000),
        ];
        assert_eq!(replay_balance(1_000, &ops), Some(-3_500));
    }

    #[test]
    fn test_replay_survives_lifetime_credits_above_max() {
        let account = uuid::Uuid::new_v4();
        let ops = vec![
            op(account, OperationType::Credit, Cents::MAX),
            op(account, OperationType::Debit, Cents::MAX),
            op(account, OperationType::Credit, Cents::MAX),
        ];
        assert_eq!(replay_balance(0, &ops), Some(Cents::MAX));
        assert_eq!(replay_balance(1, &ops), None);
    }

    #[test]
    fn test_totals_record() {
        let mut totals = OperationTotals::default();
        totals.record(OperationType::Credit, Cents::MAX);
        totals.record(OperationType::Credit, Cents::MAX);
        totals.record(OperationType::Debit, 10);
        assert_eq!(totals.count, 3);
        assert_eq!(totals.net(), 2 * i128::from(Cents::MAX) - 10);
        assert_eq!(totals.apply_to(-Cents::MAX), Some(Cents::MAX - 10));
        assert_eq!(totals.apply_to(0), None);
    }

    #[test]
    fn test_report_flags_out_of_range_replay() {
        let account = BankAccount::new_saving(10, 1.0, 1);

        let mut totals = HashMap::new();
        totals.insert(
            account.id,
            OperationTotals {
                credits: i128::from(Cents::MAX),
                debits: 0,
                count: 1,
            },
        );

        let report = build_reconciliation_report(&[account.clone()], &totals);
        assert_eq!(
            report.mismatches,
            vec![BalanceMismatch {
                account_id: account.id,
                cached: 10,
                replayed: None,
            }]
        );
    }

    #[test]
    fn test_report_healthy_when_cache_matches_log() {
        let mut account = BankAccount::new_current(100_000, 20_000, 1);
        account.balance = -15_000;

        let mut totals = HashMap::new();
        totals.insert(
            account.id,
            OperationTotals {
                credits: 0,
                debits: 115_000,
                count: 1,
            },
        );

        let report = build_reconciliation_report(&[account], &totals);
        assert!(report.is_healthy());
        assert_eq!(report.account_count, 1);
        assert_eq!(report.operation_count, 1);
    }

    #[test]
    fn test_report_flags_cache_drift() {
        let mut account = BankAccount::new_saving(10_000, 1.0, 1);
        account.balance = 9_000;

        let report = build_reconciliation_report(&[account.clone()], &HashMap::new());
        assert_eq!(
            report.mismatches,
            vec![BalanceMismatch {
                account_id: account.id,
                cached: 9_000,
                replayed: Some(10_000),
            }]
        );
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_report_flags_saving_account_below_zero() {
        let mut account = BankAccount::new_saving(1_000, 1.0, 1);
        account.balance = -500;

        let mut totals = HashMap::new();
        totals.insert(
            account.id,
            OperationTotals {
                credits: 0,
                debits: 1_500,
                count: 1,
            },
        );

        let report = build_reconciliation_report(&[account.clone()], &totals);
        assert!(report.mismatches.is_empty());
        assert_eq!(report.overdrawn, vec![account.id]);
    }
}
