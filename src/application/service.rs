use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{
    AccountId, AccountOperation, BankAccount, Cents, Customer, CustomerId, NewCustomer,
    NewOperation, ReconciliationReport, build_reconciliation_report,
};
use crate::storage::{LedgerTx, Repository};

use super::{AppError, HistoryPage, LedgerConfig, total_pages};

/// Application service owning every ledger rule.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct LedgerService {
    repo: Repository,
    config: LedgerConfig,
}

/// Both legs of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub debit: AccountOperation,
    pub credit: AccountOperation,
}

impl LedgerService {
    pub fn new(repo: Repository, config: LedgerConfig) -> Self {
        Self { repo, config }
    }

    /// Create (if needed) and migrate the database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        Self::init_with(LedgerConfig::new(database_path)).await
    }

    pub async fn init_with(config: LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::init(&config.database_path, &config.store_options()).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        Self::connect_with(LedgerConfig::new(database_path)).await
    }

    pub async fn connect_with(config: LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(&config.database_path, &config.store_options()).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }

    /// Run one unit of work, replaying it when it lost a write race.
    ///
    /// Only conflicts and lock contention are replayed: the failed attempt's
    /// transaction has been rolled back, so nothing it did is visible.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut unit: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match unit().await {
                Err(AppError::Store(err)) if err.is_retryable() => {
                    if attempt > self.config.max_conflict_retries {
                        warn!(operation, attempt, error = %err, "giving up after repeated conflicts");
                        return Err(AppError::ConcurrentModification {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    warn!(operation, attempt, error = %err, "write conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
                outcome => return outcome,
            }
        }
    }

    // ========================
    // Customer operations
    // ========================

    pub async fn create_customer(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Customer, AppError> {
        let customer = NewCustomer::new(name, email);
        let saved = self
            .retrying("create_customer", move || self.insert_customer_once(customer.clone()))
            .await?;
        info!(customer_id = saved.id, "customer created");
        Ok(saved)
    }

    async fn insert_customer_once(&self, customer: NewCustomer) -> Result<Customer, AppError> {
        let mut tx = self.repo.begin().await?;
        let saved = tx.insert_customer(customer).await?;
        tx.commit().await?;
        Ok(saved)
    }

    pub async fn get_customer(&self, id: CustomerId) -> Result<Customer, AppError> {
        let mut tx = self.repo.begin().await?;
        let customer = tx
            .find_customer(id)
            .await?
            .ok_or(AppError::CustomerNotFound(id))?;
        tx.commit().await?;
        Ok(customer)
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>, AppError> {
        let mut tx = self.repo.begin().await?;
        let customers = tx.all_customers().await?;
        tx.commit().await?;
        Ok(customers)
    }

    /// Overwrite name and email of an existing customer. Never inserts.
    pub async fn update_customer(
        &self,
        id: CustomerId,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Customer, AppError> {
        let customer = NewCustomer::new(name, email).with_id(id);
        let updated = self
            .retrying("update_customer", move || self.update_customer_once(customer.clone()))
            .await?;
        info!(customer_id = id, "customer updated");
        Ok(updated)
    }

    async fn update_customer_once(&self, customer: Customer) -> Result<Customer, AppError> {
        let mut tx = self.repo.begin().await?;
        if !tx.update_customer(&customer).await? {
            return Err(AppError::CustomerNotFound(customer.id));
        }
        tx.commit().await?;
        Ok(customer)
    }

    /// Remove a customer. Customers that still own accounts are rejected
    /// and nothing is deleted.
    pub async fn delete_customer(&self, id: CustomerId) -> Result<(), AppError> {
        self.retrying("delete_customer", move || self.delete_customer_once(id))
            .await?;
        info!(customer_id = id, "customer deleted");
        Ok(())
    }

    async fn delete_customer_once(&self, id: CustomerId) -> Result<(), AppError> {
        let mut tx = self.repo.begin().await?;
        if tx.find_customer(id).await?.is_none() {
            return Err(AppError::CustomerNotFound(id));
        }
        let accounts = tx.count_accounts_for_customer(id).await?;
        if accounts > 0 {
            return Err(AppError::CustomerHasAccounts {
                customer_id: id,
                accounts,
            });
        }
        tx.delete_customer(id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Case-insensitive substring search on customer names.
    pub async fn search_customers(&self, keyword: &str) -> Result<Vec<Customer>, AppError> {
        let mut tx = self.repo.begin().await?;
        let customers = tx.search_customers_by_name_like(keyword).await?;
        tx.commit().await?;
        debug!(keyword, matches = customers.len(), "customer search");
        Ok(customers)
    }

    // ========================
    // Account operations
    // ========================

    pub async fn open_current_account(
        &self,
        initial_balance: Cents,
        over_draft: Cents,
        customer_id: CustomerId,
    ) -> Result<BankAccount, AppError> {
        if over_draft < 0 {
            return Err(AppError::InvalidAmount(format!(
                "overdraft must not be negative, got {over_draft}"
            )));
        }
        let account = BankAccount::new_current(initial_balance, over_draft, customer_id);
        self.open_account(account).await
    }

    pub async fn open_saving_account(
        &self,
        initial_balance: Cents,
        interest_rate: f64,
        customer_id: CustomerId,
    ) -> Result<BankAccount, AppError> {
        if !interest_rate.is_finite() {
            return Err(AppError::InvalidAmount(format!(
                "interest rate must be a finite number, got {interest_rate}"
            )));
        }
        let account = BankAccount::new_saving(initial_balance, interest_rate, customer_id);
        self.open_account(account).await
    }

    async fn open_account(&self, account: BankAccount) -> Result<BankAccount, AppError> {
        let saved = self
            .retrying("open_account", move || self.insert_account_once(account.clone()))
            .await?;
        info!(
            account_id = %saved.id,
            kind = saved.kind.as_str(),
            customer_id = saved.customer_id,
            balance = saved.balance,
            "account opened"
        );
        Ok(saved)
    }

    async fn insert_account_once(&self, account: BankAccount) -> Result<BankAccount, AppError> {
        let mut tx = self.repo.begin().await?;
        if tx.find_customer(account.customer_id).await?.is_none() {
            return Err(AppError::CustomerNotFound(account.customer_id));
        }
        tx.insert_account(&account).await?;
        tx.commit().await?;
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<BankAccount, AppError> {
        let mut tx = self.repo.begin().await?;
        let account = tx
            .find_account(id)
            .await?
            .ok_or(AppError::AccountNotFound(id))?;
        tx.commit().await?;
        Ok(account)
    }

    /// All accounts, oldest first, each as its concrete variant.
    pub async fn list_accounts(&self) -> Result<Vec<BankAccount>, AppError> {
        let mut tx = self.repo.begin().await?;
        let accounts = tx.all_accounts().await?;
        tx.commit().await?;
        Ok(accounts)
    }

    pub async fn list_customer_accounts(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<BankAccount>, AppError> {
        let mut tx = self.repo.begin().await?;
        if tx.find_customer(customer_id).await?.is_none() {
            return Err(AppError::CustomerNotFound(customer_id));
        }
        let accounts = tx.accounts_for_customer(customer_id).await?;
        tx.commit().await?;
        Ok(accounts)
    }

    // ========================
    // Ledger movements
    // ========================

    /// Take money out of an account.
    ///
    /// Fails with [`AppError::InsufficientBalance`] when the amount exceeds
    /// the available funds, in which case nothing is written.
    pub async fn debit(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: &str,
    ) -> Result<AccountOperation, AppError> {
        validate_amount(amount)?;
        let operation = self
            .retrying("debit", move || self.debit_once(account_id, amount, description))
            .await?;
        info!(account_id = %account_id, amount, operation_id = operation.id, "debit committed");
        Ok(operation)
    }

    async fn debit_once(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: &str,
    ) -> Result<AccountOperation, AppError> {
        let mut tx = self.repo.begin().await?;
        let operation = apply_debit(&mut tx, account_id, amount, description).await?;
        tx.commit().await?;
        Ok(operation)
    }

    /// Put money into an account. Credits are never refused for lack of funds.
    pub async fn credit(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: &str,
    ) -> Result<AccountOperation, AppError> {
        validate_amount(amount)?;
        let operation = self
            .retrying("credit", move || self.credit_once(account_id, amount, description))
            .await?;
        info!(account_id = %account_id, amount, operation_id = operation.id, "credit committed");
        Ok(operation)
    }

    async fn credit_once(
        &self,
        account_id: AccountId,
        amount: Cents,
        description: &str,
    ) -> Result<AccountOperation, AppError> {
        let mut tx = self.repo.begin().await?;
        let operation = apply_credit(&mut tx, account_id, amount, description).await?;
        tx.commit().await?;
        Ok(operation)
    }

    /// Move money between two accounts as a single transaction.
    ///
    /// If either leg fails (missing account, insufficient funds) neither
    /// account is touched.
    pub async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Cents,
    ) -> Result<TransferReceipt, AppError> {
        validate_amount(amount)?;
        let receipt = self
            .retrying("transfer", move || self.transfer_once(source, destination, amount))
            .await?;
        info!(
            source = %source,
            destination = %destination,
            amount,
            "transfer completed"
        );
        Ok(receipt)
    }

    async fn transfer_once(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Cents,
    ) -> Result<TransferReceipt, AppError> {
        let mut tx = self.repo.begin().await?;
        let debit = apply_debit(
            &mut tx,
            source,
            amount,
            &format!("Transfer to {destination}"),
        )
        .await?;
        let credit = apply_credit(
            &mut tx,
            destination,
            amount,
            &format!("Transfer from {source}"),
        )
        .await?;
        tx.commit().await?;
        Ok(TransferReceipt { debit, credit })
    }

    // ========================
    // History
    // ========================

    /// Every operation of the account, newest first. An unknown account
    /// simply has no history.
    pub async fn account_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<AccountOperation>, AppError> {
        let mut tx = self.repo.begin().await?;
        let operations = tx.operations_for_account(account_id).await?;
        tx.commit().await?;
        debug!(account_id = %account_id, count = operations.len(), "account history");
        Ok(operations)
    }

    /// The account and its full history, newest first, read from one
    /// snapshot so the balance agrees with the operations.
    pub async fn account_snapshot(
        &self,
        account_id: AccountId,
    ) -> Result<(BankAccount, Vec<AccountOperation>), AppError> {
        let mut tx = self.repo.begin().await?;
        let account = tx
            .find_account(account_id)
            .await?
            .ok_or(AppError::AccountNotFound(account_id))?;
        let operations = tx.operations_for_account(account_id).await?;
        tx.commit().await?;
        debug!(account_id = %account_id, count = operations.len(), "account snapshot");
        Ok((account, operations))
    }

    /// One page (0-based) of the account's operations, newest first, with
    /// the current balance.
    pub async fn paged_history(
        &self,
        account_id: AccountId,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage, AppError> {
        if page_size == 0 {
            return Err(AppError::InvalidPageSize(page_size));
        }

        let mut tx = self.repo.begin().await?;
        let account = tx
            .find_account(account_id)
            .await?
            .ok_or(AppError::AccountNotFound(account_id))?;
        let (operations, total) = tx
            .operations_for_account_paged(account_id, page, page_size)
            .await?;
        tx.commit().await?;

        debug!(account_id = %account_id, page, page_size, total, "paged history");
        Ok(HistoryPage {
            account_id,
            balance: account.balance,
            page,
            page_size,
            total_pages: total_pages(total, page_size),
            operations,
        })
    }

    // ========================
    // Integrity
    // ========================

    /// Replay every account's log against its cached balance.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, AppError> {
        let mut tx = self.repo.begin().await?;
        let accounts = tx.all_accounts().await?;
        let totals = tx.operation_totals().await?;
        tx.commit().await?;

        let report = build_reconciliation_report(&accounts, &totals);
        if !report.is_healthy() {
            warn!(
                mismatches = report.mismatches.len(),
                overdrawn = report.overdrawn.len(),
                "ledger reconciliation found issues"
            );
        }
        Ok(report)
    }
}

fn validate_amount(amount: Cents) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// Check funds, append a DEBIT and lower the cached balance, all inside `tx`.
async fn apply_debit(
    tx: &mut LedgerTx,
    account_id: AccountId,
    amount: Cents,
    description: &str,
) -> Result<AccountOperation, AppError> {
    let mut account = tx
        .find_account(account_id)
        .await?
        .ok_or(AppError::AccountNotFound(account_id))?;

    if !account.can_debit(amount) {
        let available = account.available_funds();
        warn!(account_id = %account_id, available, requested = amount, "debit rejected");
        return Err(AppError::InsufficientBalance {
            account_id,
            available,
            requested: amount,
        });
    }

    let operation = tx
        .insert_operation(NewOperation::debit(account_id, amount, description))
        .await?;
    account.balance -= amount;
    tx.update_account_balance(&mut account).await?;

    debug!(account_id = %account_id, amount, balance = account.balance, "debit staged");
    Ok(operation)
}

/// Append a CREDIT and raise the cached balance, inside `tx`.
async fn apply_credit(
    tx: &mut LedgerTx,
    account_id: AccountId,
    amount: Cents,
    description: &str,
) -> Result<AccountOperation, AppError> {
    let mut account = tx
        .find_account(account_id)
        .await?
        .ok_or(AppError::AccountNotFound(account_id))?;

    let balance = account.balance.checked_add(amount).ok_or_else(|| {
        AppError::InvalidAmount(format!("crediting {amount} would overflow the balance"))
    })?;

    let operation = tx
        .insert_operation(NewOperation::credit(account_id, amount, description))
        .await?;
    account.balance = balance;
    tx.update_account_balance(&mut account).await?;

    debug!(account_id = %account_id, amount, balance = account.balance, "credit staged");
    Ok(operation)
}
