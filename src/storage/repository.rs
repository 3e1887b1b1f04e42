use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    AccountId, AccountKind, AccountOperation, AccountStatus, BankAccount, Customer, CustomerId,
    NewCustomer, NewOperation, OperationTotals, OperationType,
};

use super::{MIGRATION_001_INITIAL, StoreError};

type StoreResult<T> = Result<T, StoreError>;

const ACCOUNT_COLUMNS: &str = "id, account_type, balance_cents, opening_balance_cents, created_at, status, customer_id, over_draft_cents, interest_rate, version";

const OPERATION_COLUMNS: &str = "id, account_id, operation_type, amount_cents, description, date";

/// Options used when opening the SQLite database.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub create_if_missing: bool,
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            busy_timeout: Duration::from_secs(5),
            max_connections: 4,
        }
    }
}

/// Durable store for customers, accounts and their operations.
///
/// All reads and writes go through a [`LedgerTx`] obtained from
/// [`Repository::begin`], so a service call is exactly one transaction.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the SQLite database file at `path`.
    pub async fn connect(path: &str, options: &StoreOptions) -> StoreResult<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(options.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect_options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run repeatedly.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Open (creating if needed) and migrate.
    pub async fn init(path: &str, options: &StoreOptions) -> StoreResult<Self> {
        let options = StoreOptions {
            create_if_missing: true,
            ..options.clone()
        };
        let repo = Self::connect(path, &options).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a unit of work. Dropping the returned handle without calling
    /// [`LedgerTx::commit`] rolls everything back.
    pub async fn begin(&self) -> StoreResult<LedgerTx> {
        Ok(LedgerTx {
            tx: self.pool.begin().await?,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// One open store transaction.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerTx {
    pub async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    // ========================
    // Customer operations
    // ========================

    pub async fn insert_customer(&mut self, customer: NewCustomer) -> StoreResult<Customer> {
        let row = sqlx::query("INSERT INTO customers (name, email) VALUES (?, ?) RETURNING id")
            .bind(&customer.name)
            .bind(&customer.email)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(customer.with_id(row.get("id")))
    }

    pub async fn find_customer(&mut self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let row = sqlx::query("SELECT id, name, email FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(row_to_customer))
    }

    /// Overwrite name and email. Returns false when no such customer exists.
    pub async fn update_customer(&mut self, customer: &Customer) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE customers SET name = ?, email = ? WHERE id = ?")
            .bind(&customer.name)
            .bind(&customer.email)
            .bind(customer.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Returns false when no such customer exists.
    pub async fn delete_customer(&mut self, id: CustomerId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn all_customers(&mut self) -> StoreResult<Vec<Customer>> {
        let rows = sqlx::query("SELECT id, name, email FROM customers ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(row_to_customer).collect())
    }

    /// Case-insensitive (ASCII) substring match on the customer name.
    /// `%`, `_` and `\` in the keyword match literally.
    pub async fn search_customers_by_name_like(
        &mut self,
        keyword: &str,
    ) -> StoreResult<Vec<Customer>> {
        let pattern = format!("%{}%", escape_like(keyword));
        let rows = sqlx::query(
            r#"
            SELECT id, name, email
            FROM customers
            WHERE name LIKE ? ESCAPE '\'
            ORDER BY id
            "#,
        )
        .bind(pattern)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.iter().map(row_to_customer).collect())
    }

    // ========================
    // Account operations
    // ========================

    pub async fn insert_account(&mut self, account: &BankAccount) -> StoreResult<()> {
        let (over_draft, interest_rate) = match account.kind {
            AccountKind::Current { over_draft } => (Some(over_draft), None),
            AccountKind::Saving { interest_rate } => (None, Some(interest_rate)),
        };

        sqlx::query(
            r#"
            INSERT INTO bank_accounts (id, account_type, balance_cents, opening_balance_cents, created_at, status, customer_id, over_draft_cents, interest_rate, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.kind.as_str())
        .bind(account.balance)
        .bind(account.opening_balance)
        .bind(encode_timestamp(account.created_at))
        .bind(account.status.as_str())
        .bind(account.customer_id)
        .bind(over_draft)
        .bind(interest_rate)
        .bind(account.version)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn find_account(&mut self, id: AccountId) -> StoreResult<Option<BankAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn all_accounts(&mut self) -> StoreResult<Vec<BankAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM bank_accounts ORDER BY created_at, id"
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    pub async fn accounts_for_customer(
        &mut self,
        customer_id: CustomerId,
    ) -> StoreResult<Vec<BankAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE customer_id = ? ORDER BY created_at, id"
        ))
        .bind(customer_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    pub async fn count_accounts_for_customer(&mut self, customer_id: CustomerId) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM bank_accounts WHERE customer_id = ?")
            .bind(customer_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.get("count"))
    }

    /// Write a new cached balance, guarded by the version the caller read.
    ///
    /// On success the account's version is bumped in place. If another
    /// writer changed the row in between, nothing is written and
    /// [`StoreError::Conflict`] is returned.
    pub async fn update_account_balance(&mut self, account: &mut BankAccount) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bank_accounts
            SET balance_cents = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(account.balance)
        .bind(account.id.to_string())
        .bind(account.version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                entity: "account",
                id: account.id.to_string(),
            });
        }
        account.version += 1;
        Ok(())
    }

    // ========================
    // Operation log
    // ========================

    pub async fn insert_operation(&mut self, operation: NewOperation) -> StoreResult<AccountOperation> {
        let row = sqlx::query(
            r#"
            INSERT INTO account_operations (account_id, operation_type, amount_cents, description, date)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(operation.account_id.to_string())
        .bind(operation.operation_type.as_str())
        .bind(operation.amount)
        .bind(&operation.description)
        .bind(encode_timestamp(operation.date))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(operation.with_id(row.get("id")))
    }

    /// Every operation of the account, newest first.
    pub async fn operations_for_account(
        &mut self,
        account_id: AccountId,
    ) -> StoreResult<Vec<AccountOperation>> {
        let rows = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM account_operations WHERE account_id = ? ORDER BY date DESC, id DESC"
        ))
        .bind(account_id.to_string())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_operation).collect()
    }

    /// One page of the account's operations, newest first, plus the total
    /// number of operations the account has.
    pub async fn operations_for_account_paged(
        &mut self,
        account_id: AccountId,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<AccountOperation>, i64)> {
        let account_id_str = account_id.to_string();

        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM account_operations WHERE account_id = ?")
                .bind(&account_id_str)
                .fetch_one(&mut *self.tx)
                .await?
                .get("count");

        let offset = i64::from(page) * i64::from(page_size);
        let rows = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM account_operations WHERE account_id = ? ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(&account_id_str)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;

        let operations = rows
            .iter()
            .map(row_to_operation)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((operations, total))
    }

    /// Credit and debit sums per account, for reconciling cached balances.
    /// Accounts without operations are absent from the map.
    ///
    /// Folded here rather than with SQL `SUM`, which fails once an
    /// account's lifetime credits pass `i64::MAX`.
    pub async fn operation_totals(&mut self) -> StoreResult<HashMap<AccountId, OperationTotals>> {
        let rows = sqlx::query("SELECT account_id, operation_type, amount_cents FROM account_operations")
            .fetch_all(&mut *self.tx)
            .await?;

        let mut totals: HashMap<AccountId, OperationTotals> = HashMap::new();
        for row in rows {
            let account_id = parse_uuid(row.get("account_id"))?;
            let type_str: String = row.get("operation_type");
            let operation_type = OperationType::from_str(&type_str)
                .ok_or_else(|| StoreError::corrupt(format!("unknown operation type '{type_str}'")))?;
            totals
                .entry(account_id)
                .or_default()
                .record(operation_type, row.get("amount_cents"));
        }
        Ok(totals)
    }
}

/// Fixed-width UTC timestamps so that text ordering is chronological.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(format!("invalid timestamp '{value}': {e}")))
}

fn parse_uuid(value: String) -> StoreResult<Uuid> {
    Uuid::parse_str(&value)
        .map_err(|e| StoreError::corrupt(format!("invalid account id '{value}': {e}")))
}

fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_customer(row: &SqliteRow) -> Customer {
    Customer {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
    }
}

fn row_to_account(row: &SqliteRow) -> StoreResult<BankAccount> {
    let id = parse_uuid(row.get("id"))?;
    let account_type: String = row.get("account_type");
    let status_str: String = row.get("status");
    let created_at_str: String = row.get("created_at");

    let kind = match account_type.as_str() {
        "current" => AccountKind::Current {
            over_draft: row
                .get::<Option<i64>, _>("over_draft_cents")
                .ok_or_else(|| StoreError::corrupt(format!("current account {id} has no overdraft")))?,
        },
        "saving" => AccountKind::Saving {
            interest_rate: row
                .get::<Option<f64>, _>("interest_rate")
                .ok_or_else(|| {
                    StoreError::corrupt(format!("saving account {id} has no interest rate"))
                })?,
        },
        other => {
            return Err(StoreError::corrupt(format!(
                "unknown account type '{other}' for {id}"
            )));
        }
    };

    Ok(BankAccount {
        id,
        balance: row.get("balance_cents"),
        opening_balance: row.get("opening_balance_cents"),
        created_at: decode_timestamp(&created_at_str)?,
        status: AccountStatus::from_str(&status_str)
            .ok_or_else(|| StoreError::corrupt(format!("invalid account status '{status_str}'")))?,
        customer_id: row.get("customer_id"),
        kind,
        version: row.get("version"),
    })
}

fn row_to_operation(row: &SqliteRow) -> StoreResult<AccountOperation> {
    let type_str: String = row.get("operation_type");
    let date_str: String = row.get("date");

    Ok(AccountOperation {
        id: row.get("id"),
        account_id: parse_uuid(row.get("account_id"))?,
        date: decode_timestamp(&date_str)?,
        amount: row.get("amount_cents"),
        operation_type: OperationType::from_str(&type_str)
            .ok_or_else(|| StoreError::corrupt(format!("invalid operation type '{type_str}'")))?,
        description: row.get("description"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("ali"), "ali");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_timestamps_sort_chronologically_as_text() {
        let half = decode_timestamp("2026-01-05T10:00:00.5Z").unwrap();
        let eighth = decode_timestamp("2026-01-05T10:00:00.125Z").unwrap();
        assert!(half > eighth);
        assert!(encode_timestamp(half) > encode_timestamp(eighth));
    }

    #[test]
    fn test_timestamp_roundtrip_at_micro_precision() {
        let ts = decode_timestamp("2026-03-01T08:30:15.000042Z").unwrap();
        assert_eq!(encode_timestamp(ts), "2026-03-01T08:30:15.000042Z");
        assert_eq!(decode_timestamp(&encode_timestamp(ts)).unwrap(), ts);
    }
}
