// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use argentarius::application::{LedgerConfig, LedgerService};
use argentarius::domain::{BankAccount, Cents, Customer};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Same as [`test_service`] but with a custom configuration.
pub async fn test_service_with(
    configure: impl FnOnce(LedgerConfig) -> LedgerConfig,
) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = configure(LedgerConfig::new(db_path.to_str().unwrap()));
    let service = LedgerService::init_with(config).await?;
    Ok((service, temp_dir))
}

pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_str().unwrap().to_string()
}

/// Test fixture: a customer with one account of each kind
pub struct StandardAccounts {
    pub customer: Customer,
    pub current: BankAccount,
    pub saving: BankAccount,
}

impl StandardAccounts {
    /// Alice with a current account (1000.00, overdraft 200.00) and a
    /// saving account (500.00 at 2.5%)
    pub async fn create(service: &LedgerService) -> Result<Self> {
        let customer = service
            .create_customer("Alice", "alice@example.com")
            .await?;
        let current = service
            .open_current_account(100_000, 20_000, customer.id)
            .await?;
        let saving = service
            .open_saving_account(50_000, 2.5, customer.id)
            .await?;
        Ok(Self {
            customer,
            current,
            saving,
        })
    }
}

/// Open a saving account for a fresh customer
pub async fn saving_account(service: &LedgerService, balance: Cents) -> Result<BankAccount> {
    let customer = service.create_customer("Saver", "saver@example.com").await?;
    Ok(service
        .open_saving_account(balance, 1.0, customer.id)
        .await?)
}

/// Open a current account for a fresh customer
pub async fn current_account(
    service: &LedgerService,
    balance: Cents,
    over_draft: Cents,
) -> Result<BankAccount> {
    let customer = service
        .create_customer("Spender", "spender@example.com")
        .await?;
    Ok(service
        .open_current_account(balance, over_draft, customer.id)
        .await?)
}
