use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{DEFAULT_DATABASE_PATH, LedgerConfig, LedgerService};
use crate::domain::{
    AccountId, AccountKind, AccountOperation, BankAccount, Cents, Customer, format_cents, parse_cents,
};
use crate::io::{StatementFormat, StatementWriter};

/// Argentarius - Bank Account Ledger
#[derive(Parser)]
#[command(name = "argentarius")]
#[command(about = "Customers, current and saving accounts, and their operation log")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "ARGENTARIUS_DATABASE", default_value = DEFAULT_DATABASE_PATH)]
    pub database: String,

    /// How many times a conflicting write is retried before giving up
    #[arg(long, global = true, default_value = "5")]
    pub max_retries: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Customer management commands
    #[command(subcommand)]
    Customer(CustomerCommands),

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Take money out of an account
    Debit {
        /// Account ID
        account: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Description of the operation
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Put money into an account
    Credit {
        /// Account ID
        account: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Description of the operation
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Move money between two accounts
    Transfer {
        /// Amount to transfer
        amount: String,

        /// Source account ID
        #[arg(long)]
        from: String,

        /// Destination account ID
        #[arg(long)]
        to: String,
    },

    /// Show the operation history of an account
    History {
        /// Account ID
        account: String,

        /// Page index, starting at 0
        #[arg(short, long, default_value = "0")]
        page: u32,

        /// Operations per page
        #[arg(short, long)]
        size: Option<u32>,

        /// Show every operation instead of one page
        #[arg(long)]
        all: bool,
    },

    /// Export an account statement to CSV or JSON
    Export {
        /// Account ID
        account: String,

        /// Format: csv, json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Compare cached balances with the operation log
    Check,
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// Register a new customer
    Create { name: String, email: String },

    /// Show a customer and their accounts
    Show { id: i64 },

    /// List all customers
    List,

    /// Replace a customer's name and email
    Update { id: i64, name: String, email: String },

    /// Delete a customer without accounts
    Delete { id: i64 },

    /// Find customers whose name contains the keyword
    Search {
        #[arg(default_value = "")]
        keyword: String,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a current account with an overdraft cushion
    OpenCurrent {
        /// Owning customer ID
        customer: i64,

        /// Initial balance
        #[arg(short, long, default_value = "0")]
        balance: String,

        /// Overdraft allowed below zero
        #[arg(short, long, default_value = "0")]
        overdraft: String,
    },

    /// Open a saving account
    OpenSaving {
        /// Owning customer ID
        customer: i64,

        /// Initial balance
        #[arg(short, long, default_value = "0")]
        balance: String,

        /// Interest rate in percent (informational)
        #[arg(short, long, default_value = "0")]
        rate: f64,
    },

    /// Show account details
    Show { id: String },

    /// List accounts
    List {
        /// Only accounts of this customer
        #[arg(long)]
        customer: Option<i64>,
    },
}

impl Cli {
    fn config(&self) -> LedgerConfig {
        LedgerConfig::new(self.database.clone()).with_max_conflict_retries(self.max_retries)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();

        match self.command {
            Commands::Init => {
                let service = LedgerService::init_with(config).await?;
                println!("Database initialized: {}", service.config().database_path);
                service.close().await;
                Ok(())
            }
            command => {
                let service = LedgerService::connect_with(config).await.with_context(|| {
                    format!("Cannot open database '{}' (run `init` first)", self.database)
                })?;
                let result = dispatch(&service, command).await;
                service.close().await;
                result
            }
        }
    }
}

async fn dispatch(service: &LedgerService, command: Commands) -> Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Customer(cmd) => run_customer_command(service, cmd).await,
        Commands::Account(cmd) => run_account_command(service, cmd).await,
        Commands::Debit {
            account,
            amount,
            description,
        } => {
            let account_id = parse_account_id(&account)?;
            let op = service
                .debit(account_id, parse_amount(&amount)?, &description)
                .await?;
            print_movement(service, &op).await
        }
        Commands::Credit {
            account,
            amount,
            description,
        } => {
            let account_id = parse_account_id(&account)?;
            let op = service
                .credit(account_id, parse_amount(&amount)?, &description)
                .await?;
            print_movement(service, &op).await
        }
        Commands::Transfer { amount, from, to } => {
            let source = parse_account_id(&from)?;
            let destination = parse_account_id(&to)?;
            let receipt = service
                .transfer(source, destination, parse_amount(&amount)?)
                .await?;
            println!(
                "Transferred {}: {} -> {}",
                format_cents(receipt.debit.amount),
                source,
                destination
            );
            Ok(())
        }
        Commands::History {
            account,
            page,
            size,
            all,
        } => run_history_command(service, &account, page, size, all).await,
        Commands::Export {
            account,
            format,
            output,
        } => run_export_command(service, &account, &format, output.as_deref()).await,
        Commands::Check => run_check_command(service).await,
    }
}

async fn run_customer_command(service: &LedgerService, cmd: CustomerCommands) -> Result<()> {
    match cmd {
        CustomerCommands::Create { name, email } => {
            let customer = service.create_customer(name, email).await?;
            println!("Created customer {}: {} <{}>", customer.id, customer.name, customer.email);
        }

        CustomerCommands::Show { id } => {
            let customer = service.get_customer(id).await?;
            let accounts = service.list_customer_accounts(id).await?;
            println!("Customer: {}", customer.name);
            println!("  ID:       {}", customer.id);
            println!("  Email:    {}", customer.email);
            println!("  Accounts: {}", accounts.len());
            for account in &accounts {
                println!(
                    "    {} {:<8} {:>12}",
                    account.id,
                    account.kind.as_str(),
                    format_cents(account.balance)
                );
            }
        }

        CustomerCommands::List => print_customers(&service.list_customers().await?),

        CustomerCommands::Update { id, name, email } => {
            let customer = service.update_customer(id, name, email).await?;
            println!("Updated customer {}: {} <{}>", customer.id, customer.name, customer.email);
        }

        CustomerCommands::Delete { id } => {
            service.delete_customer(id).await?;
            println!("Deleted customer {}", id);
        }

        CustomerCommands::Search { keyword } => {
            print_customers(&service.search_customers(&keyword).await?)
        }
    }
    Ok(())
}

fn print_customers(customers: &[Customer]) {
    if customers.is_empty() {
        println!("No customers found.");
        return;
    }
    println!("{:>6} {:<24} EMAIL", "ID", "NAME");
    println!("{}", "-".repeat(60));
    for customer in customers {
        println!(
            "{:>6} {:<24} {}",
            customer.id,
            truncate(&customer.name, 24),
            customer.email
        );
    }
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::OpenCurrent {
            customer,
            balance,
            overdraft,
        } => {
            let account = service
                .open_current_account(parse_amount(&balance)?, parse_amount(&overdraft)?, customer)
                .await?;
            println!("Opened current account {}", account.id);
        }

        AccountCommands::OpenSaving {
            customer,
            balance,
            rate,
        } => {
            let account = service
                .open_saving_account(parse_amount(&balance)?, rate, customer)
                .await?;
            println!("Opened saving account {}", account.id);
        }

        AccountCommands::Show { id } => {
            let account = service.get_account(parse_account_id(&id)?).await?;
            print_account(&account);
        }

        AccountCommands::List { customer } => {
            let accounts = match customer {
                Some(customer_id) => service.list_customer_accounts(customer_id).await?,
                None => service.list_accounts().await?,
            };
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!(
                    "{:<36} {:<8} {:>8} {:>12} {:<10}",
                    "ID", "TYPE", "CUSTOMER", "BALANCE", "STATUS"
                );
                println!("{}", "-".repeat(78));
                for account in accounts {
                    println!(
                        "{:<36} {:<8} {:>8} {:>12} {:<10}",
                        account.id,
                        account.kind.as_str(),
                        account.customer_id,
                        format_cents(account.balance),
                        account.status
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_account(account: &BankAccount) {
    println!("Account: {}", account.id);
    println!("  Type:      {}", account.kind.as_str());
    println!("  Customer:  {}", account.customer_id);
    println!("  Status:    {}", account.status);
    println!(
        "  Created:   {}",
        account.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Balance:   {}", format_cents(account.balance));
    match account.kind {
        AccountKind::Current { over_draft } => {
            println!("  Overdraft: {}", format_cents(over_draft));
        }
        AccountKind::Saving { interest_rate } => {
            println!("  Rate:      {}%", interest_rate);
        }
    }
    println!("  Available: {}", format_cents(account.available_funds()));
}

async fn print_movement(service: &LedgerService, op: &AccountOperation) -> Result<()> {
    let account = service.get_account(op.account_id).await?;
    println!(
        "{} {} on {} (balance {})",
        op.operation_type,
        format_cents(op.amount),
        op.account_id,
        format_cents(account.balance)
    );
    Ok(())
}

async fn run_history_command(
    service: &LedgerService,
    account: &str,
    page: u32,
    size: Option<u32>,
    all: bool,
) -> Result<()> {
    let account_id = parse_account_id(account)?;

    if all {
        let operations = service.account_history(account_id).await?;
        print_operations(&operations);
        return Ok(());
    }

    let page_size = size.unwrap_or(service.config().default_page_size);
    let history = service.paged_history(account_id, page, page_size).await?;
    println!(
        "Account {} - balance {} - {}",
        history.account_id,
        format_cents(history.balance),
        page_label(history.page, history.total_pages)
    );
    print_operations(&history.operations);
    Ok(())
}

/// 1-based "page N/M" for display.
fn page_label(page: u32, total_pages: u32) -> String {
    format!("page {}/{}", page.saturating_add(1), total_pages.max(1))
}

fn print_operations(operations: &[AccountOperation]) {
    if operations.is_empty() {
        println!("No operations found.");
        return;
    }
    println!(
        "{:>6} {:<20} {:<7} {:>12} DESCRIPTION",
        "ID", "DATE", "TYPE", "AMOUNT"
    );
    println!("{}", "-".repeat(76));
    for op in operations {
        println!(
            "{:>6} {:<20} {:<7} {:>12} {}",
            op.id,
            op.date.format("%Y-%m-%d %H:%M:%S"),
            op.operation_type,
            format_cents(op.amount),
            truncate(&op.description, 40)
        );
    }
}

async fn run_export_command(
    service: &LedgerService,
    account: &str,
    format: &str,
    output: Option<&str>,
) -> Result<()> {
    use std::fs::File;
    use std::io::{Write, stdout};

    let account_id = parse_account_id(account)?;
    let format = StatementFormat::from_str(format)
        .ok_or_else(|| anyhow::anyhow!("Unknown format '{}'. Use csv or json", format))?;

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create file: {}", path))?,
        ),
        None => Box::new(stdout()),
    };

    let count = StatementWriter::new(service)
        .write(account_id, format, writer)
        .await?;

    if let Some(path) = output {
        eprintln!("Exported {} operation(s) to {}", count, path);
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Reconciling ledger...\n");

    let report = service.reconcile().await?;
    println!("Accounts:   {}", report.account_count);
    println!("Operations: {}", report.operation_count);
    println!();

    if report.is_healthy() {
        println!("Every cached balance matches its operation log.");
        return Ok(());
    }

    for mismatch in &report.mismatches {
        let replayed = mismatch
            .replayed
            .map(format_cents)
            .unwrap_or_else(|| "out of range".to_string());
        println!(
            "  - {}: cached {}, log says {}",
            mismatch.account_id,
            format_cents(mismatch.cached),
            replayed
        );
    }
    for account_id in &report.overdrawn {
        println!("  - {}: below its allowed floor", account_id);
    }
    anyhow::bail!("Ledger reconciliation failed");
}

fn parse_account_id(input: &str) -> Result<AccountId> {
    Uuid::parse_str(input.trim()).context("Invalid account ID format (expected UUID)")
}

fn parse_amount(input: &str) -> Result<Cents> {
    parse_cents(input).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_transfer() {
        let cli = Cli::try_parse_from([
            "argentarius",
            "--database",
            "bank.db",
            "transfer",
            "25.50",
            "--from",
            "a",
            "--to",
            "b",
        ])
        .unwrap();
        assert_eq!(cli.database, "bank.db");
        assert!(matches!(
            cli.command,
            Commands::Transfer { ref amount, .. } if amount == "25.50"
        ));
    }

    #[test]
    fn test_history_defaults() {
        let cli = Cli::try_parse_from(["argentarius", "history", "some-id"]).unwrap();
        match cli.command {
            Commands::History {
                page, size, all, ..
            } => {
                assert_eq!(page, 0);
                assert_eq!(size, None);
                assert!(!all);
            }
            _ => panic!("expected history command"),
        }
    }

    #[test]
    fn test_page_label() {
        assert_eq!(page_label(0, 0), "page 1/1");
        assert_eq!(page_label(2, 3), "page 3/3");
        assert_eq!(page_label(u32::MAX, 3), format!("page {}/3", u32::MAX));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long description", 10), "a very ...");
    }

    #[test]
    fn test_parse_account_id_rejects_garbage() {
        assert!(parse_account_id("not-a-uuid").is_err());
        assert!(parse_account_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
