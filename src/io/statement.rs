use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::LedgerService;
use crate::domain::{AccountId, AccountOperation, BankAccount, format_cents};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementFormat {
    Csv,
    Json,
}

impl StatementFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(StatementFormat::Csv),
            "json" => Some(StatementFormat::Json),
            _ => None,
        }
    }
}

/// Full account statement as emitted in JSON form.
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub generated_at: DateTime<Utc>,
    pub account: BankAccount,
    pub operations: Vec<AccountOperation>,
}

/// Writes an account's full history, newest first.
pub struct StatementWriter<'a> {
    service: &'a LedgerService,
}

impl<'a> StatementWriter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Returns the number of operations written.
    pub async fn write<W: Write>(
        &self,
        account_id: AccountId,
        format: StatementFormat,
        writer: W,
    ) -> Result<usize> {
        let (account, operations) = self.service.account_snapshot(account_id).await?;
        let count = operations.len();

        match format {
            StatementFormat::Csv => write_csv(&operations, writer)?,
            StatementFormat::Json => {
                let statement = Statement {
                    generated_at: Utc::now(),
                    account,
                    operations,
                };
                serde_json::to_writer_pretty(writer, &statement)
                    .context("Failed to write JSON statement")?;
            }
        }

        Ok(count)
    }
}

fn write_csv<W: Write>(operations: &[AccountOperation], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["id", "date", "type", "amount", "description"])?;

    for op in operations {
        csv_writer.write_record([
            op.id.to_string(),
            op.date.to_rfc3339(),
            op.operation_type.to_string(),
            format_cents(op.amount),
            op.description.clone(),
        ])?;
    }

    csv_writer.flush().context("Failed to flush CSV statement")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::NewOperation;

    #[test]
    fn test_format_parsing() {
        assert_eq!(StatementFormat::from_str("CSV"), Some(StatementFormat::Csv));
        assert_eq!(StatementFormat::from_str("json"), Some(StatementFormat::Json));
        assert_eq!(StatementFormat::from_str("xml"), None);
    }

    #[test]
    fn test_csv_rows() {
        let account = Uuid::new_v4();
        let ops = vec![
            NewOperation::credit(account, 2_500, "Salary, March").with_id(2),
            NewOperation::debit(account, 990, "Coffee").with_id(1),
        ];

        let mut out = Vec::new();
        write_csv(&ops, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "id,date,type,amount,description");
        assert!(lines[1].starts_with("2,"));
        assert!(lines[1].ends_with(",CREDIT,25.00,\"Salary, March\""));
        assert!(lines[2].ends_with(",DEBIT,9.90,Coffee"));
    }
}
