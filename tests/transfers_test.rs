mod common;

use anyhow::Result;
use argentarius::application::AppError;
use argentarius::domain::OperationType;
use common::{StandardAccounts, test_service};
use uuid::Uuid;

#[tokio::test]
async fn test_transfer_moves_money_between_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;
    let source = fixture.current.id;
    let destination = fixture.saving.id;

    let receipt = service.transfer(source, destination, 30_000).await?;

    assert_eq!(receipt.debit.account_id, source);
    assert_eq!(receipt.debit.operation_type, OperationType::Debit);
    assert_eq!(receipt.debit.description, format!("Transfer to {destination}"));
    assert_eq!(receipt.credit.account_id, destination);
    assert_eq!(receipt.credit.operation_type, OperationType::Credit);
    assert_eq!(receipt.credit.description, format!("Transfer from {source}"));
    assert_eq!(receipt.debit.amount, receipt.credit.amount);

    assert_eq!(service.get_account(source).await?.balance, 70_000);
    assert_eq!(service.get_account(destination).await?.balance, 80_000);

    Ok(())
}

#[tokio::test]
async fn test_transfer_can_use_overdraft() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;

    service
        .transfer(fixture.current.id, fixture.saving.id, 120_000)
        .await?;

    assert_eq!(service.get_account(fixture.current.id).await?.balance, -20_000);
    assert_eq!(service.get_account(fixture.saving.id).await?.balance, 170_000);

    Ok(())
}

#[tokio::test]
async fn test_transfer_with_insufficient_funds_changes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;

    // Saving account only holds 500.00
    let result = service
        .transfer(fixture.saving.id, fixture.current.id, 50_001)
        .await;
    assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));

    assert_eq!(service.get_account(fixture.saving.id).await?.balance, 50_000);
    assert_eq!(service.get_account(fixture.current.id).await?.balance, 100_000);
    assert!(service.account_history(fixture.saving.id).await?.is_empty());
    assert!(service.account_history(fixture.current.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_to_missing_account_rolls_back_debit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;
    let missing = Uuid::new_v4();

    let result = service.transfer(fixture.current.id, missing, 10_000).await;
    assert!(matches!(result, Err(AppError::AccountNotFound(id)) if id == missing));

    assert_eq!(service.get_account(fixture.current.id).await?.balance, 100_000);
    assert!(service.account_history(fixture.current.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_from_missing_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;

    let result = service
        .transfer(Uuid::new_v4(), fixture.saving.id, 10_000)
        .await;
    assert!(matches!(result, Err(AppError::AccountNotFound(_))));
    assert_eq!(service.get_account(fixture.saving.id).await?.balance, 50_000);

    Ok(())
}

#[tokio::test]
async fn test_transfer_rejects_non_positive_amount() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;

    let result = service
        .transfer(fixture.current.id, fixture.saving.id, 0)
        .await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));

    Ok(())
}

#[tokio::test]
async fn test_self_transfer_keeps_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;
    let id = fixture.saving.id;

    service.transfer(id, id, 20_000).await?;

    assert_eq!(service.get_account(id).await?.balance, 50_000);
    let history = service.account_history(id).await?;
    assert_eq!(history.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_transfers_conserve_total_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = StandardAccounts::create(&service).await?;
    let (a, b) = (fixture.current.id, fixture.saving.id);

    service.transfer(a, b, 10_000).await?;
    service.transfer(b, a, 2_500).await?;
    service.transfer(a, b, 99_999).await?;
    let _ = service.transfer(b, a, 10_000_000).await;

    let total: i64 = service
        .list_accounts()
        .await?
        .iter()
        .map(|account| account.balance)
        .sum();
    assert_eq!(total, 150_000);

    Ok(())
}
