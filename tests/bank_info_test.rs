mod common;

use anyhow::Result;
use common::{CreatorWithEarnings, create_user, sample_bank_info, test_service};
use creator_ledger::application::AppError;
use creator_ledger::domain::{BankInfoInput, PayoutMethod};

#[tokio::test]
async fn test_save_and_replace_bank_info() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = create_user(&service, "alice").await?;

    let saved = service.save_bank_info(&user, sample_bank_info()).await?;
    assert_eq!(saved.account_number, "123456789012");
    assert_eq!(saved.swift_code.as_deref(), Some("CHASUS33"));
    assert_eq!(saved.masked_account_number(), "********9012");

    let replacement = BankInfoInput {
        bank_name: "Second Bank".into(),
        account_number: "99887766".into(),
        swift_code: None,
        ..sample_bank_info()
    };
    service.save_bank_info(&user, replacement).await?;

    let stored = service.get_bank_info(&user).await?;
    assert_eq!(stored.bank_name, "Second Bank");
    assert_eq!(stored.account_number, "99887766");
    assert!(stored.swift_code.is_none());

    Ok(())
}

#[tokio::test]
async fn test_invalid_bank_info_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = create_user(&service, "alice").await?;

    let err = service
        .save_bank_info(
            &user,
            BankInfoInput {
                account_holder: "   ".into(),
                ..sample_bank_info()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidBankInfo(_)));

    let err = service
        .save_bank_info(
            &user,
            BankInfoInput {
                account_number: "12ab".into(),
                ..sample_bank_info()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidBankInfo(_)));

    let err = service.get_bank_info(&user).await.unwrap_err();
    assert!(matches!(err, AppError::BankInfoNotFound));

    Ok(())
}

#[tokio::test]
async fn test_bank_info_locked_by_pending_bank_payout() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fixture = CreatorWithEarnings::create(&service).await?;

    let request = service
        .request_payout(&fixture.creator, 10_000, PayoutMethod::Bank, None)
        .await?;

    let err = service.delete_bank_info(&fixture.creator).await.unwrap_err();
    assert!(matches!(err, AppError::BankInfoInUse));

    service.approve_payout(request.id, None).await?;
    service.delete_bank_info(&fixture.creator).await?;

    let err = service.delete_bank_info(&fixture.creator).await.unwrap_err();
    assert!(matches!(err, AppError::BankInfoNotFound));

    Ok(())
}
