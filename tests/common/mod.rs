// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use creator_ledger::Repository;
use creator_ledger::application::PlatformService;
use creator_ledger::domain::{BankInfoInput, Cents, Role, SubscriptionTier, User};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(PlatformService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = PlatformService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// A second handle on the database behind `test_service`, for driving the
/// storage layer directly.
pub async fn test_repository(temp_dir: &TempDir) -> Result<Repository> {
    let db_path = temp_dir.path().join("test.db");
    Repository::connect(&format!("sqlite:{}", db_path.display())).await
}

/// Create a plain user with `<username>@example.com` as email.
pub async fn create_user(service: &PlatformService, username: &str) -> Result<User> {
    Ok(service
        .create_user(
            username.to_string(),
            None,
            format!("{}@example.com", username),
            Role::User,
        )
        .await?)
}

pub async fn create_admin(service: &PlatformService, username: &str) -> Result<User> {
    Ok(service
        .create_user(
            username.to_string(),
            None,
            format!("{}@example.com", username),
            Role::Admin,
        )
        .await?)
}

/// Create a user and deposit `amount` into their spendable balance.
pub async fn funded_user(service: &PlatformService, username: &str, amount: Cents) -> Result<User> {
    create_user(service, username).await?;
    Ok(service.deposit(username, amount).await?)
}

pub async fn create_tier(
    service: &PlatformService,
    creator: &User,
    name: &str,
    price: Cents,
) -> Result<SubscriptionTier> {
    Ok(service
        .create_tier(creator, name.to_string(), None, price)
        .await?)
}

pub fn sample_bank_info() -> BankInfoInput {
    BankInfoInput {
        account_holder: "Alice Example".into(),
        bank_name: "First Bank".into(),
        account_number: "1234-5678-9012".into(),
        routing_number: "021000021".into(),
        swift_code: Some("chasus33".into()),
        country: "US".into(),
    }
}

/// Test fixture: a verified creator with bank details and earnings from one fan.
///
/// The fan buys a $500.00 tier, so the creator holds $425.00 of earnings
/// after the 15% platform fee.
pub struct CreatorWithEarnings {
    pub creator: User,
    pub fan: User,
    pub tier: SubscriptionTier,
}

impl CreatorWithEarnings {
    pub const TIER_PRICE: Cents = 50_000;
    pub const EARNINGS: Cents = 42_500;

    pub async fn create(service: &PlatformService) -> Result<Self> {
        let creator = create_user(service, "creator").await?;
        service.set_verified("creator", true).await?;
        service.save_bank_info(&creator, sample_bank_info()).await?;

        let tier = create_tier(service, &creator, "Premium", Self::TIER_PRICE).await?;
        let fan = funded_user(service, "fan", Self::TIER_PRICE).await?;
        service.subscribe(&fan, tier.id, true).await?;

        let creator = service.get_user("creator").await?;
        let fan = service.get_user("fan").await?;
        Ok(Self { creator, fan, tier })
    }
}
