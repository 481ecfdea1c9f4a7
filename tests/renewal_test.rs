mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{create_tier, create_user, funded_user, test_repository, test_service};
use creator_ledger::application::RenewalReport;
use creator_ledger::storage::RenewOutcome;

const PRICE: i64 = 1_000;

#[tokio::test]
async fn test_renewal_moves_price_and_extends_expiry() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let fan = funded_user(&service, "fan", 3 * PRICE).await?;

    let subscription = service.subscribe(&fan, tier.id, true).await?;
    // Stored timestamps carry microsecond precision
    let stored_expiry = service.list_subscriptions(&fan).await?[0]
        .subscription
        .expires_at;
    let creator_before = service.get_user("creator").await?;
    let fan_before = service.get_user("fan").await?;
    assert_eq!(fan_before.balance, 2 * PRICE);

    let report = service
        .renew_expired_subscriptions(Utc::now() + Duration::days(31))
        .await?;
    assert_eq!(
        report,
        RenewalReport {
            examined: 1,
            renewed: 1,
            ..Default::default()
        }
    );

    let fan_after = service.get_user("fan").await?;
    let creator_after = service.get_user("creator").await?;
    assert_eq!(fan_after.balance, fan_before.balance - PRICE);
    assert_eq!(creator_after.balance, creator_before.balance + PRICE);
    // Renewals do not touch earnings
    assert_eq!(
        creator_after.earnings_balance,
        creator_before.earnings_balance
    );

    let subscriptions = service.list_subscriptions(&fan).await?;
    assert_eq!(subscriptions.len(), 1);
    let renewed = &subscriptions[0].subscription;
    assert_eq!(renewed.id, subscription.id);
    assert!(renewed.auto_renew);
    assert_eq!(renewed.expires_at, stored_expiry + Duration::days(30));

    Ok(())
}

#[tokio::test]
async fn test_insufficient_balance_disables_auto_renew() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    // Enough for the first period only
    let fan = funded_user(&service, "fan", PRICE + 1).await?;

    service.subscribe(&fan, tier.id, true).await?;
    let stored_expiry = service.list_subscriptions(&fan).await?[0]
        .subscription
        .expires_at;
    let creator_before = service.get_user("creator").await?;

    let report = service
        .renew_expired_subscriptions(Utc::now() + Duration::days(31))
        .await?;
    assert_eq!(report.examined, 1);
    assert_eq!(report.auto_renew_disabled, 1);
    assert_eq!(report.renewed, 0);

    let fan_after = service.get_user("fan").await?;
    let creator_after = service.get_user("creator").await?;
    assert_eq!(fan_after.balance, 1);
    assert_eq!(creator_after.balance, creator_before.balance);

    let subscriptions = service.list_subscriptions(&fan).await?;
    assert_eq!(subscriptions.len(), 1);
    assert!(!subscriptions[0].subscription.auto_renew);
    assert_eq!(subscriptions[0].subscription.expires_at, stored_expiry);

    // The next sweep removes it, since auto-renew is now off
    let report = service
        .renew_expired_subscriptions(Utc::now() + Duration::days(31))
        .await?;
    assert_eq!(report.removed, 1);
    assert!(service.list_subscriptions(&fan).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_expired_without_auto_renew_is_removed() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let fan = funded_user(&service, "fan", 5 * PRICE).await?;

    service.subscribe(&fan, tier.id, false).await?;
    let fan_before = service.get_user("fan").await?;
    let creator_before = service.get_user("creator").await?;

    let report = service
        .renew_expired_subscriptions(Utc::now() + Duration::days(31))
        .await?;
    assert_eq!(report.removed, 1);
    assert_eq!(report.renewed, 0);

    assert!(service.list_subscriptions(&fan).await?.is_empty());
    assert_eq!(service.get_user("fan").await?.balance, fan_before.balance);
    assert_eq!(
        service.get_user("creator").await?.balance,
        creator_before.balance
    );

    // The earning record outlives the subscription
    let summary = service.earnings_summary(&creator).await?;
    assert_eq!(summary.earnings_count, 1);

    Ok(())
}

#[tokio::test]
async fn test_active_subscriptions_are_left_alone() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let fan = funded_user(&service, "fan", 5 * PRICE).await?;
    service.subscribe(&fan, tier.id, true).await?;

    let report = service.renew_expired_subscriptions(Utc::now()).await?;
    assert_eq!(report, RenewalReport::default());
    assert_eq!(service.get_user("fan").await?.balance, 4 * PRICE);

    Ok(())
}

#[tokio::test]
async fn test_sweep_handles_mixed_subscriptions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = create_user(&service, "creator").await?;
    let monthly = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let premium = create_tier(&service, &creator, "Premium", 4 * PRICE).await?;

    let rich = funded_user(&service, "rich", 20 * PRICE).await?;
    let poor = funded_user(&service, "poor", PRICE).await?;
    let casual = funded_user(&service, "casual", 10 * PRICE).await?;

    service.subscribe(&rich, monthly.id, true).await?;
    service.subscribe(&rich, premium.id, true).await?;
    service.subscribe(&poor, monthly.id, true).await?;
    service.subscribe(&casual, premium.id, false).await?;

    let creator_before = service.get_user("creator").await?;
    let report = service
        .renew_expired_subscriptions(Utc::now() + Duration::days(31))
        .await?;
    assert_eq!(
        report,
        RenewalReport {
            examined: 4,
            renewed: 2,
            auto_renew_disabled: 1,
            removed: 1,
            skipped: 0,
            failed: 0,
        }
    );

    let creator_after = service.get_user("creator").await?;
    assert_eq!(creator_after.balance, creator_before.balance + 5 * PRICE);
    assert_eq!(service.get_user("rich").await?.balance, 10 * PRICE);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_sweeps_charge_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let fan = funded_user(&service, "fan", 5 * PRICE).await?;

    service.subscribe(&fan, tier.id, true).await?;
    let stored_expiry = service.list_subscriptions(&fan).await?[0]
        .subscription
        .expires_at;
    let creator_before = service.get_user("creator").await?;

    let now = Utc::now() + Duration::days(31);
    let (first, second) = tokio::join!(
        service.renew_expired_subscriptions(now),
        service.renew_expired_subscriptions(now)
    );
    let (first, second) = (first?, second?);

    assert_eq!(first.renewed + second.renewed, 1);
    assert_eq!(first.failed + second.failed, 0);
    assert_eq!(first.auto_renew_disabled + second.auto_renew_disabled, 0);

    assert_eq!(service.get_user("fan").await?.balance, 3 * PRICE);
    assert_eq!(
        service.get_user("creator").await?.balance,
        creator_before.balance + PRICE
    );

    let subscriptions = service.list_subscriptions(&fan).await?;
    assert_eq!(
        subscriptions[0].subscription.expires_at,
        stored_expiry + Duration::days(30)
    );

    Ok(())
}

#[tokio::test]
async fn test_renewing_a_stale_row_is_skipped() -> Result<()> {
    let (service, temp) = test_service().await?;
    let repo = test_repository(&temp).await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let fan = funded_user(&service, "fan", 5 * PRICE).await?;
    service.subscribe(&fan, tier.id, true).await?;

    let expired = repo
        .list_expired_subscriptions(Utc::now() + Duration::days(31))
        .await?;
    assert_eq!(expired.len(), 1);
    let entry = &expired[0];

    let outcome = repo
        .renew_subscription(&entry.subscription, entry.creator_id, entry.price_cents)
        .await?;
    assert_eq!(outcome, RenewOutcome::Renewed);

    // Same snapshot again: the expiry no longer matches
    let outcome = repo
        .renew_subscription(&entry.subscription, entry.creator_id, entry.price_cents)
        .await?;
    assert_eq!(outcome, RenewOutcome::Skipped);

    assert_eq!(service.get_user("fan").await?.balance, 3 * PRICE);

    // Nor may a stale snapshot disable or remove the renewed row
    assert!(!repo.disable_expired_auto_renew(&entry.subscription).await?);
    assert!(
        !repo
            .delete_expired_subscription(entry.subscription.id, Utc::now() + Duration::days(31))
            .await?
    );
    let subscriptions = service.list_subscriptions(&fan).await?;
    assert_eq!(subscriptions.len(), 1);
    assert!(subscriptions[0].subscription.auto_renew);

    Ok(())
}

#[tokio::test]
async fn test_auto_renew_turned_off_mid_sweep_is_not_charged() -> Result<()> {
    let (service, temp) = test_service().await?;
    let repo = test_repository(&temp).await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let fan = funded_user(&service, "fan", 5 * PRICE).await?;
    let subscription = service.subscribe(&fan, tier.id, true).await?;

    let expired = repo
        .list_expired_subscriptions(Utc::now() + Duration::days(31))
        .await?;
    let entry = &expired[0];
    assert!(entry.subscription.auto_renew);

    service.set_auto_renew(&fan, subscription.id, false).await?;

    let outcome = repo
        .renew_subscription(&entry.subscription, entry.creator_id, entry.price_cents)
        .await?;
    assert_eq!(outcome, RenewOutcome::Skipped);
    assert_eq!(service.get_user("fan").await?.balance, 4 * PRICE);

    let subscriptions = service.list_subscriptions(&fan).await?;
    assert!(!subscriptions[0].subscription.auto_renew);

    Ok(())
}

#[tokio::test]
async fn test_removal_skips_row_with_auto_renew_back_on() -> Result<()> {
    let (service, temp) = test_service().await?;
    let repo = test_repository(&temp).await?;
    let creator = create_user(&service, "creator").await?;
    let tier = create_tier(&service, &creator, "Monthly", PRICE).await?;
    let fan = funded_user(&service, "fan", 5 * PRICE).await?;
    let subscription = service.subscribe(&fan, tier.id, false).await?;

    let now = Utc::now() + Duration::days(31);
    let expired = repo.list_expired_subscriptions(now).await?;
    assert!(!expired[0].subscription.auto_renew);

    service.set_auto_renew(&fan, subscription.id, true).await?;

    assert!(!repo.delete_expired_subscription(subscription.id, now).await?);
    assert_eq!(service.list_subscriptions(&fan).await?.len(), 1);

    // The next sweep sees auto-renew on and renews instead
    let report = service.renew_expired_subscriptions(now).await?;
    assert_eq!(report.renewed, 1);

    Ok(())
}
