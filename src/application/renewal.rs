use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::{format_cents, RenewalAction};
use crate::storage::RenewOutcome;

use super::{AppError, PlatformService};

/// Tally of one renewal sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    pub examined: usize,
    pub renewed: usize,
    pub auto_renew_disabled: usize,
    pub removed: usize,
    /// Rows changed by someone else between the read and the write
    pub skipped: usize,
    pub failed: usize,
}

impl PlatformService {
    /// Settle every subscription that expired at or before `now`.
    ///
    /// Each subscription is handled in its own transaction. A failure on one row
    /// is logged and counted, and the sweep moves on to the next.
    pub async fn renew_expired_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RenewalReport, AppError> {
        let expired = self.repo.list_expired_subscriptions(now).await?;
        let mut report = RenewalReport {
            examined: expired.len(),
            ..Default::default()
        };

        for entry in expired {
            let sub = &entry.subscription;
            let action = sub.renewal_action(entry.subscriber_balance, entry.price_cents);

            // `None` means the row no longer matched the snapshot and was left alone
            let outcome = match action {
                RenewalAction::Renew => {
                    match self
                        .repo
                        .renew_subscription(sub, entry.creator_id, entry.price_cents)
                        .await
                    {
                        Ok(RenewOutcome::Renewed) => Ok(Some(RenewalAction::Renew)),
                        // Balance dropped between the read and the debit
                        Ok(RenewOutcome::InsufficientBalance) => self
                            .repo
                            .disable_expired_auto_renew(sub)
                            .await
                            .map(|done| done.then_some(RenewalAction::DisableAutoRenew)),
                        Ok(RenewOutcome::Skipped) => Ok(None),
                        Err(e) => Err(e),
                    }
                }
                RenewalAction::DisableAutoRenew => self
                    .repo
                    .disable_expired_auto_renew(sub)
                    .await
                    .map(|done| done.then_some(RenewalAction::DisableAutoRenew)),
                RenewalAction::Remove => self
                    .repo
                    .delete_expired_subscription(sub.id, now)
                    .await
                    .map(|done| done.then_some(RenewalAction::Remove)),
            };

            match outcome {
                Ok(Some(RenewalAction::Renew)) => {
                    report.renewed += 1;
                    info!(
                        subscription = %sub.id,
                        amount = %format_cents(entry.price_cents),
                        expires_at = %sub.next_expiry(),
                        "subscription renewed"
                    );
                }
                Ok(Some(RenewalAction::DisableAutoRenew)) => {
                    report.auto_renew_disabled += 1;
                    info!(subscription = %sub.id, "insufficient balance, auto-renew disabled");
                }
                Ok(Some(RenewalAction::Remove)) => {
                    report.removed += 1;
                    info!(subscription = %sub.id, "expired subscription removed");
                }
                Ok(None) => {
                    report.skipped += 1;
                    warn!(subscription = %sub.id, "subscription changed during sweep, skipped");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(subscription = %sub.id, error = %format!("{:#}", e), "renewal failed");
                }
            }
        }

        info!(
            examined = report.examined,
            renewed = report.renewed,
            disabled = report.auto_renew_disabled,
            removed = report.removed,
            skipped = report.skipped,
            failed = report.failed,
            "renewal sweep finished"
        );
        Ok(report)
    }
}
