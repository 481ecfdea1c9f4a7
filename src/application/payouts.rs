use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{
    Cents, CreatorEarning, PayoutId, PayoutMethod, PayoutRequest, PayoutStatus, User,
    format_cents, validate_payout_request,
};
use crate::storage::PayoutInsertOutcome;

use super::{AppError, PlatformService};

/// Number of recent earnings included in a summary.
const RECENT_EARNINGS: usize = 20;

/// Earnings overview for a creator.
#[derive(Debug, Clone, Serialize)]
pub struct EarningsSummary {
    pub earnings_balance: Cents,
    pub lifetime_gross: Cents,
    pub lifetime_fees: Cents,
    pub lifetime_net: Cents,
    pub earnings_count: i64,
    /// Amount currently held by a pending payout request
    pub pending_payout: Cents,
    pub recent: Vec<CreatorEarning>,
}

impl PlatformService {
    /// Submit a withdrawal of `amount_cents` from the user's earnings balance.
    ///
    /// On success the request is stored as pending and the amount is already
    /// deducted from the earnings balance.
    pub async fn request_payout(
        &self,
        user: &User,
        amount_cents: Cents,
        method: PayoutMethod,
        eth_address: Option<String>,
    ) -> Result<PayoutRequest, AppError> {
        validate_payout_request(amount_cents, method, eth_address.as_deref())?;

        // Re-read so the checks run against current balances, not a stale session copy
        let user = self.get_user_by_id(user.id).await?;

        if !user.is_verified {
            return Err(AppError::NotVerified);
        }
        if user.earnings_balance < amount_cents {
            return Err(AppError::InsufficientEarnings {
                balance: user.earnings_balance,
                requested: amount_cents,
            });
        }
        if method == PayoutMethod::Bank && self.repo.get_bank_info(user.id).await?.is_none() {
            return Err(AppError::MissingBankInfo);
        }
        if self.repo.get_pending_payout(user.id).await?.is_some() {
            return Err(AppError::PendingPayoutExists);
        }

        let mut request = PayoutRequest::new(user.id, amount_cents, method);
        if method == PayoutMethod::Eth {
            if let Some(address) = eth_address {
                request = request.with_eth_address(address.trim());
            }
        }

        match self.repo.insert_payout_request(&request).await? {
            PayoutInsertOutcome::Inserted => {
                info!(
                    user = %user.username,
                    payout = %request.id,
                    amount = %format_cents(amount_cents),
                    method = %method,
                    "payout requested"
                );
                Ok(request)
            }
            PayoutInsertOutcome::InsufficientEarnings => {
                let current = self.get_user_by_id(user.id).await?;
                Err(AppError::InsufficientEarnings {
                    balance: current.earnings_balance,
                    requested: amount_cents,
                })
            }
            PayoutInsertOutcome::PendingExists => Err(AppError::PendingPayoutExists),
        }
    }

    pub async fn get_payout(&self, id: PayoutId) -> Result<PayoutRequest, AppError> {
        self.repo
            .get_payout(id)
            .await?
            .ok_or_else(|| AppError::PayoutNotFound(id.to_string()))
    }

    /// All payout requests, oldest first, optionally by status.
    pub async fn list_payouts(
        &self,
        status: Option<PayoutStatus>,
    ) -> Result<Vec<PayoutRequest>, AppError> {
        Ok(self.repo.list_payouts(status).await?)
    }

    pub async fn list_user_payouts(&self, user: &User) -> Result<Vec<PayoutRequest>, AppError> {
        Ok(self.repo.list_payouts_for_user(user.id).await?)
    }

    pub async fn approve_payout(
        &self,
        id: PayoutId,
        note: Option<String>,
    ) -> Result<PayoutRequest, AppError> {
        self.transition_payout(id, PayoutStatus::Approved, note).await
    }

    /// Reject a pending request. The held amount goes back to the earnings balance.
    pub async fn reject_payout(
        &self,
        id: PayoutId,
        note: Option<String>,
    ) -> Result<PayoutRequest, AppError> {
        self.transition_payout(id, PayoutStatus::Rejected, note).await
    }

    /// Mark an approved request as paid out.
    pub async fn complete_payout(
        &self,
        id: PayoutId,
        note: Option<String>,
    ) -> Result<PayoutRequest, AppError> {
        self.transition_payout(id, PayoutStatus::Completed, note).await
    }

    async fn transition_payout(
        &self,
        id: PayoutId,
        to: PayoutStatus,
        note: Option<String>,
    ) -> Result<PayoutRequest, AppError> {
        let request = self.get_payout(id).await?;
        let from = request.status;
        if from.is_final() {
            warn!(payout = %id, status = %from, to = %to, "payout already settled");
            return Err(AppError::InvalidPayoutTransition { from, to });
        }
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidPayoutTransition { from, to });
        }

        let now = Utc::now();
        let applied = if to == PayoutStatus::Rejected {
            self.repo
                .reject_payout(&request, note.as_deref(), now)
                .await?
        } else {
            self.repo
                .update_payout_status(id, from, to, note.as_deref(), now)
                .await?
        };

        if !applied {
            // Another admin moved it first; report against the state that won
            let current = self.get_payout(id).await?;
            warn!(payout = %id, from = %current.status, to = %to, "payout changed concurrently");
            return Err(AppError::InvalidPayoutTransition {
                from: current.status,
                to,
            });
        }

        info!(
            payout = %id,
            from = %from,
            to = %to,
            amount = %format_cents(request.amount_cents),
            "payout status changed"
        );
        self.get_payout(id).await
    }

    // ========================
    // Earnings
    // ========================

    pub async fn earnings_summary(&self, user: &User) -> Result<EarningsSummary, AppError> {
        let user = self.get_user_by_id(user.id).await?;
        let totals = self.repo.earnings_totals(user.id).await?;
        let recent = self
            .repo
            .list_earnings_for_creator(user.id, Some(RECENT_EARNINGS))
            .await?;
        let pending_payout = self
            .repo
            .get_pending_payout(user.id)
            .await?
            .map(|p| p.amount_cents)
            .unwrap_or(0);

        Ok(EarningsSummary {
            earnings_balance: user.earnings_balance,
            lifetime_gross: totals.gross,
            lifetime_fees: totals.fee,
            lifetime_net: totals.net,
            earnings_count: totals.count,
            pending_payout,
            recent,
        })
    }
}
