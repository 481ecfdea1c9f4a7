use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{platform_fee, Cents, SubscriptionId, UserId};

pub type EarningId = Uuid;

/// A single earnings event credited to a creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorEarning {
    pub id: EarningId,
    pub creator_id: UserId,
    /// Cleared when the subscription row is removed
    pub subscription_id: Option<SubscriptionId>,
    pub gross_cents: Cents,
    pub fee_cents: Cents,
    pub net_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl CreatorEarning {
    /// Record a gross payment, deducting the platform fee.
    pub fn from_gross(creator_id: UserId, gross_cents: Cents) -> Self {
        let split = platform_fee(gross_cents);
        Self {
            id: Uuid::new_v4(),
            creator_id,
            subscription_id: None,
            gross_cents: split.gross,
            fee_cents: split.fee,
            net_cents: split.net,
            created_at: Utc::now(),
        }
    }

    pub fn with_subscription(mut self, subscription_id: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }
}
