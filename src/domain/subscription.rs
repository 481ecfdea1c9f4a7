use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, TierId, UserId};

pub type SubscriptionId = Uuid;

/// Length of one paid subscription period.
pub const RENEWAL_PERIOD_DAYS: i64 = 30;

pub fn renewal_period() -> Duration {
    Duration::days(RENEWAL_PERIOD_DAYS)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscriber_id: UserId,
    pub tier_id: TierId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub auto_renew: bool,
}

/// What the renewal sweep does with an expired subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalAction {
    /// Charge the subscriber, pay the creator, extend by one period
    Renew,
    /// Subscriber cannot afford the renewal; stop trying
    DisableAutoRenew,
    /// Auto-renew is off; the subscription row goes away
    Remove,
}

impl Subscription {
    /// Start a subscription that runs for one period from `now`.
    pub fn new(subscriber_id: UserId, tier_id: TierId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber_id,
            tier_id,
            created_at: now,
            expires_at: now + renewal_period(),
            auto_renew: true,
        }
    }

    pub fn with_auto_renew(mut self, auto_renew: bool) -> Self {
        self.auto_renew = auto_renew;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Expiry after one renewal. Extends from the previous expiry, not from now.
    pub fn next_expiry(&self) -> DateTime<Utc> {
        self.expires_at + renewal_period()
    }

    /// Decide how to handle this subscription once it has expired.
    pub fn renewal_action(&self, subscriber_balance: Cents, price_cents: Cents) -> RenewalAction {
        if !self.auto_renew {
            RenewalAction::Remove
        } else if subscriber_balance >= price_cents {
            RenewalAction::Renew
        } else {
            RenewalAction::DisableAutoRenew
        }
    }
}
