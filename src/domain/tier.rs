use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, UserId};

pub type TierId = Uuid;

/// A paid subscription level offered by a creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub id: TierId,
    pub creator_id: UserId,
    pub name: String,
    pub description: Option<String>,
    /// Price per 30-day period
    pub price_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionTier {
    pub fn new(creator_id: UserId, name: String, price_cents: Cents) -> Self {
        assert!(price_cents > 0, "Tier price must be positive");
        Self {
            id: Uuid::new_v4(),
            creator_id,
            name,
            description: None,
            price_cents,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
