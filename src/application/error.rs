use thiserror::Error;

use crate::domain::{format_cents, Cents, PayoutStatus, PayoutValidationError};

fn usd(cents: &Cents) -> String {
    format!("${}", format_cents(*cents))
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Tier not found: {0}")]
    TierNotFound(String),

    #[error("Tier already exists: {0}")]
    TierAlreadyExists(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Already subscribed to this tier until {0}")]
    AlreadySubscribed(String),

    #[error("Cannot subscribe to your own tier")]
    SelfSubscription,

    #[error("Insufficient balance: have {}, need {}", usd(.balance), usd(.required))]
    InsufficientBalance { balance: Cents, required: Cents },

    #[error("Insufficient earnings balance: have {}, requested {}", usd(.balance), usd(.requested))]
    InsufficientEarnings { balance: Cents, requested: Cents },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidPayout(#[from] PayoutValidationError),

    #[error("Identity verification is required before requesting a payout")]
    NotVerified,

    #[error("Bank information is required for bank payouts")]
    MissingBankInfo,

    #[error("Invalid bank information: {0}")]
    InvalidBankInfo(String),

    #[error("Bank information not found")]
    BankInfoNotFound,

    #[error("Bank information cannot be removed while a bank payout is pending")]
    BankInfoInUse,

    #[error("A payout request is already pending")]
    PendingPayoutExists,

    #[error("Payout request not found: {0}")]
    PayoutNotFound(String),

    #[error("Cannot move payout from {from} to {to}")]
    InvalidPayoutTransition { from: PayoutStatus, to: PayoutStatus },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Errors caused by the request itself rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::UserAlreadyExists(_)
                | AppError::InvalidUsername(_)
                | AppError::TierAlreadyExists(_)
                | AppError::AlreadySubscribed(_)
                | AppError::SelfSubscription
                | AppError::InsufficientBalance { .. }
                | AppError::InsufficientEarnings { .. }
                | AppError::InvalidAmount(_)
                | AppError::InvalidInput(_)
                | AppError::InvalidPayout(_)
                | AppError::MissingBankInfo
                | AppError::InvalidBankInfo(_)
                | AppError::BankInfoInUse
                | AppError::PendingPayoutExists
                | AppError::InvalidPayoutTransition { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::UserNotFound(_)
                | AppError::TierNotFound(_)
                | AppError::SubscriptionNotFound(_)
                | AppError::BankInfoNotFound
                | AppError::PayoutNotFound(_)
        )
    }
}
