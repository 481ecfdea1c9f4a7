use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{format_cents, is_valid_eth_address, Cents, UserId};

pub type PayoutId = Uuid;

/// Smallest withdrawable amount ($100.00).
pub const MIN_PAYOUT_CENTS: Cents = 10_000;
/// Largest amount per request ($10,000.00).
pub const MAX_PAYOUT_CENTS: Cents = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutMethod {
    /// Wire to the user's registered bank account
    Bank,
    /// Transfer to an Ethereum wallet address
    Eth,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::Bank => "bank",
            PayoutMethod::Eth => "eth",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bank" => Some(PayoutMethod::Bank),
            "eth" | "ethereum" => Some(PayoutMethod::Eth),
            _ => None,
        }
    }
}

impl std::fmt::Display for PayoutMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PayoutStatus::Pending),
            "approved" => Some(PayoutStatus::Approved),
            "rejected" => Some(PayoutStatus::Rejected),
            "completed" => Some(PayoutStatus::Completed),
            _ => None,
        }
    }

    /// Admin-driven transitions: pending -> approved | rejected, approved -> completed.
    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (PayoutStatus::Pending, PayoutStatus::Approved)
                | (PayoutStatus::Pending, PayoutStatus::Rejected)
                | (PayoutStatus::Approved, PayoutStatus::Completed)
        )
    }

    pub fn is_final(&self) -> bool {
        matches!(self, PayoutStatus::Rejected | PayoutStatus::Completed)
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A creator's request to withdraw part of their earnings balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: PayoutId,
    pub user_id: UserId,
    pub amount_cents: Cents,
    pub method: PayoutMethod,
    /// Destination wallet, only for `PayoutMethod::Eth`
    pub eth_address: Option<String>,
    pub status: PayoutStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PayoutRequest {
    pub fn new(user_id: UserId, amount_cents: Cents, method: PayoutMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount_cents,
            method,
            eth_address: None,
            status: PayoutStatus::Pending,
            admin_note: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn with_eth_address(mut self, address: impl Into<String>) -> Self {
        self.eth_address = Some(address.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutValidationError {
    BelowMinimum { requested: Cents },
    AboveMaximum { requested: Cents },
    MissingEthAddress,
    InvalidEthAddress(String),
}

impl std::fmt::Display for PayoutValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutValidationError::BelowMinimum { requested } => write!(
                f,
                "Minimum payout is ${} (requested ${})",
                format_cents(MIN_PAYOUT_CENTS),
                format_cents(*requested)
            ),
            PayoutValidationError::AboveMaximum { requested } => write!(
                f,
                "Maximum payout is ${} (requested ${})",
                format_cents(MAX_PAYOUT_CENTS),
                format_cents(*requested)
            ),
            PayoutValidationError::MissingEthAddress => {
                write!(f, "An Ethereum address is required for ETH payouts")
            }
            PayoutValidationError::InvalidEthAddress(address) => {
                write!(f, "Invalid Ethereum address: {}", address)
            }
        }
    }
}

impl std::error::Error for PayoutValidationError {}

/// Check the request shape before touching any balances.
/// Bank payouts ignore any address that was sent along.
pub fn validate_payout_request(
    amount_cents: Cents,
    method: PayoutMethod,
    eth_address: Option<&str>,
) -> Result<(), PayoutValidationError> {
    if amount_cents < MIN_PAYOUT_CENTS {
        return Err(PayoutValidationError::BelowMinimum {
            requested: amount_cents,
        });
    }
    if amount_cents > MAX_PAYOUT_CENTS {
        return Err(PayoutValidationError::AboveMaximum {
            requested: amount_cents,
        });
    }

    if method == PayoutMethod::Eth {
        match eth_address.map(str::trim) {
            None | Some("") => return Err(PayoutValidationError::MissingEthAddress),
            Some(address) if !is_valid_eth_address(address) => {
                return Err(PayoutValidationError::InvalidEthAddress(address.to_string()));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[test]
    fn test_amount_bounds_are_inclusive() {
        assert!(validate_payout_request(MIN_PAYOUT_CENTS, PayoutMethod::Bank, None).is_ok());
        assert!(validate_payout_request(MAX_PAYOUT_CENTS, PayoutMethod::Bank, None).is_ok());
        assert_eq!(
            validate_payout_request(MIN_PAYOUT_CENTS - 1, PayoutMethod::Bank, None),
            Err(PayoutValidationError::BelowMinimum { requested: 9_999 })
        );
        assert_eq!(
            validate_payout_request(MAX_PAYOUT_CENTS + 1, PayoutMethod::Bank, None),
            Err(PayoutValidationError::AboveMaximum {
                requested: 1_000_001
            })
        );
    }

    #[test]
    fn test_eth_payout_requires_valid_address() {
        assert_eq!(
            validate_payout_request(20_000, PayoutMethod::Eth, None),
            Err(PayoutValidationError::MissingEthAddress)
        );
        assert!(matches!(
            validate_payout_request(20_000, PayoutMethod::Eth, Some("0x1234")),
            Err(PayoutValidationError::InvalidEthAddress(_))
        ));
        assert!(validate_payout_request(20_000, PayoutMethod::Eth, Some(ADDRESS)).is_ok());
    }

    #[test]
    fn test_bank_payout_ignores_address() {
        assert!(validate_payout_request(20_000, PayoutMethod::Bank, Some("garbage")).is_ok());
    }

    #[test]
    fn test_status_transitions() {
        use PayoutStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Completed.can_transition_to(Pending));
        assert!(Rejected.is_final() && Completed.is_final());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(PayoutMethod::from_str("ETH"), Some(PayoutMethod::Eth));
        assert_eq!(PayoutMethod::from_str("ethereum"), Some(PayoutMethod::Eth));
        assert_eq!(PayoutMethod::from_str("bank"), Some(PayoutMethod::Bank));
        assert_eq!(PayoutMethod::from_str("paypal"), None);
    }
}
