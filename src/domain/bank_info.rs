use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Bank account details used for bank-transfer payouts. One record per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankInfo {
    pub user_id: UserId,
    pub account_holder: String,
    pub bank_name: String,
    pub account_number: String,
    pub routing_number: String,
    pub swift_code: Option<String>,
    pub country: String,
    pub updated_at: DateTime<Utc>,
}

/// Incoming bank details, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankInfoInput {
    pub account_holder: String,
    pub bank_name: String,
    pub account_number: String,
    pub routing_number: String,
    #[serde(default)]
    pub swift_code: Option<String>,
    pub country: String,
}

impl BankInfoInput {
    /// Trim fields and check them. Spaces and dashes in the account number are dropped.
    pub fn validate(self, user_id: UserId) -> Result<BankInfo, String> {
        let account_holder = required("account_holder", &self.account_holder)?;
        let bank_name = required("bank_name", &self.bank_name)?;
        let routing_number = required("routing_number", &self.routing_number)?;
        let country = required("country", &self.country)?;

        let account_number: String = self
            .account_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if !(4..=34).contains(&account_number.len())
            || !account_number.chars().all(|c| c.is_ascii_digit())
        {
            return Err("account_number must be 4 to 34 digits".to_string());
        }

        let swift_code = self
            .swift_code
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty());
        if let Some(code) = &swift_code {
            if !matches!(code.len(), 8 | 11) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err("swift_code must be 8 or 11 alphanumeric characters".to_string());
            }
        }

        Ok(BankInfo {
            user_id,
            account_holder,
            bank_name,
            account_number,
            routing_number,
            swift_code,
            country,
            updated_at: Utc::now(),
        })
    }
}

fn required(field: &str, value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(value.to_string())
    }
}

impl BankInfo {
    /// Account number with everything but the last four digits hidden.
    pub fn masked_account_number(&self) -> String {
        let len = self.account_number.len();
        let visible = &self.account_number[len.saturating_sub(4)..];
        format!("{}{}", "*".repeat(len.saturating_sub(4)), visible)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn input() -> BankInfoInput {
        BankInfoInput {
            account_holder: " Jane Doe ".into(),
            bank_name: "First Bank".into(),
            account_number: "1234-5678 9012".into(),
            routing_number: "021000021".into(),
            swift_code: Some("bofaus3n".into()),
            country: "US".into(),
        }
    }

    #[test]
    fn test_validate_normalizes_fields() {
        let info = input().validate(Uuid::new_v4()).unwrap();
        assert_eq!(info.account_holder, "Jane Doe");
        assert_eq!(info.account_number, "123456789012");
        assert_eq!(info.swift_code.as_deref(), Some("BOFAUS3N"));
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut bad = input();
        bad.bank_name = "  ".into();
        assert_eq!(
            bad.validate(Uuid::new_v4()).unwrap_err(),
            "bank_name is required"
        );
    }

    #[test]
    fn test_validate_rejects_bad_account_number() {
        let mut bad = input();
        bad.account_number = "12ab".into();
        assert!(bad.validate(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_swift() {
        let mut bad = input();
        bad.swift_code = Some("ABC".into());
        assert!(bad.validate(Uuid::new_v4()).is_err());

        let mut empty = input();
        empty.swift_code = Some("   ".into());
        assert!(empty.validate(Uuid::new_v4()).unwrap().swift_code.is_none());
    }

    #[test]
    fn test_masked_account_number() {
        let info = input().validate(Uuid::new_v4()).unwrap();
        assert_eq!(info.masked_account_number(), "********9012");
    }
}
