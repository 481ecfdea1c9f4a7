use anyhow::Result;
use serde::Deserialize;
use std::io::Read;

use crate::application::{AppError, PlatformService};
use crate::domain::{Role, User, parse_cents};

/// Result of an import operation
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub users_created: usize,
    pub users_skipped: usize,
    pub tiers_created: usize,
    pub tiers_skipped: usize,
    pub errors: Vec<ImportError>,
}

/// Error that occurred during import
#[derive(Debug, Clone)]
pub struct ImportError {
    /// CSV line number, or 1-based position in the JSON array
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
}

/// One account to create, with the tiers it offers.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tiers: Vec<TierRecord>,
    #[serde(skip)]
    line: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Decimal amount, e.g. "9.99"
    pub price: String,
}

/// CSV layout: one row per (user, tier). User columns repeat for each tier;
/// tier columns are left empty for a user without tiers.
#[derive(Debug, Deserialize)]
struct CsvRow {
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    email: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    tier_name: Option<String>,
    #[serde(default)]
    tier_description: Option<String>,
    #[serde(default)]
    tier_price: Option<String>,
}

/// Importer for seeding users and their subscription tiers
pub struct Importer<'a> {
    service: &'a PlatformService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a PlatformService) -> Self {
        Self { service }
    }

    /// Import users and tiers from CSV
    pub async fn import_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records: Vec<UserRecord> = Vec::new();
        let mut errors = Vec::new();

        for (line_num, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
            let line = line_num + 2; // header is line 1

            let row = match result {
                Ok(r) => r,
                Err(e) => {
                    errors.push(ImportError {
                        line,
                        field: None,
                        error: format!("CSV parse error: {}", e),
                    });
                    continue;
                }
            };

            let tier = match non_empty(row.tier_name) {
                Some(name) => Some(TierRecord {
                    name,
                    description: non_empty(row.tier_description),
                    price: row.tier_price.unwrap_or_default(),
                }),
                None => None,
            };

            match records.iter_mut().find(|r| r.username == row.username) {
                Some(existing) => existing.tiers.extend(tier),
                None => records.push(UserRecord {
                    username: row.username,
                    display_name: non_empty(row.display_name),
                    email: row.email,
                    role: non_empty(row.role),
                    tiers: tier.into_iter().collect(),
                    line,
                }),
            }
        }

        let mut result = self.import_records(records, &options).await?;
        errors.append(&mut result.errors);
        result.errors = errors;
        result.errors.sort_by_key(|e| e.line);
        Ok(result)
    }

    /// Import users and tiers from a JSON array of user records
    pub async fn import_json<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let mut records: Vec<UserRecord> = serde_json::from_reader(reader)?;
        for (i, record) in records.iter_mut().enumerate() {
            record.line = i + 1;
        }
        self.import_records(records, &options).await
    }

    async fn import_records(
        &self,
        records: Vec<UserRecord>,
        options: &ImportOptions,
    ) -> Result<ImportResult> {
        let mut result = ImportResult::default();

        for record in records {
            let line = record.line;

            let role = match record.role.as_deref() {
                None => Role::User,
                Some(s) => match Role::from_str(s) {
                    Some(role) => role,
                    None => {
                        result.errors.push(ImportError {
                            line,
                            field: Some("role".to_string()),
                            error: format!("Invalid role: {}", s),
                        });
                        continue;
                    }
                },
            };

            let user = match self.import_user(&record, role, options, &mut result).await {
                Ok(UserStatus::Ready(user)) => user,
                Ok(UserStatus::WouldCreate) => {
                    result.tiers_created += record.tiers.len();
                    continue;
                }
                Ok(UserStatus::EmailTaken) => {
                    result.tiers_skipped += record.tiers.len();
                    continue;
                }
                Err(e) => {
                    result.errors.push(ImportError {
                        line,
                        field: None,
                        error: format!("User creation failed: {}", e),
                    });
                    continue;
                }
            };

            for tier in &record.tiers {
                let price_cents = match parse_cents(&tier.price) {
                    Ok(p) => p,
                    Err(e) => {
                        result.errors.push(ImportError {
                            line,
                            field: Some("tier_price".to_string()),
                            error: format!("Invalid price for tier '{}': {}", tier.name, e),
                        });
                        continue;
                    }
                };

                if options.dry_run {
                    let exists = self
                        .service
                        .list_tiers(&user.username)
                        .await?
                        .iter()
                        .any(|t| t.name == tier.name.trim());
                    if exists {
                        result.tiers_skipped += 1;
                    } else {
                        result.tiers_created += 1;
                    }
                    continue;
                }

                match self
                    .service
                    .create_tier(&user, tier.name.clone(), tier.description.clone(), price_cents)
                    .await
                {
                    Ok(_) => result.tiers_created += 1,
                    Err(AppError::TierAlreadyExists(_)) => result.tiers_skipped += 1,
                    Err(e) => result.errors.push(ImportError {
                        line,
                        field: Some("tier".to_string()),
                        error: format!("Tier '{}' failed: {}", tier.name, e),
                    }),
                }
            }
        }

        Ok(result)
    }

    /// Create the user, or find it if the username is already taken.
    async fn import_user(
        &self,
        record: &UserRecord,
        role: Role,
        options: &ImportOptions,
        result: &mut ImportResult,
    ) -> Result<UserStatus, AppError> {
        match self.service.get_user(&record.username).await {
            Ok(existing) => {
                result.users_skipped += 1;
                return Ok(UserStatus::Ready(existing));
            }
            Err(AppError::UserNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        if options.dry_run {
            if self.service.repo.email_exists(&record.email).await? {
                result.users_skipped += 1;
                return Ok(UserStatus::EmailTaken);
            }
            result.users_created += 1;
            return Ok(UserStatus::WouldCreate);
        }

        match self
            .service
            .create_user(
                record.username.clone(),
                record.display_name.clone(),
                record.email.clone(),
                role,
            )
            .await
        {
            Ok(user) => {
                result.users_created += 1;
                Ok(UserStatus::Ready(user))
            }
            // The username was free, so the email belongs to another account
            Err(AppError::UserAlreadyExists(_)) => {
                result.users_skipped += 1;
                Ok(UserStatus::EmailTaken)
            }
            Err(e) => Err(e),
        }
    }
}

enum UserStatus {
    Ready(User),
    /// Dry run: the user would be created
    WouldCreate,
    EmailTaken,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
