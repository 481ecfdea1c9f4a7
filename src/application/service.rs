use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::domain::{
    BankInfo, BankInfoInput, Cents, CreatorEarning, PayoutMethod, Role, Session, Subscription,
    SubscriptionId, SubscriptionTier, TierId, User, UserId, MAX_DEPOSIT_CENTS, MAX_TIER_PRICE_CENTS,
    format_cents, is_valid_username,
};
use crate::storage::{PurchaseOutcome, Repository};

use super::AppError;

/// Default lifetime of a login session.
pub const DEFAULT_SESSION_DAYS: i64 = 30;

/// Application service providing the platform's money-moving operations.
/// This is the interface used by both the CLI and the HTTP API.
pub struct PlatformService {
    pub(crate) repo: Repository,
    session_lifetime: Duration,
}

/// A subscription together with the tier it pays for.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriptionInfo {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub tier_name: String,
    pub price_cents: Cents,
    pub creator_id: UserId,
}

/// Per-user balances at a point in time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BalanceSnapshotEntry {
    pub user_id: UserId,
    pub username: String,
    pub balance: Cents,
    pub earnings_balance: Cents,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BalanceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub entries: Vec<BalanceSnapshotEntry>,
    pub total_balance: Cents,
    pub total_earnings_balance: Cents,
}

impl PlatformService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            session_lifetime: Duration::days(DEFAULT_SESSION_DAYS),
        }
    }

    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Users
    // ========================

    pub async fn create_user(
        &self,
        username: String,
        display_name: Option<String>,
        email: String,
        role: Role,
    ) -> Result<User, AppError> {
        if !is_valid_username(&username) {
            return Err(AppError::InvalidUsername(username));
        }
        if self.repo.get_user_by_username(&username).await?.is_some() {
            return Err(AppError::UserAlreadyExists(username));
        }
        if self.repo.email_exists(&email).await? {
            return Err(AppError::UserAlreadyExists(email));
        }

        let display_name = display_name.unwrap_or_else(|| username.clone());
        let user = User::new(username, display_name, email).with_role(role);
        self.repo.save_user(&user).await?;

        info!(user = %user.username, role = %user.role, "created user");
        Ok(user)
    }

    pub async fn get_user(&self, username: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    pub async fn get_user_by_id(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    /// Record the outcome of identity verification.
    pub async fn set_verified(&self, username: &str, verified: bool) -> Result<User, AppError> {
        let mut user = self.get_user(username).await?;
        self.repo.set_verified(user.id, verified).await?;
        user.is_verified = verified;

        info!(user = %user.username, verified, "updated verification");
        Ok(user)
    }

    /// Add funds to a user's spendable balance.
    pub async fn deposit(&self, username: &str, amount_cents: Cents) -> Result<User, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Deposit amount must be positive".to_string(),
            ));
        }
        if amount_cents > MAX_DEPOSIT_CENTS {
            return Err(AppError::InvalidAmount(format!(
                "Deposit may not exceed {}",
                format_cents(MAX_DEPOSIT_CENTS)
            )));
        }

        let user = self.get_user(username).await?;
        self.repo.credit_balance(user.id, amount_cents).await?;

        info!(user = %user.username, amount = %format_cents(amount_cents), "deposited funds");
        self.get_user_by_id(user.id).await
    }

    // ========================
    // Sessions
    // ========================

    pub async fn issue_session(&self, username: &str) -> Result<Session, AppError> {
        let user = self.get_user(username).await?;
        let session = Session::new(user.id, self.session_lifetime);
        self.repo.save_session(&session).await?;

        debug!(user = %user.username, "issued session");
        Ok(session)
    }

    /// Resolve a session token to its user. Expired sessions are removed.
    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        let session = self
            .repo
            .get_session(token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if session.is_expired(Utc::now()) {
            self.repo.delete_session(token).await?;
            return Err(AppError::Unauthorized);
        }

        self.repo
            .get_user(session.user_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Returns true if the session existed.
    pub async fn revoke_session(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.repo.delete_session(token).await?)
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, AppError> {
        Ok(self.repo.delete_expired_sessions(Utc::now()).await?)
    }

    // ========================
    // Tiers
    // ========================

    pub async fn create_tier(
        &self,
        creator: &User,
        name: String,
        description: Option<String>,
        price_cents: Cents,
    ) -> Result<SubscriptionTier, AppError> {
        if price_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Tier price must be positive".to_string(),
            ));
        }
        if price_cents > MAX_TIER_PRICE_CENTS {
            return Err(AppError::InvalidAmount(format!(
                "Tier price may not exceed {}",
                format_cents(MAX_TIER_PRICE_CENTS)
            )));
        }
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Tier name is required".to_string()));
        }
        if self
            .repo
            .get_tier_by_name(creator.id, &name)
            .await?
            .is_some()
        {
            return Err(AppError::TierAlreadyExists(name));
        }

        let mut tier = SubscriptionTier::new(creator.id, name, price_cents);
        if let Some(desc) = description {
            tier = tier.with_description(desc);
        }
        self.repo.save_tier(&tier).await?;

        info!(creator = %creator.username, tier = %tier.name, price = %format_cents(price_cents), "created tier");
        Ok(tier)
    }

    pub async fn get_tier(&self, id: TierId) -> Result<SubscriptionTier, AppError> {
        self.repo
            .get_tier(id)
            .await?
            .ok_or_else(|| AppError::TierNotFound(id.to_string()))
    }

    pub async fn list_tiers(&self, creator_username: &str) -> Result<Vec<SubscriptionTier>, AppError> {
        let creator = self.get_user(creator_username).await?;
        Ok(self.repo.list_tiers_for_creator(creator.id).await?)
    }

    // ========================
    // Subscriptions
    // ========================

    /// Buy one period of a tier. The subscriber pays the full price; the creator's
    /// earnings balance receives the price net of the platform fee.
    pub async fn subscribe(
        &self,
        subscriber: &User,
        tier_id: TierId,
        auto_renew: bool,
    ) -> Result<Subscription, AppError> {
        let tier = self.get_tier(tier_id).await?;
        if tier.creator_id == subscriber.id {
            return Err(AppError::SelfSubscription);
        }

        let now = Utc::now();
        if let Some(existing) = self
            .repo
            .find_active_subscription(subscriber.id, tier.id, now)
            .await?
        {
            return Err(AppError::AlreadySubscribed(
                existing.expires_at.format("%Y-%m-%d").to_string(),
            ));
        }

        let subscription = Subscription::new(subscriber.id, tier.id, now).with_auto_renew(auto_renew);
        let earning =
            CreatorEarning::from_gross(tier.creator_id, tier.price_cents).with_subscription(subscription.id);

        match self
            .repo
            .purchase_subscription(&subscription, &tier, &earning)
            .await?
        {
            PurchaseOutcome::Purchased => {
                info!(
                    subscriber = %subscriber.username,
                    tier = %tier.name,
                    gross = %format_cents(earning.gross_cents),
                    fee = %format_cents(earning.fee_cents),
                    "subscription purchased"
                );
                Ok(subscription)
            }
            PurchaseOutcome::InsufficientBalance => {
                let current = self.get_user_by_id(subscriber.id).await?;
                Err(AppError::InsufficientBalance {
                    balance: current.balance,
                    required: tier.price_cents,
                })
            }
        }
    }

    /// Turn auto-renew on or off. Only the subscriber may do this.
    pub async fn set_auto_renew(
        &self,
        subscriber: &User,
        subscription_id: SubscriptionId,
        auto_renew: bool,
    ) -> Result<Subscription, AppError> {
        let mut subscription = self
            .repo
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| AppError::SubscriptionNotFound(subscription_id.to_string()))?;

        if subscription.subscriber_id != subscriber.id {
            return Err(AppError::SubscriptionNotFound(subscription_id.to_string()));
        }

        self.repo.set_auto_renew(subscription.id, auto_renew).await?;
        subscription.auto_renew = auto_renew;
        Ok(subscription)
    }

    pub async fn list_subscriptions(&self, subscriber: &User) -> Result<Vec<SubscriptionInfo>, AppError> {
        let subscriptions = self
            .repo
            .list_subscriptions_for_subscriber(subscriber.id)
            .await?;

        let mut infos = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let tier = self.get_tier(subscription.tier_id).await?;
            infos.push(SubscriptionInfo {
                subscription,
                tier_name: tier.name,
                price_cents: tier.price_cents,
                creator_id: tier.creator_id,
            });
        }
        Ok(infos)
    }

    // ========================
    // Bank info
    // ========================

    pub async fn save_bank_info(&self, user: &User, input: BankInfoInput) -> Result<BankInfo, AppError> {
        let info = input.validate(user.id).map_err(AppError::InvalidBankInfo)?;
        self.repo.upsert_bank_info(&info).await?;

        info!(user = %user.username, "saved bank info");
        Ok(info)
    }

    pub async fn get_bank_info(&self, user: &User) -> Result<BankInfo, AppError> {
        self.repo
            .get_bank_info(user.id)
            .await?
            .ok_or(AppError::BankInfoNotFound)
    }

    /// Remove bank details. Refused while a pending bank payout still needs them.
    pub async fn delete_bank_info(&self, user: &User) -> Result<(), AppError> {
        if let Some(pending) = self.repo.get_pending_payout(user.id).await? {
            if pending.method == PayoutMethod::Bank {
                return Err(AppError::BankInfoInUse);
            }
        }

        if !self.repo.delete_bank_info(user.id).await? {
            return Err(AppError::BankInfoNotFound);
        }

        info!(user = %user.username, "deleted bank info");
        Ok(())
    }

    // ========================
    // Maintenance
    // ========================

    /// Current balances of every user.
    pub async fn balance_snapshot(&self) -> Result<BalanceSnapshot, AppError> {
        let users = self.repo.list_users().await?;
        let entries: Vec<BalanceSnapshotEntry> = users
            .into_iter()
            .map(|u| BalanceSnapshotEntry {
                user_id: u.id,
                username: u.username,
                balance: u.balance,
                earnings_balance: u.earnings_balance,
            })
            .collect();

        Ok(BalanceSnapshot {
            taken_at: Utc::now(),
            total_balance: entries.iter().map(|e| e.balance).sum(),
            total_earnings_balance: entries.iter().map(|e| e.earnings_balance).sum(),
            entries,
        })
    }

    pub async fn vacuum(&self) -> Result<(), AppError> {
        self.repo.vacuum().await?;
        info!("database vacuumed");
        Ok(())
    }
}
