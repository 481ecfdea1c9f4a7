use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    BankInfo, Cents, CreatorEarning, PayoutId, PayoutMethod, PayoutRequest, PayoutStatus, Role,
    Session, Subscription, SubscriptionId, SubscriptionTier, TierId, User, UserId,
};

use super::MIGRATION_001_INITIAL;

/// Fixed-width UTC timestamp, so that string comparison in SQL is chronological.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str, field: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid {} timestamp", field))?
        .with_timezone(&Utc))
}

fn parse_id(s: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid {}", field))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// An expired subscription joined with what the renewal sweep needs to settle it.
#[derive(Debug, Clone)]
pub struct ExpiredSubscription {
    pub subscription: Subscription,
    pub creator_id: UserId,
    pub price_cents: Cents,
    pub subscriber_balance: Cents,
}

/// Lifetime earnings totals for a creator.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarningsTotals {
    pub gross: Cents,
    pub fee: Cents,
    pub net: Cents,
    pub count: i64,
}

/// Outcome of the payout insert transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutInsertOutcome {
    Inserted,
    InsufficientEarnings,
    PendingExists,
}

/// Outcome of a renewal transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed,
    InsufficientBalance,
    /// The row no longer matched what the sweep read
    Skipped,
}

/// Outcome of a subscription purchase transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased,
    InsufficientBalance,
}

const USER_COLUMNS: &str =
    "id, username, display_name, email, role, is_verified, balance, earnings_balance, created_at";
const TIER_COLUMNS: &str = "id, creator_id, name, description, price_cents, created_at";
const SUBSCRIPTION_COLUMNS: &str = "id, subscriber_id, tier_id, created_at, expires_at, auto_renew";
const PAYOUT_COLUMNS: &str =
    "id, user_id, amount_cents, method, eth_address, status, admin_note, created_at, processed_at";

/// Repository for persisting and querying platform balances, subscriptions and payouts.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, email, role, is_verified, balance, earnings_balance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_verified)
        .bind(user.balance)
        .bind(user.earnings_balance)
        .bind(ts(user.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save user")?;
        Ok(())
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Username lookup is case-insensitive.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE username = ? COLLATE NOCASE",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) as count FROM users WHERE email = ? COLLATE NOCASE")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check email")?
                .get("count");
        Ok(count > 0)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY username COLLATE NOCASE",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    pub async fn set_verified(&self, id: UserId, verified: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_verified = ? WHERE id = ?")
            .bind(verified)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update verification")?;
        Ok(())
    }

    /// Add funds to a user's spendable balance.
    pub async fn credit_balance(&self, id: UserId, amount: Cents) -> Result<()> {
        sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
            .bind(amount)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to credit balance")?;
        Ok(())
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: parse_id(&id_str, "user ID")?,
            username: row.get("username"),
            display_name: row.get("display_name"),
            email: row.get("email"),
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
            is_verified: row.get::<i64, _>("is_verified") != 0,
            balance: row.get("balance"),
            earnings_balance: row.get("earnings_balance"),
            created_at: parse_ts(&created_at_str, "created_at")?,
        })
    }

    // ========================
    // Session operations
    // ========================

    pub async fn save_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id.to_string())
        .bind(ts(session.created_at))
        .bind(ts(session.expires_at))
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;
        Ok(())
    }

    pub async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id_str: String = row.get("user_id");
        let created_at_str: String = row.get("created_at");
        let expires_at_str: String = row.get("expires_at");

        Ok(Some(Session {
            token: row.get("token"),
            user_id: parse_id(&user_id_str, "session user ID")?,
            created_at: parse_ts(&created_at_str, "created_at")?,
            expires_at: parse_ts(&expires_at_str, "expires_at")?,
        }))
    }

    /// Returns true if a session was removed.
    pub async fn delete_session(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(ts(now))
            .execute(&self.pool)
            .await
            .context("Failed to delete expired sessions")?;
        Ok(result.rows_affected())
    }

    // ========================
    // Tier operations
    // ========================

    pub async fn save_tier(&self, tier: &SubscriptionTier) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_tiers (id, creator_id, name, description, price_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tier.id.to_string())
        .bind(tier.creator_id.to_string())
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier.price_cents)
        .bind(ts(tier.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save tier")?;
        Ok(())
    }

    pub async fn get_tier(&self, id: TierId) -> Result<Option<SubscriptionTier>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_tiers WHERE id = ?",
            TIER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch tier")?;

        row.as_ref().map(Self::row_to_tier).transpose()
    }

    pub async fn get_tier_by_name(
        &self,
        creator_id: UserId,
        name: &str,
    ) -> Result<Option<SubscriptionTier>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_tiers WHERE creator_id = ? AND name = ?",
            TIER_COLUMNS
        ))
        .bind(creator_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch tier by name")?;

        row.as_ref().map(Self::row_to_tier).transpose()
    }

    pub async fn list_tiers_for_creator(&self, creator_id: UserId) -> Result<Vec<SubscriptionTier>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_tiers WHERE creator_id = ? ORDER BY price_cents, name",
            TIER_COLUMNS
        ))
        .bind(creator_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tiers")?;

        rows.iter().map(Self::row_to_tier).collect()
    }

    fn row_to_tier(row: &SqliteRow) -> Result<SubscriptionTier> {
        let id_str: String = row.get("id");
        let creator_id_str: String = row.get("creator_id");
        let created_at_str: String = row.get("created_at");

        Ok(SubscriptionTier {
            id: parse_id(&id_str, "tier ID")?,
            creator_id: parse_id(&creator_id_str, "creator ID")?,
            name: row.get("name"),
            description: row.get("description"),
            price_cents: row.get("price_cents"),
            created_at: parse_ts(&created_at_str, "created_at")?,
        })
    }

    // ========================
    // Subscription operations
    // ========================

    pub async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch subscription")?;

        row.as_ref().map(Self::row_to_subscription).transpose()
    }

    pub async fn list_subscriptions_for_subscriber(
        &self,
        subscriber_id: UserId,
    ) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = ? ORDER BY expires_at",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscriber_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list subscriptions")?;

        rows.iter().map(Self::row_to_subscription).collect()
    }

    /// Unexpired subscription of `subscriber_id` to `tier_id`, if any.
    pub async fn find_active_subscription(
        &self,
        subscriber_id: UserId,
        tier_id: TierId,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = ? AND tier_id = ? AND expires_at > ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscriber_id.to_string())
        .bind(tier_id.to_string())
        .bind(ts(now))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find active subscription")?;

        row.as_ref().map(Self::row_to_subscription).transpose()
    }

    /// All subscriptions with `expires_at <= now`, oldest first.
    pub async fn list_expired_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredSubscription>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.subscriber_id, s.tier_id, s.created_at, s.expires_at, s.auto_renew,
                   t.creator_id, t.price_cents, u.balance AS subscriber_balance
            FROM subscriptions s
            JOIN subscription_tiers t ON t.id = s.tier_id
            JOIN users u ON u.id = s.subscriber_id
            WHERE s.expires_at <= ?
            ORDER BY s.expires_at
            "#,
        )
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list expired subscriptions")?;

        rows.iter()
            .map(|row| {
                let creator_id_str: String = row.get("creator_id");
                Ok(ExpiredSubscription {
                    subscription: Self::row_to_subscription(row)?,
                    creator_id: parse_id(&creator_id_str, "creator ID")?,
                    price_cents: row.get("price_cents"),
                    subscriber_balance: row.get("subscriber_balance"),
                })
            })
            .collect()
    }

    pub async fn set_auto_renew(&self, id: SubscriptionId, auto_renew: bool) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET auto_renew = ? WHERE id = ?")
            .bind(auto_renew)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update auto-renew")?;
        Ok(())
    }

    /// Charge the subscriber, credit the creator's earnings net of fees, and record
    /// both the earning and the subscription, all in one transaction.
    pub async fn purchase_subscription(
        &self,
        subscription: &Subscription,
        tier: &SubscriptionTier,
        earning: &CreatorEarning,
    ) -> Result<PurchaseOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let debited = sqlx::query(
            "UPDATE users SET balance = balance - ? WHERE id = ? AND balance >= ?",
        )
        .bind(tier.price_cents)
        .bind(subscription.subscriber_id.to_string())
        .bind(tier.price_cents)
        .execute(&mut *tx)
        .await
        .context("Failed to debit subscriber")?;

        if debited.rows_affected() == 0 {
            return Ok(PurchaseOutcome::InsufficientBalance);
        }

        sqlx::query("UPDATE users SET earnings_balance = earnings_balance + ? WHERE id = ?")
            .bind(earning.net_cents)
            .bind(tier.creator_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to credit creator earnings")?;

        sqlx::query(&format!(
            "INSERT INTO subscriptions ({}) VALUES (?, ?, ?, ?, ?, ?)",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription.id.to_string())
        .bind(subscription.subscriber_id.to_string())
        .bind(subscription.tier_id.to_string())
        .bind(ts(subscription.created_at))
        .bind(ts(subscription.expires_at))
        .bind(subscription.auto_renew)
        .execute(&mut *tx)
        .await
        .context("Failed to insert subscription")?;

        sqlx::query(
            r#"
            INSERT INTO creator_earnings (id, creator_id, subscription_id, gross_cents, fee_cents, net_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(earning.id.to_string())
        .bind(earning.creator_id.to_string())
        .bind(earning.subscription_id.map(|id| id.to_string()))
        .bind(earning.gross_cents)
        .bind(earning.fee_cents)
        .bind(earning.net_cents)
        .bind(ts(earning.created_at))
        .execute(&mut *tx)
        .await
        .context("Failed to record earning")?;

        tx.commit().await.context("Failed to commit purchase")?;
        Ok(PurchaseOutcome::Purchased)
    }

    /// Move one period's price from subscriber to creator and extend the expiry.
    ///
    /// `subscription` is the row as read by the sweep. The expiry is advanced only
    /// if the row still has that expiry and auto-renew on; otherwise nothing is
    /// written and `Skipped` is returned.
    pub async fn renew_subscription(
        &self,
        subscription: &Subscription,
        creator_id: UserId,
        price_cents: Cents,
    ) -> Result<RenewOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let extended = sqlx::query(
            "UPDATE subscriptions SET expires_at = ? WHERE id = ? AND expires_at = ? AND auto_renew = 1",
        )
        .bind(ts(subscription.next_expiry()))
        .bind(subscription.id.to_string())
        .bind(ts(subscription.expires_at))
        .execute(&mut *tx)
        .await
        .context("Failed to extend subscription")?;

        if extended.rows_affected() == 0 {
            return Ok(RenewOutcome::Skipped);
        }

        let debited = sqlx::query(
            "UPDATE users SET balance = balance - ? WHERE id = ? AND balance >= ?",
        )
        .bind(price_cents)
        .bind(subscription.subscriber_id.to_string())
        .bind(price_cents)
        .execute(&mut *tx)
        .await
        .context("Failed to debit subscriber")?;

        if debited.rows_affected() == 0 {
            return Ok(RenewOutcome::InsufficientBalance);
        }

        sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
            .bind(price_cents)
            .bind(creator_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to credit creator")?;

        tx.commit().await.context("Failed to commit renewal")?;
        Ok(RenewOutcome::Renewed)
    }

    /// Turn auto-renew off on an expired row the sweep could not charge.
    /// Returns false if the row changed since it was read.
    pub async fn disable_expired_auto_renew(&self, subscription: &Subscription) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET auto_renew = 0 WHERE id = ? AND expires_at = ? AND auto_renew = 1",
        )
        .bind(subscription.id.to_string())
        .bind(ts(subscription.expires_at))
        .execute(&self.pool)
        .await
        .context("Failed to disable auto-renew")?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a row that expired at or before `now` without auto-renew.
    /// Returns false if it was renewed, re-enabled or already removed.
    pub async fn delete_expired_subscription(
        &self,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM subscriptions WHERE id = ? AND expires_at <= ? AND auto_renew = 0",
        )
        .bind(id.to_string())
        .bind(ts(now))
        .execute(&self.pool)
        .await
        .context("Failed to delete expired subscription")?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_subscription(row: &SqliteRow) -> Result<Subscription> {
        let id_str: String = row.get("id");
        let subscriber_id_str: String = row.get("subscriber_id");
        let tier_id_str: String = row.get("tier_id");
        let created_at_str: String = row.get("created_at");
        let expires_at_str: String = row.get("expires_at");

        Ok(Subscription {
            id: parse_id(&id_str, "subscription ID")?,
            subscriber_id: parse_id(&subscriber_id_str, "subscriber ID")?,
            tier_id: parse_id(&tier_id_str, "tier ID")?,
            created_at: parse_ts(&created_at_str, "created_at")?,
            expires_at: parse_ts(&expires_at_str, "expires_at")?,
            auto_renew: row.get::<i64, _>("auto_renew") != 0,
        })
    }

    // ========================
    // Earnings operations
    // ========================

    /// Most recent earnings first.
    pub async fn list_earnings_for_creator(
        &self,
        creator_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<CreatorEarning>> {
        let mut query = String::from(
            "SELECT id, creator_id, subscription_id, gross_cents, fee_cents, net_cents, created_at FROM creator_earnings WHERE creator_id = ? ORDER BY created_at DESC",
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let rows = sqlx::query(&query)
            .bind(creator_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list earnings")?;

        rows.iter().map(Self::row_to_earning).collect()
    }

    pub async fn earnings_totals(&self, creator_id: UserId) -> Result<EarningsTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(gross_cents), 0) as gross,
                COALESCE(SUM(fee_cents), 0) as fee,
                COALESCE(SUM(net_cents), 0) as net,
                COUNT(*) as count
            FROM creator_earnings
            WHERE creator_id = ?
            "#,
        )
        .bind(creator_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum earnings")?;

        Ok(EarningsTotals {
            gross: row.get("gross"),
            fee: row.get("fee"),
            net: row.get("net"),
            count: row.get("count"),
        })
    }

    fn row_to_earning(row: &SqliteRow) -> Result<CreatorEarning> {
        let id_str: String = row.get("id");
        let creator_id_str: String = row.get("creator_id");
        let subscription_id_str: Option<String> = row.get("subscription_id");
        let created_at_str: String = row.get("created_at");

        Ok(CreatorEarning {
            id: parse_id(&id_str, "earning ID")?,
            creator_id: parse_id(&creator_id_str, "creator ID")?,
            subscription_id: subscription_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid subscription ID")?,
            gross_cents: row.get("gross_cents"),
            fee_cents: row.get("fee_cents"),
            net_cents: row.get("net_cents"),
            created_at: parse_ts(&created_at_str, "created_at")?,
        })
    }

    // ========================
    // Payout operations
    // ========================

    /// Insert a pending payout request and take the amount out of the user's
    /// earnings balance in the same transaction.
    ///
    /// The balance decrement is guarded in SQL and the one-pending rule is backed
    /// by a partial unique index, so concurrent submissions cannot overdraw or
    /// produce two pending requests.
    pub async fn insert_payout_request(
        &self,
        request: &PayoutRequest,
    ) -> Result<PayoutInsertOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let debited = sqlx::query(
            "UPDATE users SET earnings_balance = earnings_balance - ? WHERE id = ? AND earnings_balance >= ?",
        )
        .bind(request.amount_cents)
        .bind(request.user_id.to_string())
        .bind(request.amount_cents)
        .execute(&mut *tx)
        .await
        .context("Failed to debit earnings balance")?;

        if debited.rows_affected() == 0 {
            return Ok(PayoutInsertOutcome::InsufficientEarnings);
        }

        let inserted = sqlx::query(&format!(
            "INSERT INTO payout_requests ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PAYOUT_COLUMNS
        ))
        .bind(request.id.to_string())
        .bind(request.user_id.to_string())
        .bind(request.amount_cents)
        .bind(request.method.as_str())
        .bind(&request.eth_address)
        .bind(request.status.as_str())
        .bind(&request.admin_note)
        .bind(ts(request.created_at))
        .bind(request.processed_at.map(ts))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(PayoutInsertOutcome::PendingExists),
            Err(e) => {
                return Err(anyhow::Error::new(e).context("Failed to insert payout request"));
            }
        }

        tx.commit().await.context("Failed to commit payout request")?;
        Ok(PayoutInsertOutcome::Inserted)
    }

    pub async fn get_payout(&self, id: PayoutId) -> Result<Option<PayoutRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payout_requests WHERE id = ?",
            PAYOUT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch payout request")?;

        row.as_ref().map(Self::row_to_payout).transpose()
    }

    /// List payout requests, oldest first, optionally filtered by status.
    pub async fn list_payouts(&self, status: Option<PayoutStatus>) -> Result<Vec<PayoutRequest>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM payout_requests WHERE status = ? ORDER BY created_at",
                    PAYOUT_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM payout_requests ORDER BY created_at",
                    PAYOUT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list payout requests")?;

        rows.iter().map(Self::row_to_payout).collect()
    }

    /// A user's payout requests, newest first.
    pub async fn list_payouts_for_user(&self, user_id: UserId) -> Result<Vec<PayoutRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payout_requests WHERE user_id = ? ORDER BY created_at DESC",
            PAYOUT_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list payout requests for user")?;

        rows.iter().map(Self::row_to_payout).collect()
    }

    pub async fn get_pending_payout(&self, user_id: UserId) -> Result<Option<PayoutRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payout_requests WHERE user_id = ? AND status = 'pending'",
            PAYOUT_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch pending payout")?;

        row.as_ref().map(Self::row_to_payout).transpose()
    }

    /// Move a request from `from` to `to`. Returns false if the request was not in `from`.
    pub async fn update_payout_status(
        &self,
        id: PayoutId,
        from: PayoutStatus,
        to: PayoutStatus,
        admin_note: Option<&str>,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payout_requests
            SET status = ?, admin_note = COALESCE(?, admin_note), processed_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(admin_note)
        .bind(ts(processed_at))
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update payout status")?;

        Ok(result.rows_affected() > 0)
    }

    /// Reject a pending request and return its amount to the earnings balance.
    /// Returns false if the request was no longer pending.
    pub async fn reject_payout(
        &self,
        request: &PayoutRequest,
        admin_note: Option<&str>,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let updated = sqlx::query(
            r#"
            UPDATE payout_requests
            SET status = 'rejected', admin_note = COALESCE(?, admin_note), processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(admin_note)
        .bind(ts(processed_at))
        .bind(request.id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to reject payout")?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE users SET earnings_balance = earnings_balance + ? WHERE id = ?")
            .bind(request.amount_cents)
            .bind(request.user_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to refund earnings balance")?;

        tx.commit().await.context("Failed to commit rejection")?;
        Ok(true)
    }

    fn row_to_payout(row: &SqliteRow) -> Result<PayoutRequest> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let method_str: String = row.get("method");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let processed_at_str: Option<String> = row.get("processed_at");

        Ok(PayoutRequest {
            id: parse_id(&id_str, "payout ID")?,
            user_id: parse_id(&user_id_str, "user ID")?,
            amount_cents: row.get("amount_cents"),
            method: PayoutMethod::from_str(&method_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid payout method: {}", method_str))?,
            eth_address: row.get("eth_address"),
            status: PayoutStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid payout status: {}", status_str))?,
            admin_note: row.get("admin_note"),
            created_at: parse_ts(&created_at_str, "created_at")?,
            processed_at: processed_at_str
                .map(|s| parse_ts(&s, "processed_at"))
                .transpose()?,
        })
    }

    // ========================
    // Bank info operations
    // ========================

    pub async fn upsert_bank_info(&self, info: &BankInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bank_info (user_id, account_holder, bank_name, account_number, routing_number, swift_code, country, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                account_holder = excluded.account_holder,
                bank_name = excluded.bank_name,
                account_number = excluded.account_number,
                routing_number = excluded.routing_number,
                swift_code = excluded.swift_code,
                country = excluded.country,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(info.user_id.to_string())
        .bind(&info.account_holder)
        .bind(&info.bank_name)
        .bind(&info.account_number)
        .bind(&info.routing_number)
        .bind(&info.swift_code)
        .bind(&info.country)
        .bind(ts(info.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save bank info")?;
        Ok(())
    }

    pub async fn get_bank_info(&self, user_id: UserId) -> Result<Option<BankInfo>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, account_holder, bank_name, account_number, routing_number, swift_code, country, updated_at
            FROM bank_info
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bank info")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id_str: String = row.get("user_id");
        let updated_at_str: String = row.get("updated_at");

        Ok(Some(BankInfo {
            user_id: parse_id(&user_id_str, "user ID")?,
            account_holder: row.get("account_holder"),
            bank_name: row.get("bank_name"),
            account_number: row.get("account_number"),
            routing_number: row.get("routing_number"),
            swift_code: row.get("swift_code"),
            country: row.get("country"),
            updated_at: parse_ts(&updated_at_str, "updated_at")?,
        }))
    }

    /// Returns true if a record was removed.
    pub async fn delete_bank_info(&self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bank_info WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete bank info")?;
        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Maintenance
    // ========================

    /// Rebuild the database file to reclaim space.
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;
        Ok(())
    }
}
