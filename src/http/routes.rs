use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{AppError, EarningsSummary, RenewalReport, SubscriptionInfo};
use crate::domain::{
    BankInfo, BankInfoInput, Cents, PayoutMethod, PayoutRequest, PayoutStatus, Subscription,
    SubscriptionTier, User, parse_cents,
};

use super::AppState;
use super::auth::{AdminUser, CurrentUser};

type AppResult<T> = Result<T, AppError>;

/// A money amount sent either as a decimal string ("150.00") or a JSON number (150.5).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MoneyInput {
    Text(String),
    Number(serde_json::Number),
}

impl MoneyInput {
    fn to_cents(&self) -> AppResult<Cents> {
        let text = match self {
            MoneyInput::Text(s) => s.clone(),
            MoneyInput::Number(n) => n.to_string(),
        };
        parse_cents(&text).map_err(|e| AppError::InvalidAmount(format!("{}: {}", text, e)))
    }
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

// ========================
// Tiers
// ========================

pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<SubscriptionTier>>> {
    Ok(Json(state.service.list_tiers(&username).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateTierBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: MoneyInput,
}

pub async fn create_tier(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateTierBody>,
) -> AppResult<impl IntoResponse> {
    let price = body.price.to_cents()?;
    let tier = state
        .service
        .create_tier(&user, body.name, body.description, price)
        .await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

// ========================
// Subscriptions
// ========================

pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<SubscriptionInfo>>> {
    Ok(Json(state.service.list_subscriptions(&user).await?))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
    pub tier_id: Uuid,
    #[serde(default = "default_true")]
    pub auto_renew: bool,
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<SubscribeBody>,
) -> AppResult<impl IntoResponse> {
    let subscription = state
        .service
        .subscribe(&user, body.tier_id, body.auto_renew)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

#[derive(Debug, Deserialize)]
pub struct AutoRenewBody {
    pub auto_renew: bool,
}

pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AutoRenewBody>,
) -> AppResult<Json<Subscription>> {
    Ok(Json(
        state
            .service
            .set_auto_renew(&user, id, body.auto_renew)
            .await?,
    ))
}

// ========================
// Earnings and bank info
// ========================

pub async fn earnings(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<EarningsSummary>> {
    Ok(Json(state.service.earnings_summary(&user).await?))
}

/// Bank details as returned to clients; the account number is masked.
#[derive(Debug, Serialize)]
pub struct BankInfoView {
    pub account_holder: String,
    pub bank_name: String,
    pub account_number: String,
    pub routing_number: String,
    pub swift_code: Option<String>,
    pub country: String,
    pub updated_at: DateTime<Utc>,
}

impl From<BankInfo> for BankInfoView {
    fn from(info: BankInfo) -> Self {
        Self {
            account_number: info.masked_account_number(),
            account_holder: info.account_holder,
            bank_name: info.bank_name,
            routing_number: info.routing_number,
            swift_code: info.swift_code,
            country: info.country,
            updated_at: info.updated_at,
        }
    }
}

pub async fn get_bank_info(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<BankInfoView>> {
    Ok(Json(state.service.get_bank_info(&user).await?.into()))
}

pub async fn put_bank_info(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<BankInfoInput>,
) -> AppResult<Json<BankInfoView>> {
    Ok(Json(state.service.save_bank_info(&user, body).await?.into()))
}

pub async fn delete_bank_info(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    state.service.delete_bank_info(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================
// Payouts
// ========================

pub async fn list_payouts(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<PayoutRequest>>> {
    Ok(Json(state.service.list_user_payouts(&user).await?))
}

#[derive(Debug, Deserialize)]
pub struct PayoutBody {
    pub amount: MoneyInput,
    pub method: PayoutMethod,
    #[serde(default)]
    pub eth_address: Option<String>,
}

pub async fn request_payout(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<PayoutBody>,
) -> AppResult<impl IntoResponse> {
    let amount = body.amount.to_cents()?;
    let request = state
        .service
        .request_payout(&user, amount, body.method, body.eth_address)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

// ========================
// Admin
// ========================

#[derive(Debug, Deserialize)]
pub struct PayoutFilter {
    pub status: Option<String>,
}

pub async fn admin_list_payouts(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<PayoutFilter>,
) -> AppResult<Json<Vec<PayoutRequest>>> {
    let status = filter
        .status
        .map(|s| {
            PayoutStatus::from_str(&s)
                .ok_or_else(|| AppError::InvalidInput(format!("unknown payout status '{}'", s)))
        })
        .transpose()?;
    Ok(Json(state.service.list_payouts(status).await?))
}

/// Body for admin payout transitions. Send `{}` when there is no note.
#[derive(Debug, Default, Deserialize)]
pub struct TransitionBody {
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn approve_payout(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TransitionBody>,
) -> AppResult<Json<PayoutRequest>> {
    tracing::info!(admin = %admin.username, payout = %id, "approving payout");
    Ok(Json(state.service.approve_payout(id, body.note).await?))
}

pub async fn reject_payout(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TransitionBody>,
) -> AppResult<Json<PayoutRequest>> {
    tracing::info!(admin = %admin.username, payout = %id, "rejecting payout");
    Ok(Json(state.service.reject_payout(id, body.note).await?))
}

pub async fn complete_payout(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TransitionBody>,
) -> AppResult<Json<PayoutRequest>> {
    tracing::info!(admin = %admin.username, payout = %id, "completing payout");
    Ok(Json(state.service.complete_payout(id, body.note).await?))
}

pub async fn run_renewals(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<RenewalReport>> {
    tracing::info!(admin = %admin.username, "renewal sweep requested");
    Ok(Json(
        state.service.renew_expired_subscriptions(Utc::now()).await?,
    ))
}
