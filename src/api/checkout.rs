use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::api::{json_body, ApiState};
use crate::error::AppResult;
use crate::middleware::auth::{require_member, AuthUser};
use crate::payments::types::ProviderName;
use crate::services::checkout::{CheckoutResponse, WalletCheckout};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCheckoutBody {
    pub plan_id: String,
    pub organization_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WalletCheckoutBody {
    pub organization_id: Uuid,
    /// Wallet credit in major units, before fees.
    pub amount: Decimal,
    pub provider: Option<String>,
}

/// POST /api/subscriptions/checkout
pub async fn subscription_checkout(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<SubscriptionCheckoutBody>, JsonRejection>,
) -> AppResult<Json<SubscriptionCheckoutResponse>> {
    let body = json_body(payload)?;
    require_member(state.store.as_ref(), &user, body.organization_id).await?;

    let session = state
        .checkout
        .subscribe(&body.plan_id, body.organization_id, user.email.clone())
        .await?;
    Ok(Json(SubscriptionCheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

/// POST /api/payments/checkout
pub async fn wallet_checkout(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<WalletCheckoutBody>, JsonRejection>,
) -> AppResult<Json<CheckoutResponse>> {
    let body = json_body(payload)?;
    require_member(state.store.as_ref(), &user, body.organization_id).await?;

    let provider = body
        .provider
        .as_deref()
        .map(ProviderName::from_str)
        .transpose()?;

    let session = state
        .checkout
        .fund_wallet(WalletCheckout {
            organization_id: body.organization_id,
            amount: body.amount,
            provider,
            customer_email: user.email.clone(),
        })
        .await?;
    Ok(Json(session))
}
