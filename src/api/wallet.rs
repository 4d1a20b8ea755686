use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use crate::api::{json_body, query_params, ApiState};
use crate::database::models::{Transaction, TransactionType, Wallet};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{require_admin, require_member, AuthUser};
use crate::services::wallet::{to_cents, LedgerEntry, RecordTransaction};

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub organization_id: Uuid,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    #[serde(flatten)]
    pub wallet: Wallet,
    /// Balance in major units, e.g. "125.50".
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransactionBody {
    pub organization_id: Uuid,
    /// Major currency units.
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub description: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// GET /api/wallet
pub async fn get_wallet(
    State(state): State<ApiState>,
    user: AuthUser,
    query: Result<Query<WalletQuery>, QueryRejection>,
) -> AppResult<Json<WalletResponse>> {
    let query = query_params(query)?;
    require_member(state.store.as_ref(), &user, query.organization_id).await?;

    let wallet = state.wallet.balance(query.organization_id).await?;
    Ok(Json(WalletResponse {
        balance: Decimal::new(wallet.balance_cents, 2),
        wallet,
    }))
}

/// GET /api/wallet/transactions
pub async fn list_transactions(
    State(state): State<ApiState>,
    user: AuthUser,
    query: Result<Query<WalletQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Transaction>>> {
    let query = query_params(query)?;
    require_member(state.store.as_ref(), &user, query.organization_id).await?;

    let transactions = state
        .wallet
        .transactions(query.organization_id, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(transactions))
}

/// POST /api/wallet/transactions
///
/// Members may record debits; credits are reserved for admins.
pub async fn create_transaction(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<TransactionBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<LedgerEntry>)> {
    let body = json_body(payload)?;
    let admin = require_member(state.store.as_ref(), &user, body.organization_id).await?;
    if body.kind.is_credit() && !admin {
        return Err(user.tag(AppError::forbidden(format!(
            "only admins may record {} transactions",
            body.kind
        ))));
    }

    record(&state, &user, body).await
}

/// POST /api/admin/transactions
pub async fn admin_create_transaction(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<TransactionBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<LedgerEntry>)> {
    let body = json_body(payload)?;
    require_admin(state.store.as_ref(), &user).await?;

    record(&state, &user, body).await
}

async fn record(
    state: &ApiState,
    user: &AuthUser,
    body: TransactionBody,
) -> AppResult<(StatusCode, Json<LedgerEntry>)> {
    let amount_cents = to_cents(body.amount)?;
    let mut metadata = match body.metadata {
        Some(JsonValue::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    metadata.insert("recorded_by".to_string(), JsonValue::String(user.id.to_string()));

    let entry = state
        .wallet
        .record(RecordTransaction {
            organization_id: body.organization_id,
            r#type: body.kind,
            amount_cents,
            description: body.description,
            metadata: JsonValue::Object(metadata),
        })
        .await?;

    info!(
        organization_id = %body.organization_id,
        user_id = %user.id,
        kind = %body.kind,
        amount_cents,
        "transaction recorded"
    );
    Ok((StatusCode::CREATED, Json(entry)))
}
