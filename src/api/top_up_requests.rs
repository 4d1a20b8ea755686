use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{json_body, path_param, query_params, ApiState};
use crate::database::models::{TopUpRequest, TopUpStatus};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{require_admin, require_member, AuthUser};
use crate::services::top_up::{CreateTopUp, ReviewTopUp};

#[derive(Debug, Deserialize)]
pub struct TopUpQuery {
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTopUpBody {
    pub organization_id: Option<Uuid>,
    pub ad_account_id: Option<Uuid>,
    /// Minor currency units.
    pub amount: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewTopUpBody {
    pub status: TopUpStatus,
    pub approved_amount: Option<i64>,
    pub admin_notes: Option<String>,
}

/// GET /api/top-up-requests
pub async fn list_requests(
    State(state): State<ApiState>,
    user: AuthUser,
    query: Result<Query<TopUpQuery>, QueryRejection>,
) -> AppResult<Json<Vec<TopUpRequest>>> {
    let query = query_params(query)?;
    match query.organization_id {
        Some(organization_id) => {
            require_member(state.store.as_ref(), &user, organization_id).await?;
        }
        None => require_admin(state.store.as_ref(), &user).await?,
    }

    Ok(Json(state.top_ups.list(query.organization_id).await?))
}

/// POST /api/top-up-requests
pub async fn create_request(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<CreateTopUpBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TopUpRequest>)> {
    let body = json_body(payload)?;
    let organization_id = body
        .organization_id
        .ok_or_else(|| AppError::missing_field("organization_id"))?;
    let ad_account_id = body
        .ad_account_id
        .ok_or_else(|| AppError::missing_field("ad_account_id"))?;
    let amount_cents = body.amount.ok_or_else(|| AppError::missing_field("amount"))?;

    require_member(state.store.as_ref(), &user, organization_id).await?;

    let request = state
        .top_ups
        .create(
            CreateTopUp {
                organization_id,
                ad_account_id,
                amount_cents,
                notes: body.notes,
            },
            user.id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// PATCH /api/topup-requests/{id}
pub async fn review_request(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ReviewTopUpBody>, JsonRejection>,
) -> AppResult<Json<TopUpRequest>> {
    let id = path_param(id)?;
    let body = json_body(payload)?;
    require_admin(state.store.as_ref(), &user).await?;

    let request = state
        .top_ups
        .review(
            id,
            ReviewTopUp {
                status: body.status,
                approved_amount_cents: body.approved_amount,
                admin_notes: body.admin_notes,
            },
            user.id,
        )
        .await?;
    Ok(Json(request))
}
