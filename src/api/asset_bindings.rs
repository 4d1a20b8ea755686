//! Admin binding endpoints.
//!
//! `POST` accepts either a simple bind (`asset_id` + `business_id`) or a
//! fulfillment bind (`application_id` + `business_id` and the assets to hand
//! over). `business_id` is the organization id.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::{json_body, ApiState};
use crate::database::models::RequestType;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{require_admin, AuthUser};
use crate::services::asset_binding::{AssetSpec, BindRequest, FulfillmentRequest};

#[derive(Debug, Deserialize)]
pub struct BindBody {
    pub business_id: Option<Uuid>,
    pub asset_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub business_manager_id: Option<Uuid>,
    #[serde(default)]
    pub ad_account_ids: Vec<Uuid>,
    pub spend_limit_cents: Option<i64>,
    pub fee_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UnbindBody {
    pub asset_id: Uuid,
    pub business_id: Uuid,
}

/// POST /api/admin/asset-bindings
pub async fn bind(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<BindBody>, JsonRejection>,
) -> AppResult<Response> {
    let body = json_body(payload)?;
    require_admin(state.store.as_ref(), &user).await?;

    let organization_id = body
        .business_id
        .ok_or_else(|| AppError::missing_field("business_id"))?;

    if let Some(application_id) = body.application_id {
        let assets: Vec<AssetSpec> = body
            .business_manager_id
            .into_iter()
            .chain(body.ad_account_ids)
            .map(AssetSpec::Existing)
            .collect();

        let result = state
            .reconciler
            .fulfill(FulfillmentRequest {
                application_id,
                expected_types: vec![RequestType::NewBusinessManager, RequestType::AdAccount],
                organization_id: Some(organization_id),
                assets,
                fulfilled_by: user.id,
                spend_limit_cents: body.spend_limit_cents,
                fee_percentage: body.fee_percentage,
            })
            .await?;
        return Ok(Json(result).into_response());
    }

    let asset_id = body
        .asset_id
        .ok_or_else(|| AppError::missing_field("asset_id"))?;
    let upsert = state
        .reconciler
        .bind(BindRequest {
            asset_id,
            organization_id,
            bound_by: Some(user.id),
            spend_limit_cents: body.spend_limit_cents,
            fee_percentage: body.fee_percentage,
        })
        .await?;

    let status = if upsert.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(upsert.binding)).into_response())
}

/// DELETE /api/admin/asset-bindings
pub async fn unbind(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<UnbindBody>, JsonRejection>,
) -> AppResult<Json<serde_json::Value>> {
    let body = json_body(payload)?;
    require_admin(state.store.as_ref(), &user).await?;

    state.reconciler.unbind(body.asset_id, body.business_id).await?;
    Ok(Json(json!({ "success": true })))
}
