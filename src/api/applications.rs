use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::{json_body, path_param, query_params, ApiState};
use crate::database::models::{
    Application, ApplicationFilter, ApplicationStatus, NewAsset, RequestType,
};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{require_admin, require_member, AuthUser};
use crate::services::application::{ApplicationDetail, CancelOutcome, SubmitApplication};
use crate::services::asset_binding::{AssetSpec, FulfillmentRequest, FulfillmentResult};

#[derive(Debug, Deserialize)]
pub struct ApplicationQuery {
    pub organization_id: Option<Uuid>,
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub organization_id: Uuid,
    pub request_type: RequestType,
    pub name: Option<String>,
    pub pixel_id: Option<String>,
    pub target_bm_id: Option<String>,
    pub requested_amount_cents: Option<i64>,
    #[serde(default)]
    pub metadata: JsonValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FulfillBody {
    #[serde(default)]
    pub asset_ids: Vec<Uuid>,
    #[serde(default)]
    pub assets: Vec<NewAsset>,
    pub spend_limit_cents: Option<i64>,
    pub fee_percentage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FulfillPixelBody {
    pub admin_user_id: Option<Uuid>,
}

/// POST /api/applications
pub async fn submit_application(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Application>)> {
    let body = json_body(payload)?;
    require_member(state.store.as_ref(), &user, body.organization_id).await?;

    let application = state
        .applications
        .submit(
            SubmitApplication {
                organization_id: body.organization_id,
                request_type: body.request_type,
                name: body.name,
                pixel_id: body.pixel_id,
                target_bm_id: body.target_bm_id,
                requested_amount_cents: body.requested_amount_cents,
                metadata: body.metadata,
            },
            user.id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// GET /api/applications
pub async fn list_applications(
    State(state): State<ApiState>,
    user: AuthUser,
    query: Result<Query<ApplicationQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Application>>> {
    let query = query_params(query)?;
    let organization_id = query
        .organization_id
        .ok_or_else(|| AppError::missing_field("organization_id"))?;
    require_member(state.store.as_ref(), &user, organization_id).await?;

    let applications = state
        .applications
        .list(ApplicationFilter {
            organization_id: Some(organization_id),
            status: query.status,
        })
        .await?;
    Ok(Json(applications))
}

/// GET /api/applications/{id}
pub async fn get_application(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApplicationDetail>> {
    let id = path_param(id)?;
    let detail = state.applications.detail(id).await?;
    require_member(state.store.as_ref(), &user, detail.application.organization_id).await?;
    Ok(Json(detail))
}

/// POST /api/applications/{id}/cancel
pub async fn cancel_application(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<CancelOutcome>> {
    let id = path_param(id)?;
    let application = state.applications.get(id).await?;
    require_member(state.store.as_ref(), &user, application.organization_id).await?;

    Ok(Json(state.applications.cancel(id, user.id).await?))
}

/// GET /api/admin/applications
pub async fn admin_list_applications(
    State(state): State<ApiState>,
    user: AuthUser,
    query: Result<Query<ApplicationQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Application>>> {
    let query = query_params(query)?;
    require_admin(state.store.as_ref(), &user).await?;

    let applications = state
        .applications
        .list(ApplicationFilter {
            organization_id: query.organization_id,
            status: query.status,
        })
        .await?;
    Ok(Json(applications))
}

/// POST /api/admin/applications/{id}/approve
pub async fn approve(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Application>> {
    let id = path_param(id)?;
    require_admin(state.store.as_ref(), &user).await?;
    Ok(Json(state.applications.approve(id, user.id).await?))
}

/// POST /api/admin/applications/{id}/mark-ready
pub async fn mark_ready(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Application>> {
    let id = path_param(id)?;
    require_admin(state.store.as_ref(), &user).await?;
    Ok(Json(state.applications.mark_ready(id, user.id).await?))
}

/// POST /api/admin/applications/{id}/reject
pub async fn reject(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Option<Json<RejectBody>>,
) -> AppResult<Json<Application>> {
    let id = path_param(id)?;
    require_admin(state.store.as_ref(), &user).await?;
    let body = payload.map(|Json(body)| body).unwrap_or_default();

    Ok(Json(state.applications.reject(id, user.id, body.reason).await?))
}

/// POST /api/admin/applications/{id}/fulfill
pub async fn fulfill(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<FulfillBody>, JsonRejection>,
) -> AppResult<Json<FulfillmentResult>> {
    let id = path_param(id)?;
    let body = json_body(payload)?;
    require_admin(state.store.as_ref(), &user).await?;

    let assets = body
        .asset_ids
        .into_iter()
        .map(AssetSpec::Existing)
        .chain(body.assets.into_iter().map(AssetSpec::New))
        .collect();

    let result = state
        .reconciler
        .fulfill(FulfillmentRequest {
            application_id: id,
            expected_types: vec![RequestType::NewBusinessManager, RequestType::AdAccount],
            organization_id: None,
            assets,
            fulfilled_by: user.id,
            spend_limit_cents: body.spend_limit_cents,
            fee_percentage: body.fee_percentage,
        })
        .await?;
    Ok(Json(result))
}

/// POST /api/admin/applications/{id}/fulfill-pixel
pub async fn fulfill_pixel(
    State(state): State<ApiState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Option<Json<FulfillPixelBody>>,
) -> AppResult<Json<FulfillmentResult>> {
    let id = path_param(id)?;
    require_admin(state.store.as_ref(), &user).await?;
    let body = payload.map(|Json(body)| body).unwrap_or_default();

    let fulfiller = match body.admin_user_id {
        Some(admin_id) if admin_id != user.id => {
            if !state.store.is_admin(admin_id).await? {
                return Err(AppError::invalid_field("admin_user_id", "user is not an admin"));
            }
            admin_id
        }
        _ => user.id,
    };

    Ok(Json(state.reconciler.fulfill_pixel(id, fulfiller).await?))
}
