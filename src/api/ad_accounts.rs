use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{query_params, ApiState};
use crate::database::models::{AdAccountQuery, AdAccountRow};
use crate::error::AppResult;
use crate::middleware::auth::{require_admin, require_member, AuthUser};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct AdAccountsParams {
    pub organization_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub business_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdAccountsResponse {
    pub accounts: Vec<AdAccountRow>,
    pub pagination: Pagination,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// GET /api/ad-accounts
pub async fn list_ad_accounts(
    State(state): State<ApiState>,
    user: AuthUser,
    params: Result<Query<AdAccountsParams>, QueryRejection>,
) -> AppResult<Json<AdAccountsResponse>> {
    let params = query_params(params)?;
    match params.organization_id {
        Some(organization_id) => {
            require_member(state.store.as_ref(), &user, organization_id).await?;
        }
        None => require_admin(state.store.as_ref(), &user).await?,
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let result = state
        .store
        .list_ad_accounts(&AdAccountQuery {
            organization_id: params.organization_id,
            status: non_empty(params.status),
            business_id: non_empty(params.business_id),
            search: non_empty(params.search),
            page,
            limit,
        })
        .await?;

    Ok(Json(AdAccountsResponse {
        accounts: result.items,
        pagination: Pagination::new(page, limit, result.total),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).total_pages, 1);
        assert_eq!(Pagination::new(2, 20, 41).total_pages, 3);
    }

    #[test]
    fn blank_filters_are_dropped() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" act_1 ".to_string())), Some("act_1".to_string()));
    }
}
