//! Application lifecycle.
//!
//! Every status change locks the application row and is checked against
//! `ApplicationStatus::transition`; anything outside the allowed set is an
//! `InvalidState` error. Fulfillment lives in the asset binding reconciler.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{
    Application, ApplicationAction, ApplicationFilter, ApplicationFulfillment, ApplicationStatus,
    ApplicationStatusChange, NewApplication, RequestType,
};
use crate::database::LedgerStore;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct SubmitApplication {
    pub organization_id: Uuid,
    pub request_type: RequestType,
    pub name: Option<String>,
    pub pixel_id: Option<String>,
    pub target_bm_id: Option<String>,
    pub requested_amount_cents: Option<i64>,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled { application: Application },
    /// Rejected applications are removed instead of cancelled.
    Deleted { id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub fulfillments: Vec<ApplicationFulfillment>,
}

pub struct ApplicationService {
    store: Arc<dyn LedgerStore>,
}

impl ApplicationService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, request: SubmitApplication, created_by: Uuid) -> AppResult<Application> {
        if request.request_type == RequestType::PixelConnection
            && request.pixel_id.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(AppError::missing_field("pixel_id"));
        }
        if let Some(amount) = request.requested_amount_cents {
            if amount < 0 {
                return Err(AppError::invalid_amount(amount, "amount cannot be negative"));
            }
        }

        let mut tx = self.store.begin().await?;
        if tx.find_organization(request.organization_id).await?.is_none() {
            return Err(AppError::not_found("organization", request.organization_id));
        }

        let application = tx
            .insert_application(NewApplication {
                organization_id: request.organization_id,
                request_type: request.request_type,
                name: request.name,
                pixel_id: request.pixel_id,
                target_bm_id: request.target_bm_id,
                requested_amount_cents: request.requested_amount_cents,
                metadata: match request.metadata {
                    JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
                    other => other,
                },
                created_by,
            })
            .await?;
        tx.commit().await?;

        info!(
            application_id = %application.id,
            organization_id = %application.organization_id,
            request_type = %application.request_type,
            "application submitted"
        );
        Ok(application)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Application> {
        self.store
            .find_application(id)
            .await?
            .ok_or_else(|| AppError::not_found("application", id))
    }

    pub async fn detail(&self, id: Uuid) -> AppResult<ApplicationDetail> {
        let application = self.get(id).await?;
        let fulfillments = self.store.list_fulfillments(id).await?;
        Ok(ApplicationDetail {
            application,
            fulfillments,
        })
    }

    pub async fn list(&self, filter: ApplicationFilter) -> AppResult<Vec<Application>> {
        Ok(self.store.list_applications(&filter).await?)
    }

    pub async fn approve(&self, id: Uuid, admin_id: Uuid) -> AppResult<Application> {
        self.apply(id, ApplicationAction::Approve, admin_id, None).await
    }

    pub async fn mark_ready(&self, id: Uuid, admin_id: Uuid) -> AppResult<Application> {
        self.apply(id, ApplicationAction::MarkReady, admin_id, None).await
    }

    pub async fn reject(
        &self,
        id: Uuid,
        admin_id: Uuid,
        reason: Option<String>,
    ) -> AppResult<Application> {
        self.apply(id, ApplicationAction::Reject, admin_id, reason).await
    }

    pub async fn cancel(&self, id: Uuid, actor: Uuid) -> AppResult<CancelOutcome> {
        let mut tx = self.store.begin().await?;
        let application = tx
            .lock_application(id)
            .await?
            .ok_or_else(|| AppError::not_found("application", id))?;

        if application.status == ApplicationStatus::Rejected {
            tx.delete_application(id).await?;
            tx.commit().await?;
            info!(application_id = %id, "rejected application deleted");
            return Ok(CancelOutcome::Deleted { id });
        }

        let next = application
            .status
            .transition(ApplicationAction::Cancel)
            .ok_or_else(|| AppError::invalid_state("application", application.status, "cancel"))?;
        let application = tx
            .update_application_status(
                id,
                ApplicationStatusChange {
                    status: next,
                    actor,
                    reason: None,
                },
            )
            .await?;
        tx.commit().await?;

        info!(application_id = %id, "application cancelled");
        Ok(CancelOutcome::Cancelled { application })
    }

    async fn apply(
        &self,
        id: Uuid,
        action: ApplicationAction,
        actor: Uuid,
        reason: Option<String>,
    ) -> AppResult<Application> {
        let mut tx = self.store.begin().await?;
        let application = tx
            .lock_application(id)
            .await?
            .ok_or_else(|| AppError::not_found("application", id))?;

        let from = application.status;
        let next = from
            .transition(action)
            .ok_or_else(|| AppError::invalid_state("application", from, action))?;

        let application = tx
            .update_application_status(
                id,
                ApplicationStatusChange {
                    status: next,
                    actor,
                    reason,
                },
            )
            .await?;
        tx.commit().await?;

        info!(
            application_id = %id,
            from = %from,
            to = %next,
            actor = %actor,
            "application status changed"
        );
        Ok(application)
    }
}
