//! Asset binding reconciliation.
//!
//! Turns fulfilled applications into active `asset_binding` rows. A whole
//! fulfillment (asset upserts, binding upserts, audit rows and the application
//! status change) runs in one store transaction, so it either lands completely
//! or not at all.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::database::models::{
    Application, ApplicationAction, ApplicationFulfillment, ApplicationStatus,
    ApplicationStatusChange, Asset, AssetBinding, AssetType, BindingUpsert, NewAsset, NewBinding,
    RequestType,
};
use crate::database::{LedgerStore, LedgerTx};
use crate::error::{AppError, AppResult};

/// Asset to bind: one already in the catalogue or one to create on the fly.
#[derive(Debug, Clone)]
pub enum AssetSpec {
    Existing(Uuid),
    New(NewAsset),
}

#[derive(Debug, Clone)]
pub struct FulfillmentRequest {
    pub application_id: Uuid,
    /// Request types this fulfillment path accepts.
    pub expected_types: Vec<RequestType>,
    /// When given, must match the application's organization.
    pub organization_id: Option<Uuid>,
    pub assets: Vec<AssetSpec>,
    pub fulfilled_by: Uuid,
    pub spend_limit_cents: Option<i64>,
    pub fee_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FulfillmentResult {
    pub application: Application,
    pub assets: Vec<Asset>,
    pub bindings: Vec<AssetBinding>,
    pub fulfillments: Vec<ApplicationFulfillment>,
}

#[derive(Debug, Clone)]
pub struct BindRequest {
    pub asset_id: Uuid,
    pub organization_id: Uuid,
    pub bound_by: Option<Uuid>,
    pub spend_limit_cents: Option<i64>,
    pub fee_percentage: Option<f64>,
}

pub struct AssetBindingReconciler {
    store: Arc<dyn LedgerStore>,
}

impl AssetBindingReconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn fulfill(&self, request: FulfillmentRequest) -> AppResult<FulfillmentResult> {
        let application_id = request.application_id;
        let mut tx = self.store.begin().await?;

        let result = match fulfill_in(tx.as_mut(), request).await {
            Ok(result) => result,
            Err(err) => {
                error!(application_id = %application_id, error = %err, "fulfillment rolled back");
                return Err(err);
            }
        };

        tx.commit().await.map_err(|err| {
            error!(application_id = %application_id, error = %err, "fulfillment commit failed");
            AppError::from(err)
        })?;

        info!(
            application_id = %application_id,
            organization_id = %result.application.organization_id,
            bindings = result.bindings.len(),
            "application fulfilled"
        );
        Ok(result)
    }

    /// Fulfil a pixel-connection application by creating the pixel asset it names.
    pub async fn fulfill_pixel(
        &self,
        application_id: Uuid,
        fulfilled_by: Uuid,
    ) -> AppResult<FulfillmentResult> {
        let application = self
            .store
            .find_application(application_id)
            .await?
            .ok_or_else(|| AppError::not_found("application", application_id))?;

        if application.request_type != RequestType::PixelConnection {
            return Err(AppError::invalid_state(
                "application",
                application.request_type,
                "fulfill as pixel connection",
            ));
        }

        let pixel_id = application
            .pixel_id
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::missing_field("pixel_id"))?;

        let asset = NewAsset {
            r#type: AssetType::Pixel,
            dolphin_id: pixel_id.clone(),
            name: application
                .name
                .clone()
                .unwrap_or_else(|| format!("Pixel {}", pixel_id)),
            status: "active".to_string(),
            metadata: serde_json::json!({
                "pixel_id": pixel_id,
                "business_manager_id": application.target_bm_id,
            }),
        };

        self.fulfill(FulfillmentRequest {
            application_id,
            expected_types: vec![RequestType::PixelConnection],
            organization_id: Some(application.organization_id),
            assets: vec![AssetSpec::New(asset)],
            fulfilled_by,
            spend_limit_cents: None,
            fee_percentage: None,
        })
        .await
    }

    /// Bind an asset to an organization; binding an already bound pair re-activates it.
    pub async fn bind(&self, request: BindRequest) -> AppResult<BindingUpsert> {
        let mut tx = self.store.begin().await?;

        if tx.find_asset(request.asset_id).await?.is_none() {
            return Err(AppError::not_found("asset", request.asset_id));
        }
        let fee_percentage = match request.fee_percentage {
            Some(fee) => Some(fee),
            None => default_fee(tx.as_mut(), request.organization_id).await?,
        };

        let upsert = tx
            .upsert_binding(NewBinding {
                asset_id: request.asset_id,
                organization_id: request.organization_id,
                spend_limit_cents: request.spend_limit_cents,
                fee_percentage,
                bound_by: request.bound_by,
            })
            .await?;
        tx.commit().await?;

        info!(
            asset_id = %request.asset_id,
            organization_id = %request.organization_id,
            created = upsert.created,
            "asset bound"
        );
        Ok(upsert)
    }

    /// Delete the binding for the pair.
    pub async fn unbind(&self, asset_id: Uuid, organization_id: Uuid) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_binding(asset_id, organization_id).await? {
            return Err(AppError::not_found(
                "asset_binding",
                format!("{}/{}", asset_id, organization_id),
            ));
        }
        tx.commit().await?;

        info!(asset_id = %asset_id, organization_id = %organization_id, "asset unbound");
        Ok(())
    }
}

async fn fulfill_in(
    tx: &mut dyn LedgerTx,
    request: FulfillmentRequest,
) -> AppResult<FulfillmentResult> {
    let application = tx
        .lock_application(request.application_id)
        .await?
        .ok_or_else(|| AppError::not_found("application", request.application_id))?;

    if !request.expected_types.contains(&application.request_type) {
        return Err(AppError::invalid_state(
            "application",
            application.request_type,
            "fulfill",
        ));
    }
    if let Some(organization_id) = request.organization_id {
        if organization_id != application.organization_id {
            return Err(AppError::invalid_field(
                "business_id",
                "does not match the application's organization",
            ));
        }
    }
    let next = application
        .status
        .transition(ApplicationAction::Fulfill)
        .ok_or_else(|| AppError::invalid_state("application", application.status, "fulfill"))?;
    if request.assets.is_empty() {
        return Err(AppError::missing_field("assets"));
    }

    let organization_id = application.organization_id;
    let fee_percentage = match request.fee_percentage {
        Some(fee) => Some(fee),
        None => default_fee(tx, organization_id).await?,
    };

    let mut assets = Vec::with_capacity(request.assets.len());
    let mut bindings = Vec::with_capacity(request.assets.len());
    let mut fulfillments = Vec::with_capacity(request.assets.len());

    for spec in request.assets {
        let asset = match spec {
            AssetSpec::Existing(asset_id) => tx
                .find_asset(asset_id)
                .await?
                .ok_or_else(|| AppError::not_found("asset", asset_id))?,
            AssetSpec::New(new_asset) => tx.upsert_asset(new_asset).await?,
        };

        let upsert = tx
            .upsert_binding(NewBinding {
                asset_id: asset.id,
                organization_id,
                spend_limit_cents: request.spend_limit_cents,
                fee_percentage,
                bound_by: Some(request.fulfilled_by),
            })
            .await?;
        let fulfillment = tx
            .insert_fulfillment(application.id, asset.id, request.fulfilled_by)
            .await?;

        assets.push(asset);
        bindings.push(upsert.binding);
        fulfillments.push(fulfillment);
    }

    debug_assert_eq!(next, ApplicationStatus::Fulfilled);
    let application = tx
        .update_application_status(
            application.id,
            ApplicationStatusChange {
                status: next,
                actor: request.fulfilled_by,
                reason: None,
            },
        )
        .await?;

    Ok(FulfillmentResult {
        application,
        assets,
        bindings,
        fulfillments,
    })
}

/// The organization plan's ad-spend fee, when it has a plan.
async fn default_fee(tx: &mut dyn LedgerTx, organization_id: Uuid) -> AppResult<Option<f64>> {
    let organization = tx
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization", organization_id))?;

    let Some(plan_id) = organization.plan_id else {
        return Ok(None);
    };
    Ok(tx
        .find_plan(&plan_id)
        .await?
        .map(|plan| plan.ad_spend_fee_percentage))
}
