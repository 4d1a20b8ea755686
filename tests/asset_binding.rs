mod common;

use std::sync::Arc;

use adhub_backend::database::models::{
    ApplicationStatus, AssetType, BindingStatus, NewAsset, RequestType,
};
use adhub_backend::database::{FailPoint, LedgerStore};
use adhub_backend::error::ErrorCode;
use adhub_backend::services::{
    ApplicationService, AssetBindingReconciler, AssetSpec, BindRequest, FulfillmentRequest,
    SubmitApplication,
};
use common::Fixture;
use serde_json::json;
use uuid::Uuid;

async fn processing_application(fixture: &Fixture, request_type: RequestType) -> Uuid {
    let applications = ApplicationService::new(fixture.shared());
    let application = applications
        .submit(
            SubmitApplication {
                organization_id: fixture.organization_id,
                request_type,
                name: Some("Main pixel".to_string()),
                pixel_id: Some("px_991".to_string()),
                target_bm_id: Some("bm_42".to_string()),
                requested_amount_cents: None,
                metadata: json!({}),
            },
            fixture.owner_id,
        )
        .await
        .unwrap();
    applications
        .approve(application.id, fixture.admin_id)
        .await
        .unwrap();
    application.id
}

fn fulfillment(fixture: &Fixture, application_id: Uuid, assets: Vec<AssetSpec>) -> FulfillmentRequest {
    FulfillmentRequest {
        application_id,
        expected_types: vec![RequestType::NewBusinessManager, RequestType::AdAccount],
        organization_id: Some(fixture.organization_id),
        assets,
        fulfilled_by: fixture.admin_id,
        spend_limit_cents: None,
        fee_percentage: None,
    }
}

#[tokio::test]
async fn fulfilling_twice_leaves_one_active_binding() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let asset_id = fixture.ad_account("act_100");
    let application_id = processing_application(&fixture, RequestType::AdAccount).await;

    let result = reconciler
        .fulfill(fulfillment(&fixture, application_id, vec![AssetSpec::Existing(asset_id)]))
        .await
        .unwrap();
    assert_eq!(result.application.status, ApplicationStatus::Fulfilled);
    assert_eq!(result.bindings.len(), 1);
    assert_eq!(result.fulfillments.len(), 1);

    let err = reconciler
        .fulfill(fulfillment(&fixture, application_id, vec![AssetSpec::Existing(asset_id)]))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);

    let bindings = fixture.store.bindings_for_asset(asset_id);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].status, BindingStatus::Active);
    assert!(bindings[0].is_active);

    let application = fixture
        .store
        .find_application(application_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(application.status, ApplicationStatus::Fulfilled);
    assert_eq!(application.fulfilled_by, Some(fixture.admin_id));
}

#[tokio::test]
async fn concurrent_binds_of_the_same_pair_share_one_row() {
    let fixture = Fixture::new();
    let reconciler = Arc::new(AssetBindingReconciler::new(fixture.shared()));
    let asset_id = fixture.ad_account("act_200");

    let request = BindRequest {
        asset_id,
        organization_id: fixture.organization_id,
        bound_by: Some(fixture.admin_id),
        spend_limit_cents: Some(100_000),
        fee_percentage: Some(5.0),
    };

    let (first, second) = tokio::join!(
        reconciler.bind(request.clone()),
        reconciler.bind(request.clone())
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.created, second.created);
    assert_eq!(first.binding.id, second.binding.id);
    assert_eq!(fixture.store.bindings_for_asset(asset_id).len(), 1);
}

#[tokio::test]
async fn rebinding_after_unbind_creates_fresh_binding() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let asset_id = fixture.ad_account("act_300");
    let request = BindRequest {
        asset_id,
        organization_id: fixture.organization_id,
        bound_by: None,
        spend_limit_cents: None,
        fee_percentage: None,
    };

    assert!(reconciler.bind(request.clone()).await.unwrap().created);
    reconciler
        .unbind(asset_id, fixture.organization_id)
        .await
        .unwrap();
    assert!(fixture.store.bindings_for_asset(asset_id).is_empty());

    let err = reconciler
        .unbind(asset_id, fixture.organization_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotFound);

    assert!(reconciler.bind(request).await.unwrap().created);
}

#[tokio::test]
async fn binding_unknown_asset_is_not_found() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());

    let err = reconciler
        .bind(BindRequest {
            asset_id: Uuid::new_v4(),
            organization_id: fixture.organization_id,
            bound_by: None,
            spend_limit_cents: None,
            fee_percentage: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn failed_fulfillment_insert_rolls_back_everything() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let bm_id = fixture.business_manager("bm_500");
    let account_id = fixture.ad_account("act_500");
    let application_id = processing_application(&fixture, RequestType::NewBusinessManager).await;

    fixture.store.fail_once(FailPoint::InsertFulfillment);
    let err = reconciler
        .fulfill(fulfillment(
            &fixture,
            application_id,
            vec![AssetSpec::Existing(bm_id), AssetSpec::Existing(account_id)],
        ))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);

    assert!(fixture.store.bindings_for_asset(bm_id).is_empty());
    assert!(fixture.store.bindings_for_asset(account_id).is_empty());
    assert!(fixture
        .store
        .list_fulfillments(application_id)
        .await
        .unwrap()
        .is_empty());
    let application = fixture
        .store
        .find_application(application_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(application.status, ApplicationStatus::Processing);

    let result = reconciler
        .fulfill(fulfillment(
            &fixture,
            application_id,
            vec![AssetSpec::Existing(bm_id), AssetSpec::Existing(account_id)],
        ))
        .await
        .unwrap();
    assert_eq!(result.bindings.len(), 2);
}

#[tokio::test]
async fn fulfillment_rejects_mismatched_organization() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let asset_id = fixture.ad_account("act_600");
    let application_id = processing_application(&fixture, RequestType::AdAccount).await;

    let mut request = fulfillment(&fixture, application_id, vec![AssetSpec::Existing(asset_id)]);
    request.organization_id = Some(Uuid::new_v4());

    let err = reconciler.fulfill(request).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::ValidationError);
    assert!(fixture.store.bindings_for_asset(asset_id).is_empty());
}

#[tokio::test]
async fn fulfillment_without_assets_is_rejected() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let application_id = processing_application(&fixture, RequestType::AdAccount).await;

    let err = reconciler
        .fulfill(fulfillment(&fixture, application_id, Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::ValidationError);
}

#[tokio::test]
async fn pending_application_cannot_be_fulfilled() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let asset_id = fixture.ad_account("act_700");
    let application = ApplicationService::new(fixture.shared())
        .submit(
            SubmitApplication {
                organization_id: fixture.organization_id,
                request_type: RequestType::AdAccount,
                name: None,
                pixel_id: None,
                target_bm_id: None,
                requested_amount_cents: None,
                metadata: json!({}),
            },
            fixture.owner_id,
        )
        .await
        .unwrap();

    let err = reconciler
        .fulfill(fulfillment(&fixture, application.id, vec![AssetSpec::Existing(asset_id)]))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);
}

#[tokio::test]
async fn binding_fee_defaults_to_the_plan_fee() {
    let fixture = Fixture::new();
    fixture.subscribe_to_plan("growth", 4.5);
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let asset_id = fixture.ad_account("act_800");
    let application_id = processing_application(&fixture, RequestType::AdAccount).await;

    let result = reconciler
        .fulfill(fulfillment(&fixture, application_id, vec![AssetSpec::Existing(asset_id)]))
        .await
        .unwrap();
    assert_eq!(result.bindings[0].fee_percentage, Some(4.5));

    let other = fixture.ad_account("act_801");
    let upsert = reconciler
        .bind(BindRequest {
            asset_id: other,
            organization_id: fixture.organization_id,
            bound_by: None,
            spend_limit_cents: None,
            fee_percentage: Some(2.0),
        })
        .await
        .unwrap();
    assert_eq!(upsert.binding.fee_percentage, Some(2.0));
}

#[tokio::test]
async fn fulfill_creates_new_assets() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let application_id = processing_application(&fixture, RequestType::NewBusinessManager).await;

    let result = reconciler
        .fulfill(fulfillment(
            &fixture,
            application_id,
            vec![AssetSpec::New(NewAsset {
                r#type: AssetType::BusinessManager,
                dolphin_id: "bm_new".to_string(),
                name: "Fresh BM".to_string(),
                status: "active".to_string(),
                metadata: json!({}),
            })],
        ))
        .await
        .unwrap();

    assert_eq!(result.assets.len(), 1);
    assert_eq!(result.assets[0].dolphin_id, "bm_new");
    assert_eq!(result.bindings[0].asset_id, result.assets[0].id);
}

#[tokio::test]
async fn pixel_fulfillment_creates_and_binds_the_pixel() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let application_id = processing_application(&fixture, RequestType::PixelConnection).await;

    let result = reconciler
        .fulfill_pixel(application_id, fixture.admin_id)
        .await
        .unwrap();

    assert_eq!(result.application.status, ApplicationStatus::Fulfilled);
    let pixel = &result.assets[0];
    assert_eq!(pixel.r#type, AssetType::Pixel);
    assert_eq!(pixel.dolphin_id, "px_991");
    assert_eq!(pixel.name, "Main pixel");
    assert_eq!(pixel.metadata["business_manager_id"], "bm_42");
    assert_eq!(result.bindings[0].organization_id, fixture.organization_id);
}

#[tokio::test]
async fn pixel_fulfillment_requires_a_pixel_application() {
    let fixture = Fixture::new();
    let reconciler = AssetBindingReconciler::new(fixture.shared());
    let application_id = processing_application(&fixture, RequestType::AdAccount).await;

    let err = reconciler
        .fulfill_pixel(application_id, fixture.admin_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);
}
