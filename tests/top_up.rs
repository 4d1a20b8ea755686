mod common;

use adhub_backend::config::BillingConfig;
use adhub_backend::database::models::{TopUpStatus, TransactionType};
use adhub_backend::database::{FailPoint, LedgerStore};
use adhub_backend::error::ErrorCode;
use adhub_backend::services::{
    AssetBindingReconciler, BindRequest, CreateTopUp, ReviewTopUp, TopUpService,
};
use common::Fixture;
use uuid::Uuid;

async fn bound_account(fixture: &Fixture, dolphin_id: &str) -> Uuid {
    let asset_id = fixture.ad_account(dolphin_id);
    AssetBindingReconciler::new(fixture.shared())
        .bind(BindRequest {
            asset_id,
            organization_id: fixture.organization_id,
            bound_by: Some(fixture.admin_id),
            spend_limit_cents: None,
            fee_percentage: None,
        })
        .await
        .unwrap();
    asset_id
}

fn service(fixture: &Fixture) -> TopUpService {
    TopUpService::new(fixture.shared(), &BillingConfig::default())
}

fn request(fixture: &Fixture, ad_account_id: Uuid, amount_cents: i64) -> CreateTopUp {
    CreateTopUp {
        organization_id: fixture.organization_id,
        ad_account_id,
        amount_cents,
        notes: Some("launch week".to_string()),
    }
}

fn review(status: TopUpStatus, approved_amount_cents: Option<i64>) -> ReviewTopUp {
    ReviewTopUp {
        status,
        approved_amount_cents,
        admin_notes: None,
    }
}

#[tokio::test]
async fn request_below_minimum_is_rejected() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 100_000);
    let account = bound_account(&fixture, "act_1").await;

    let err = service(&fixture)
        .create(request(&fixture, account, 499), fixture.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::ValidationError);
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn unbound_ad_account_is_not_found() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 100_000);
    let account = fixture.ad_account("act_unbound");

    let err = service(&fixture)
        .create(request(&fixture, account, 5000), fixture.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn request_above_balance_is_rejected() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 1000);
    let account = bound_account(&fixture, "act_2").await;

    let err = service(&fixture)
        .create(request(&fixture, account, 5000), fixture.owner_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InsufficientFunds);
}

#[tokio::test]
async fn completing_a_request_debits_the_wallet() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 20_000);
    let account = bound_account(&fixture, "act_3").await;
    let top_ups = service(&fixture);

    let created = top_ups
        .create(request(&fixture, account, 8000), fixture.owner_id)
        .await
        .unwrap();
    assert_eq!(created.status, TopUpStatus::Pending);
    assert_eq!(
        fixture
            .store
            .find_wallet(fixture.organization_id)
            .await
            .unwrap()
            .unwrap()
            .balance_cents,
        20_000
    );

    let completed = top_ups
        .review(
            created.id,
            review(TopUpStatus::Completed, Some(7500)),
            fixture.admin_id,
        )
        .await
        .unwrap();

    assert_eq!(completed.status, TopUpStatus::Completed);
    assert_eq!(completed.processed_by, Some(fixture.admin_id));
    assert!(completed.transaction_id.is_some());

    let wallet = fixture
        .store
        .find_wallet(fixture.organization_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wallet.balance_cents, 12_500);

    let transactions = fixture
        .store
        .list_transactions(fixture.organization_id, 10)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].r#type, TransactionType::Spend);
    assert_eq!(transactions[0].amount_cents, 7500);
    assert_eq!(Some(transactions[0].id), completed.transaction_id);
    assert_eq!(
        transactions[0].metadata["topup_request_id"],
        created.id.to_string()
    );
}

#[tokio::test]
async fn failed_completion_leaves_request_and_wallet_untouched() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 20_000);
    let account = bound_account(&fixture, "act_4").await;
    let top_ups = service(&fixture);
    let created = top_ups
        .create(request(&fixture, account, 8000), fixture.owner_id)
        .await
        .unwrap();

    fixture.store.fail_once(FailPoint::UpdateTopUpRequest);
    assert!(top_ups
        .review(created.id, review(TopUpStatus::Completed, None), fixture.admin_id)
        .await
        .is_err());

    let stored = fixture.store.top_up_request(created.id).unwrap();
    assert_eq!(stored.status, TopUpStatus::Pending);
    assert!(stored.transaction_id.is_none());
    let wallet = fixture
        .store
        .find_wallet(fixture.organization_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wallet.balance_cents, 20_000);
}

#[tokio::test]
async fn rejected_request_cannot_be_completed() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 20_000);
    let account = bound_account(&fixture, "act_5").await;
    let top_ups = service(&fixture);
    let created = top_ups
        .create(request(&fixture, account, 6000), fixture.owner_id)
        .await
        .unwrap();

    top_ups
        .review(created.id, review(TopUpStatus::Rejected, None), fixture.admin_id)
        .await
        .unwrap();
    let err = top_ups
        .review(created.id, review(TopUpStatus::Completed, None), fixture.admin_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);

    let listed = top_ups.list(Some(fixture.organization_id)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, TopUpStatus::Rejected);
}

#[tokio::test]
async fn completion_fails_when_balance_dropped_since_request() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 20_000);
    let account = bound_account(&fixture, "act_6").await;
    let top_ups = service(&fixture);
    let created = top_ups
        .create(request(&fixture, account, 15_000), fixture.owner_id)
        .await
        .unwrap();

    fixture.store.set_balance(fixture.organization_id, 1000);
    let err = top_ups
        .review(created.id, review(TopUpStatus::Completed, None), fixture.admin_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InsufficientFunds);
    assert_eq!(
        fixture.store.top_up_request(created.id).unwrap().status,
        TopUpStatus::Pending
    );
}

#[tokio::test]
async fn approved_amount_cannot_exceed_the_request() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 20_000);
    let account = bound_account(&fixture, "act_7").await;
    let top_ups = service(&fixture);
    let created = top_ups
        .create(request(&fixture, account, 5000), fixture.owner_id)
        .await
        .unwrap();

    for approved in [0, 5001] {
        let err = top_ups
            .review(
                created.id,
                review(TopUpStatus::Completed, Some(approved)),
                fixture.admin_id,
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
    }
    assert_eq!(
        fixture
            .store
            .find_wallet(fixture.organization_id)
            .await
            .unwrap()
            .unwrap()
            .balance_cents,
        20_000
    );

    let rejected = top_ups
        .review(
            created.id,
            review(TopUpStatus::Rejected, Some(4000)),
            fixture.admin_id,
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, TopUpStatus::Rejected);
    assert_eq!(rejected.approved_amount_cents, None);
}
