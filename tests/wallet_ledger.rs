mod common;

use std::str::FromStr;

use adhub_backend::database::models::{TransactionStatus, TransactionType};
use adhub_backend::database::{FailPoint, LedgerStore};
use adhub_backend::error::ErrorCode;
use adhub_backend::services::{AddFunds, CreditOutcome, RecordTransaction, WalletService};
use common::Fixture;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

fn deposit(organization_id: Uuid, amount: &str, reference: Option<&str>) -> AddFunds {
    AddFunds {
        organization_id,
        amount: Decimal::from_str(amount).unwrap(),
        currency: "USD".to_string(),
        provider: "stripe".to_string(),
        provider_reference: reference.map(str::to_string),
        description: Some("top-up".to_string()),
        metadata: json!({}),
    }
}

async fn balance(fixture: &Fixture) -> i64 {
    fixture
        .store
        .find_wallet(fixture.organization_id)
        .await
        .unwrap()
        .unwrap()
        .balance_cents
}

async fn transaction_count(fixture: &Fixture) -> usize {
    fixture
        .store
        .list_transactions(fixture.organization_id, 500)
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn add_funds_credits_balance_and_records_one_deposit() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 500_000);
    let wallet = WalletService::new(fixture.shared());

    let outcome = wallet
        .add_funds(deposit(fixture.organization_id, "100.00", Some("pi_123")))
        .await
        .unwrap();

    let entry = match outcome {
        CreditOutcome::Applied(entry) => entry,
        other => panic!("expected applied credit, got {:?}", other),
    };
    assert_eq!(entry.wallet.balance_cents, 510_000);
    assert_eq!(entry.transaction.r#type, TransactionType::Deposit);
    assert_eq!(entry.transaction.amount_cents, 10_000);
    assert_eq!(entry.transaction.status, TransactionStatus::Completed);
    assert_eq!(entry.transaction.provider_reference.as_deref(), Some("pi_123"));

    assert_eq!(balance(&fixture).await, 510_000);
    assert_eq!(transaction_count(&fixture).await, 1);
}

#[tokio::test]
async fn withdraw_beyond_balance_is_rejected() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 2000);
    let wallet = WalletService::new(fixture.shared());

    let err = wallet
        .withdraw(
            fixture.organization_id,
            5000,
            TransactionType::Withdrawal,
            None,
            json!({}),
        )
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::InsufficientFunds);
    assert_eq!(err.status_code(), 400);
    assert_eq!(balance(&fixture).await, 2000);
    assert_eq!(transaction_count(&fixture).await, 0);
}

#[tokio::test]
async fn balance_never_goes_negative() {
    let fixture = Fixture::new();
    let wallet = WalletService::new(fixture.shared());

    let steps: [(bool, i64); 7] = [
        (true, 1500),
        (false, 1000),
        (false, 600),
        (true, 200),
        (false, 700),
        (false, 700),
        (false, 1),
    ];

    let mut expected = 0i64;
    for (credit, cents) in steps {
        if credit {
            wallet
                .record(RecordTransaction {
                    organization_id: fixture.organization_id,
                    r#type: TransactionType::Deposit,
                    amount_cents: cents,
                    description: None,
                    metadata: json!({}),
                })
                .await
                .unwrap();
            expected += cents;
            continue;
        }

        let result = wallet
            .withdraw(
                fixture.organization_id,
                cents,
                TransactionType::Withdrawal,
                None,
                json!({}),
            )
            .await;
        if cents > expected {
            assert_eq!(result.unwrap_err().error_code(), ErrorCode::InsufficientFunds);
        } else {
            assert_eq!(result.unwrap().wallet.balance_cents, expected - cents);
            expected -= cents;
        }
        assert!(balance(&fixture).await >= 0);
    }

    assert_eq!(balance(&fixture).await, expected);
}

#[tokio::test]
async fn failed_balance_write_rolls_back_transaction_row() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 1000);
    let wallet = WalletService::new(fixture.shared());

    fixture.store.fail_once(FailPoint::UpdateWalletBalance);
    let err = wallet
        .add_funds(deposit(fixture.organization_id, "25.00", Some("pi_fail")))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 500);
    assert_eq!(balance(&fixture).await, 1000);
    assert_eq!(transaction_count(&fixture).await, 0);
}

#[tokio::test]
async fn failed_transaction_insert_rolls_back_balance() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 1000);
    let wallet = WalletService::new(fixture.shared());

    fixture.store.fail_once(FailPoint::InsertTransaction);
    assert!(wallet
        .withdraw(
            fixture.organization_id,
            400,
            TransactionType::Spend,
            None,
            json!({}),
        )
        .await
        .is_err());

    assert_eq!(balance(&fixture).await, 1000);
    assert_eq!(transaction_count(&fixture).await, 0);

    // The failure is one-shot; the retry goes through.
    let entry = wallet
        .withdraw(
            fixture.organization_id,
            400,
            TransactionType::Spend,
            None,
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(entry.wallet.balance_cents, 600);
}

#[tokio::test]
async fn replayed_provider_reference_is_not_credited_twice() {
    let fixture = Fixture::new();
    let wallet = WalletService::new(fixture.shared());

    let first = wallet
        .add_funds(deposit(fixture.organization_id, "40.00", Some("pi_replay")))
        .await
        .unwrap();
    let second = wallet
        .add_funds(deposit(fixture.organization_id, "40.00", Some("pi_replay")))
        .await
        .unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(balance(&fixture).await, 4000);
    assert_eq!(transaction_count(&fixture).await, 1);
}

#[tokio::test]
async fn deposits_without_reference_are_not_deduplicated() {
    let fixture = Fixture::new();
    let wallet = WalletService::new(fixture.shared());

    for _ in 0..2 {
        wallet
            .add_funds(deposit(fixture.organization_id, "1.50", None))
            .await
            .unwrap();
    }

    assert_eq!(balance(&fixture).await, 300);
    assert_eq!(transaction_count(&fixture).await, 2);
}

#[tokio::test]
async fn unknown_wallet_is_not_found() {
    let fixture = Fixture::new();
    let wallet = WalletService::new(fixture.shared());

    let err = wallet
        .add_funds(deposit(Uuid::new_v4(), "10.00", Some("pi_x")))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn refund_credits_the_wallet() {
    let fixture = Fixture::new();
    fixture.store.set_balance(fixture.organization_id, 100);
    let wallet = WalletService::new(fixture.shared());

    let entry = wallet
        .refund(
            fixture.organization_id,
            250,
            Some("campaign refund".to_string()),
            json!({}),
        )
        .await
        .unwrap();

    assert_eq!(entry.transaction.r#type, TransactionType::Refund);
    assert_eq!(entry.wallet.balance_cents, 350);
}
