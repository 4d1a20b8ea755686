//! Wallet ledger.
//!
//! `WalletService` is the only code path that changes a wallet balance. Every
//! mutation locks the wallet row, writes the new balance and appends exactly one
//! transaction row inside a single store transaction.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::models::{NewTransaction, Transaction, TransactionStatus, TransactionType, Wallet};
use crate::database::{LedgerStore, LedgerTx};
use crate::error::{AppError, AppResult};

/// Wallet state after a mutation plus the ledger row documenting it.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub wallet: Wallet,
    pub transaction: Transaction,
}

#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Applied(LedgerEntry),
    /// The provider reference was already credited; nothing changed.
    Duplicate { provider_reference: String },
}

impl CreditOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, CreditOutcome::Duplicate { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AddFunds {
    pub organization_id: Uuid,
    /// Major currency units, e.g. dollars.
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub provider_reference: Option<String>,
    pub description: Option<String>,
    pub metadata: JsonValue,
}

/// A ledger mutation described by its type, used by the transaction endpoints.
#[derive(Debug, Clone)]
pub struct RecordTransaction {
    pub organization_id: Uuid,
    pub r#type: TransactionType,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub metadata: JsonValue,
}

pub struct WalletService {
    store: Arc<dyn LedgerStore>,
}

/// `round(amount * 100)`, rejecting non-positive results.
pub fn to_cents(amount: Decimal) -> AppResult<i64> {
    let cents = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::invalid_amount(amount, "amount is out of range"))?;
    if cents <= 0 {
        return Err(AppError::invalid_amount(amount, "amount must be greater than zero"));
    }
    Ok(cents)
}

impl WalletService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Credit a deposit from a payment provider.
    ///
    /// Replaying the same `(provider, provider_reference)` returns
    /// `CreditOutcome::Duplicate` without touching the balance.
    pub async fn add_funds(&self, request: AddFunds) -> AppResult<CreditOutcome> {
        let amount_cents = to_cents(request.amount)?;
        let mut tx = self.store.begin().await?;

        let wallet = lock_wallet(tx.as_mut(), request.organization_id).await?;

        if let Some(reference) = &request.provider_reference {
            if let Some(existing) = tx
                .find_transaction_by_reference(&request.provider, reference)
                .await?
            {
                info!(
                    organization_id = %request.organization_id,
                    provider = %request.provider,
                    provider_reference = %reference,
                    transaction_id = %existing.id,
                    "payment reference already credited"
                );
                return Ok(CreditOutcome::Duplicate {
                    provider_reference: reference.clone(),
                });
            }
        }

        let mut metadata = object_or_empty(request.metadata);
        if let JsonValue::Object(map) = &mut metadata {
            map.insert("currency".to_string(), JsonValue::String(request.currency.clone()));
        }

        let new_balance = wallet.balance_cents + amount_cents;
        let result = apply(
            tx.as_mut(),
            &wallet,
            new_balance,
            NewTransaction {
                organization_id: request.organization_id,
                wallet_id: wallet.id,
                r#type: TransactionType::Deposit,
                amount_cents,
                status: TransactionStatus::Completed,
                description: request.description,
                provider: Some(request.provider.clone()),
                provider_reference: request.provider_reference.clone(),
                metadata,
            },
        )
        .await;

        let entry = match result {
            Ok(entry) => entry,
            Err(err) if err.is_unique_violation() => {
                let reference = request.provider_reference.unwrap_or_default();
                warn!(
                    provider = %request.provider,
                    provider_reference = %reference,
                    "concurrent credit for the same reference"
                );
                return Ok(CreditOutcome::Duplicate {
                    provider_reference: reference,
                });
            }
            Err(err) => {
                error!(organization_id = %request.organization_id, error = %err, "deposit rolled back");
                return Err(err.into());
            }
        };

        commit(tx, request.organization_id).await?;
        info!(
            organization_id = %request.organization_id,
            amount_cents,
            balance_cents = entry.wallet.balance_cents,
            provider = %request.provider,
            "funds added"
        );
        Ok(CreditOutcome::Applied(entry))
    }

    /// Debit the wallet as a `withdrawal` or `spend`.
    pub async fn withdraw(
        &self,
        organization_id: Uuid,
        amount_cents: i64,
        kind: TransactionType,
        description: Option<String>,
        metadata: JsonValue,
    ) -> AppResult<LedgerEntry> {
        let mut tx = self.store.begin().await?;
        let entry = Self::debit_in(
            tx.as_mut(),
            organization_id,
            amount_cents,
            kind,
            description,
            metadata,
        )
        .await?;
        commit(tx, organization_id).await?;
        Ok(entry)
    }

    pub async fn refund(
        &self,
        organization_id: Uuid,
        amount_cents: i64,
        description: Option<String>,
        metadata: JsonValue,
    ) -> AppResult<LedgerEntry> {
        let mut tx = self.store.begin().await?;
        let entry = Self::credit_in(
            tx.as_mut(),
            organization_id,
            amount_cents,
            TransactionType::Refund,
            description,
            metadata,
        )
        .await?;
        commit(tx, organization_id).await?;
        Ok(entry)
    }

    /// Dispatch a typed mutation to the matching credit or debit path.
    pub async fn record(&self, request: RecordTransaction) -> AppResult<LedgerEntry> {
        let mut tx = self.store.begin().await?;
        let entry = if request.r#type.is_credit() {
            Self::credit_in(
                tx.as_mut(),
                request.organization_id,
                request.amount_cents,
                request.r#type,
                request.description,
                request.metadata,
            )
            .await?
        } else {
            Self::debit_in(
                tx.as_mut(),
                request.organization_id,
                request.amount_cents,
                request.r#type,
                request.description,
                request.metadata,
            )
            .await?
        };
        commit(tx, request.organization_id).await?;
        Ok(entry)
    }

    pub async fn balance(&self, organization_id: Uuid) -> AppResult<Wallet> {
        self.store
            .find_wallet(organization_id)
            .await?
            .ok_or_else(|| AppError::not_found("wallet", organization_id))
    }

    pub async fn transactions(&self, organization_id: Uuid, limit: i64) -> AppResult<Vec<Transaction>> {
        Ok(self
            .store
            .list_transactions(organization_id, limit.clamp(1, 500))
            .await?)
    }

    /// Debit inside a caller-owned transaction so it commits with the caller's other writes.
    pub async fn debit_in(
        tx: &mut dyn LedgerTx,
        organization_id: Uuid,
        amount_cents: i64,
        kind: TransactionType,
        description: Option<String>,
        metadata: JsonValue,
    ) -> AppResult<LedgerEntry> {
        if kind.is_credit() {
            return Err(AppError::invalid_field("type", format!("{} is not a debit", kind)));
        }
        if amount_cents <= 0 {
            return Err(AppError::invalid_amount(amount_cents, "amount must be greater than zero"));
        }

        let wallet = lock_wallet(tx, organization_id).await?;
        if amount_cents > wallet.balance_cents {
            warn!(
                organization_id = %organization_id,
                balance_cents = wallet.balance_cents,
                amount_cents,
                "insufficient funds"
            );
            return Err(AppError::insufficient_funds(wallet.balance_cents, amount_cents));
        }

        let new_balance = wallet.balance_cents - amount_cents;
        apply(
            tx,
            &wallet,
            new_balance,
            NewTransaction {
                organization_id,
                wallet_id: wallet.id,
                r#type: kind,
                amount_cents,
                status: TransactionStatus::Completed,
                description,
                provider: None,
                provider_reference: None,
                metadata: object_or_empty(metadata),
            },
        )
        .await
        .map_err(|err| {
            error!(organization_id = %organization_id, error = %err, "debit rolled back");
            err.into()
        })
    }

    pub async fn credit_in(
        tx: &mut dyn LedgerTx,
        organization_id: Uuid,
        amount_cents: i64,
        kind: TransactionType,
        description: Option<String>,
        metadata: JsonValue,
    ) -> AppResult<LedgerEntry> {
        if !kind.is_credit() {
            return Err(AppError::invalid_field("type", format!("{} is not a credit", kind)));
        }
        if amount_cents <= 0 {
            return Err(AppError::invalid_amount(amount_cents, "amount must be greater than zero"));
        }

        let wallet = lock_wallet(tx, organization_id).await?;
        let new_balance = wallet.balance_cents + amount_cents;
        apply(
            tx,
            &wallet,
            new_balance,
            NewTransaction {
                organization_id,
                wallet_id: wallet.id,
                r#type: kind,
                amount_cents,
                status: TransactionStatus::Completed,
                description,
                provider: None,
                provider_reference: None,
                metadata: object_or_empty(metadata),
            },
        )
        .await
        .map_err(|err| {
            error!(organization_id = %organization_id, error = %err, "credit rolled back");
            err.into()
        })
    }
}

async fn lock_wallet(tx: &mut dyn LedgerTx, organization_id: Uuid) -> AppResult<Wallet> {
    tx.lock_wallet(organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("wallet", organization_id))
}

async fn apply(
    tx: &mut dyn LedgerTx,
    wallet: &Wallet,
    new_balance: i64,
    entry: NewTransaction,
) -> Result<LedgerEntry, crate::database::error::DatabaseError> {
    let wallet = tx.update_wallet_balance(wallet.id, new_balance).await?;
    let transaction = tx.insert_transaction(entry).await?;
    Ok(LedgerEntry { wallet, transaction })
}

async fn commit(tx: Box<dyn LedgerTx>, organization_id: Uuid) -> AppResult<()> {
    tx.commit().await.map_err(|err| {
        error!(organization_id = %organization_id, error = %err, "wallet commit failed");
        err.into()
    })
}

fn object_or_empty(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(_) => value,
        _ => JsonValue::Object(serde_json::Map::new()),
    }
}
