//! Ad-account top-up requests.
//!
//! A client asks to move wallet funds into one of its bound ad accounts; an
//! admin later completes or rejects the request. Completion debits the wallet
//! in the same store transaction that updates the request.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::database::models::{
    AssetType, NewTopUpRequest, TopUpRequest, TopUpRequestUpdate, TopUpStatus, TransactionType,
};
use crate::database::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::services::wallet::WalletService;

#[derive(Debug, Clone)]
pub struct CreateTopUp {
    pub organization_id: Uuid,
    pub ad_account_id: Uuid,
    pub amount_cents: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReviewTopUp {
    pub status: TopUpStatus,
    pub approved_amount_cents: Option<i64>,
    pub admin_notes: Option<String>,
}

pub struct TopUpService {
    store: Arc<dyn LedgerStore>,
    min_top_up_cents: i64,
}

impl TopUpService {
    pub fn new(store: Arc<dyn LedgerStore>, billing: &BillingConfig) -> Self {
        Self {
            store,
            min_top_up_cents: billing.min_top_up_cents,
        }
    }

    pub async fn create(&self, request: CreateTopUp, requested_by: Uuid) -> AppResult<TopUpRequest> {
        if request.amount_cents < self.min_top_up_cents {
            return Err(AppError::below_minimum("amount", self.min_top_up_cents));
        }

        let mut tx = self.store.begin().await?;

        let is_ad_account = tx
            .find_asset(request.ad_account_id)
            .await?
            .map_or(false, |asset| asset.r#type == AssetType::AdAccount);
        let is_bound = is_ad_account
            && tx
                .find_binding(request.ad_account_id, request.organization_id)
                .await?
                .map_or(false, |binding| binding.is_active);
        if !is_bound {
            return Err(AppError::not_found("ad_account", request.ad_account_id));
        }

        let wallet = tx
            .lock_wallet(request.organization_id)
            .await?
            .ok_or_else(|| AppError::not_found("wallet", request.organization_id))?;
        if request.amount_cents > wallet.balance_cents {
            return Err(AppError::insufficient_funds(
                wallet.balance_cents,
                request.amount_cents,
            ));
        }

        let created = tx
            .insert_top_up_request(NewTopUpRequest {
                organization_id: request.organization_id,
                ad_account_id: request.ad_account_id,
                amount_cents: request.amount_cents,
                notes: request.notes,
                requested_by,
            })
            .await?;
        tx.commit().await?;

        info!(
            topup_request_id = %created.id,
            organization_id = %created.organization_id,
            amount_cents = created.amount_cents,
            "top-up requested"
        );
        Ok(created)
    }

    pub async fn list(&self, organization_id: Option<Uuid>) -> AppResult<Vec<TopUpRequest>> {
        Ok(self.store.list_top_up_requests(organization_id).await?)
    }

    pub async fn review(
        &self,
        id: Uuid,
        review: ReviewTopUp,
        admin_id: Uuid,
    ) -> AppResult<TopUpRequest> {
        let mut tx = self.store.begin().await?;
        let current = tx
            .lock_top_up_request(id)
            .await?
            .ok_or_else(|| AppError::not_found("topup_request", id))?;

        if !current.status.can_transition_to(review.status) {
            return Err(AppError::invalid_state(
                "topup_request",
                current.status,
                review.status,
            ));
        }

        let approved_amount_cents = match review.status {
            TopUpStatus::Completed => {
                let approved = review.approved_amount_cents.unwrap_or(current.amount_cents);
                if approved <= 0 || approved > current.amount_cents {
                    return Err(AppError::invalid_field(
                        "approved_amount",
                        format!("must be between 1 and {} cents", current.amount_cents),
                    ));
                }
                Some(approved)
            }
            _ => None,
        };

        let mut transaction_id = None;
        if let Some(amount_cents) = approved_amount_cents {
            let entry = WalletService::debit_in(
                tx.as_mut(),
                current.organization_id,
                amount_cents,
                TransactionType::Spend,
                Some("Ad account top-up".to_string()),
                json!({
                    "topup_request_id": current.id,
                    "ad_account_id": current.ad_account_id,
                }),
            )
            .await
            .map_err(|err| {
                warn!(topup_request_id = %id, error = %err, "top-up debit failed");
                err
            })?;
            transaction_id = Some(entry.transaction.id);
        }

        let updated = tx
            .update_top_up_request(
                id,
                TopUpRequestUpdate {
                    status: review.status,
                    approved_amount_cents,
                    admin_notes: review.admin_notes,
                    processed_by: admin_id,
                    transaction_id,
                },
            )
            .await?;
        tx.commit().await?;

        info!(
            topup_request_id = %id,
            from = %current.status,
            to = %updated.status,
            admin_id = %admin_id,
            "top-up request reviewed"
        );
        Ok(updated)
    }
}
