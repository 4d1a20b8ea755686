//! Hosted checkout sessions for plan subscriptions and wallet funding.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::database::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::types::{CheckoutMode, CheckoutRequest, LineItem, ProviderName};
use crate::services::wallet::to_cents;

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub provider: ProviderName,
    pub session_id: String,
    pub url: Option<String>,
    /// What the customer is charged.
    pub amount_cents: i64,
    /// What lands in the wallet once the payment settles.
    pub wallet_credit_cents: i64,
    pub processing_fee_cents: i64,
}

#[derive(Debug, Clone)]
pub struct WalletCheckout {
    pub organization_id: Uuid,
    pub amount: Decimal,
    pub provider: Option<ProviderName>,
    pub customer_email: Option<String>,
}

pub struct CheckoutService {
    store: Arc<dyn LedgerStore>,
    providers: Arc<PaymentProviderFactory>,
    billing: BillingConfig,
    public_api_base_url: String,
    app_url: String,
}

/// Card processing fee on top of the wallet credit, rounded to the cent.
pub fn processing_fee_cents(credit_cents: i64, fee_percent: f64) -> i64 {
    let percent = Decimal::from_f64(fee_percent).unwrap_or(Decimal::ZERO);
    (Decimal::from(credit_cents) * percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        providers: Arc<PaymentProviderFactory>,
        billing: BillingConfig,
        public_api_base_url: impl Into<String>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            providers,
            billing,
            public_api_base_url: public_api_base_url.into().trim_end_matches('/').to_string(),
            app_url: app_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start a card-processor subscription checkout for `plan_id`.
    pub async fn subscribe(
        &self,
        plan_id: &str,
        organization_id: Uuid,
        customer_email: Option<String>,
    ) -> AppResult<CheckoutResponse> {
        let plan = self
            .store
            .find_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::not_found("plan", plan_id))?;
        if !plan.is_active {
            return Err(AppError::invalid_field("planId", "plan is not available"));
        }
        let price_id = plan
            .provider_price_id
            .clone()
            .ok_or_else(|| AppError::invalid_field("planId", "plan has no billing price"))?;

        let organization = self
            .store
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| AppError::not_found("organization", organization_id))?;

        let provider = self.providers.get_provider(ProviderName::Stripe)?;

        let mut metadata = BTreeMap::new();
        metadata.insert("organization_id".to_string(), organization_id.to_string());
        metadata.insert("plan_id".to_string(), plan.id.clone());

        let session = provider
            .create_checkout(CheckoutRequest {
                mode: CheckoutMode::Subscription,
                line_item: LineItem::Price { price_id },
                reference: organization_id.to_string(),
                customer_email,
                customer_id: organization.billing_customer_id,
                success_url: format!("{}/dashboard/settings?subscription=success", self.app_url),
                cancel_url: format!("{}/dashboard/settings?subscription=cancelled", self.app_url),
                callback_url: None,
                metadata,
            })
            .await?;

        info!(
            organization_id = %organization_id,
            plan_id = %plan.id,
            session_id = %session.session_id,
            "subscription checkout created"
        );
        Ok(CheckoutResponse {
            provider: session.provider,
            session_id: session.session_id,
            url: session.url,
            amount_cents: plan.monthly_fee_cents,
            wallet_credit_cents: 0,
            processing_fee_cents: 0,
        })
    }

    /// Start a wallet-funding checkout with the requested or default provider.
    pub async fn fund_wallet(&self, request: WalletCheckout) -> AppResult<CheckoutResponse> {
        let credit_cents = to_cents(request.amount)?;
        if self.store.find_wallet(request.organization_id).await?.is_none() {
            return Err(AppError::not_found("wallet", request.organization_id));
        }

        let provider = match request.provider {
            Some(name) => self.providers.get_provider(name)?,
            None => self.providers.get_default_provider()?,
        };
        let currency = self.billing.default_currency.clone();
        let wallet_credit = Decimal::new(credit_cents, 2);

        let (fee_cents, checkout) = match provider.name() {
            ProviderName::Stripe => {
                let fee_cents =
                    processing_fee_cents(credit_cents, self.billing.card_processing_fee_percent);
                let mut metadata = BTreeMap::new();
                metadata.insert(
                    "organization_id".to_string(),
                    request.organization_id.to_string(),
                );
                metadata.insert("wallet_credit".to_string(), wallet_credit.to_string());
                metadata.insert(
                    "processing_fee".to_string(),
                    Decimal::new(fee_cents, 2).to_string(),
                );

                (
                    fee_cents,
                    CheckoutRequest {
                        mode: CheckoutMode::Payment,
                        line_item: LineItem::Amount {
                            name: format!("Wallet top-up ({} {})", wallet_credit, currency),
                            amount_cents: credit_cents + fee_cents,
                            currency: currency.clone(),
                        },
                        reference: request.organization_id.to_string(),
                        customer_email: request.customer_email,
                        customer_id: None,
                        success_url: format!("{}/dashboard/wallet?payment=success", self.app_url),
                        cancel_url: format!("{}/dashboard/wallet?payment=cancelled", self.app_url),
                        callback_url: None,
                        metadata,
                    },
                )
            }
            ProviderName::NowPayments => (
                0,
                CheckoutRequest {
                    mode: CheckoutMode::Payment,
                    line_item: LineItem::Amount {
                        name: format!("Wallet top-up ({} {})", wallet_credit, currency),
                        amount_cents: credit_cents,
                        currency: currency.clone(),
                    },
                    reference: request.organization_id.to_string(),
                    customer_email: request.customer_email,
                    customer_id: None,
                    success_url: format!("{}/dashboard/wallet?payment=success", self.app_url),
                    cancel_url: format!("{}/dashboard/wallet?payment=cancelled", self.app_url),
                    callback_url: Some(format!(
                        "{}/api/payments/crypto/webhook",
                        self.public_api_base_url
                    )),
                    metadata: BTreeMap::new(),
                },
            ),
        };

        let session = provider.create_checkout(checkout).await?;
        info!(
            organization_id = %request.organization_id,
            provider = %session.provider,
            credit_cents,
            fee_cents,
            "wallet checkout created"
        );
        Ok(CheckoutResponse {
            provider: session.provider,
            session_id: session.session_id,
            url: session.url,
            amount_cents: credit_cents + fee_cents,
            wallet_credit_cents: credit_cents,
            processing_fee_cents: fee_cents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_rounded_to_the_cent() {
        assert_eq!(processing_fee_cents(10000, 3.0), 300);
        assert_eq!(processing_fee_cents(1050, 3.0), 32);
        assert_eq!(processing_fee_cents(1000, 0.0), 0);
    }
}
