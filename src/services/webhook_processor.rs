use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::models::SubscriptionUpsert;
use crate::database::LedgerStore;
use crate::error::AppError;
use crate::payments::error::PaymentError;
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::types::{ProviderName, WebhookEvent};
use crate::services::wallet::{AddFunds, CreditOutcome, WalletService};

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Invalid {provider} signature")]
    InvalidSignature { provider: ProviderName },
    #[error("Provider not configured: {0}")]
    NotConfigured(ProviderName),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Processing error: {0}")]
    ProcessingError(String),
}

impl From<WebhookProcessorError> for AppError {
    fn from(err: WebhookProcessorError) -> Self {
        match err {
            WebhookProcessorError::InvalidSignature { provider } => {
                AppError::invalid_signature(provider.as_str())
            }
            WebhookProcessorError::NotConfigured(provider) => {
                AppError::configuration(format!("{} webhooks are not configured", provider))
            }
            WebhookProcessorError::MalformedPayload(reason) => {
                AppError::invalid_field("payload", reason)
            }
            // 5xx so the provider redelivers.
            WebhookProcessorError::ProcessingError(message) => AppError::internal(message),
        }
    }
}

/// What a verified webhook did to the ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Credited {
        organization_id: Uuid,
        amount_cents: i64,
        transaction_id: Uuid,
    },
    Duplicate {
        provider_reference: String,
    },
    SubscriptionActivated {
        organization_id: Uuid,
        plan_id: String,
    },
    SubscriptionUpdated {
        provider_subscription_id: String,
        status: String,
    },
    Ignored {
        event_type: String,
    },
    /// Verified but can never apply, e.g. no wallet for the organization.
    Rejected {
        reason: String,
    },
}

pub struct PaymentWebhookProcessor {
    store: Arc<dyn LedgerStore>,
    provider_factory: Arc<PaymentProviderFactory>,
    wallet: Arc<WalletService>,
}

impl PaymentWebhookProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        provider_factory: Arc<PaymentProviderFactory>,
        wallet: Arc<WalletService>,
    ) -> Self {
        Self {
            store,
            provider_factory,
            wallet,
        }
    }

    /// Verify `payload` (the raw request body) against `signature` and apply the event.
    pub async fn process_webhook(
        &self,
        provider: ProviderName,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let provider_impl = self
            .provider_factory
            .get_provider(provider)
            .map_err(|_| WebhookProcessorError::NotConfigured(provider))?;

        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookProcessorError::InvalidSignature { provider })?;

        let verification = provider_impl
            .verify_webhook(payload, signature)
            .map_err(|e| match e {
                PaymentError::NotConfigured { .. } => WebhookProcessorError::NotConfigured(provider),
                _ => WebhookProcessorError::InvalidSignature { provider },
            })?;
        if !verification.valid {
            error!(
                provider = %provider,
                reason = verification.reason.as_deref().unwrap_or("mismatch"),
                "Invalid webhook signature"
            );
            return Err(WebhookProcessorError::InvalidSignature { provider });
        }

        let event = provider_impl
            .parse_webhook_event(payload)
            .map_err(|e| WebhookProcessorError::MalformedPayload(e.to_string()))?;

        let event_id = event.event_id.clone().unwrap_or_default();
        let result = match provider {
            ProviderName::Stripe => self.process_card_event(&event).await,
            ProviderName::NowPayments => self.process_crypto_event(&event).await,
        };

        match &result {
            Ok(WebhookOutcome::Ignored { event_type }) => {
                info!(provider = %provider, event_id = %event_id, event_type = %event_type, "Webhook event ignored");
            }
            Ok(WebhookOutcome::Rejected { reason }) => {
                error!(provider = %provider, event_id = %event_id, reason = %reason, "Webhook event cannot be applied");
            }
            Ok(outcome) => {
                info!(provider = %provider, event_id = %event_id, outcome = ?outcome, "Webhook processed successfully");
            }
            Err(e) => {
                warn!(provider = %provider, event_id = %event_id, error = %e, "Webhook processing failed");
            }
        }
        result
    }

    async fn process_card_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let object = event
            .payload
            .get("data")
            .and_then(|d| d.get("object"))
            .ok_or_else(|| WebhookProcessorError::MalformedPayload("missing data.object".to_string()))?;

        match event.event_type.as_str() {
            "checkout.session.completed" => {
                if str_field(object, "mode") == Some("subscription") {
                    self.activate_subscription(object).await
                } else {
                    self.credit_card_payment(event, object).await
                }
            }
            "customer.subscription.updated" | "customer.subscription.deleted" => {
                self.update_subscription(event.event_type.as_str(), object).await
            }
            other => Ok(WebhookOutcome::Ignored {
                event_type: other.to_string(),
            }),
        }
    }

    async fn credit_card_payment(
        &self,
        event: &WebhookEvent,
        session: &JsonValue,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        if let Some(status) = str_field(session, "payment_status") {
            if status != "paid" {
                return Ok(WebhookOutcome::Ignored {
                    event_type: format!("{} ({})", event.event_type, status),
                });
            }
        }

        let metadata = session.get("metadata").cloned().unwrap_or(JsonValue::Null);
        let organization_id = uuid_field(&metadata, "organization_id")?;

        let amount = match str_field(&metadata, "wallet_credit") {
            Some(credit) => Decimal::from_str(credit).map_err(|_| {
                WebhookProcessorError::MalformedPayload(format!("invalid wallet_credit '{}'", credit))
            })?,
            None => session
                .get("amount_total")
                .and_then(JsonValue::as_i64)
                .map(|cents| Decimal::new(cents, 2))
                .ok_or_else(|| {
                    WebhookProcessorError::MalformedPayload("missing amount".to_string())
                })?,
        };

        let reference = str_field(session, "payment_intent")
            .or_else(|| str_field(session, "id"))
            .ok_or_else(|| WebhookProcessorError::MalformedPayload("missing payment reference".to_string()))?
            .to_string();

        let result = self
            .wallet
            .add_funds(AddFunds {
                organization_id,
                amount,
                currency: str_field(session, "currency")
                    .unwrap_or("usd")
                    .to_uppercase(),
                provider: ProviderName::Stripe.as_str().to_string(),
                provider_reference: Some(reference),
                description: Some("Wallet top-up via card".to_string()),
                metadata: json!({
                    "checkout_session_id": str_field(session, "id"),
                    "event_id": event.event_id,
                    "processing_fee": str_field(&metadata, "processing_fee"),
                }),
            })
            .await;

        credit_result(result)
    }

    async fn activate_subscription(
        &self,
        session: &JsonValue,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let metadata = session.get("metadata").cloned().unwrap_or(JsonValue::Null);
        let organization_id = uuid_field(&metadata, "organization_id")?;
        let plan_id = str_field(&metadata, "plan_id")
            .ok_or_else(|| WebhookProcessorError::MalformedPayload("missing plan_id".to_string()))?
            .to_string();

        let mut tx = self.store.begin().await.map_err(|e| processing(e.into()))?;
        tx.set_organization_plan(
            organization_id,
            Some(&plan_id),
            "active",
            str_field(session, "customer"),
        )
        .await
        .map_err(|e| processing(e.into()))?;

        if let Some(subscription_id) = str_field(session, "subscription") {
            tx.upsert_subscription(SubscriptionUpsert {
                organization_id,
                plan_id: plan_id.clone(),
                provider_subscription_id: subscription_id.to_string(),
                status: "active".to_string(),
                current_period_end: None,
            })
            .await
            .map_err(|e| processing(e.into()))?;
        }
        tx.commit().await.map_err(|e| processing(e.into()))?;

        Ok(WebhookOutcome::SubscriptionActivated {
            organization_id,
            plan_id,
        })
    }

    async fn update_subscription(
        &self,
        event_type: &str,
        subscription: &JsonValue,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let provider_subscription_id = str_field(subscription, "id")
            .ok_or_else(|| WebhookProcessorError::MalformedPayload("missing subscription id".to_string()))?
            .to_string();
        let status = if event_type == "customer.subscription.deleted" {
            "canceled".to_string()
        } else {
            str_field(subscription, "status").unwrap_or("active").to_string()
        };
        let current_period_end = subscription
            .get("current_period_end")
            .and_then(JsonValue::as_i64)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        let mut tx = self.store.begin().await.map_err(|e| processing(e.into()))?;
        let Some(existing) = tx
            .find_subscription_by_provider_id(&provider_subscription_id)
            .await
            .map_err(|e| processing(e.into()))?
        else {
            warn!(
                subscription_id = %provider_subscription_id,
                "Subscription event for unknown subscription"
            );
            return Ok(WebhookOutcome::Ignored {
                event_type: event_type.to_string(),
            });
        };

        tx.upsert_subscription(SubscriptionUpsert {
            organization_id: existing.organization_id,
            plan_id: existing.plan_id,
            provider_subscription_id: provider_subscription_id.clone(),
            status: status.clone(),
            current_period_end,
        })
        .await
        .map_err(|e| processing(e.into()))?;
        tx.set_organization_plan(existing.organization_id, None, &status, None)
            .await
            .map_err(|e| processing(e.into()))?;
        tx.commit().await.map_err(|e| processing(e.into()))?;

        Ok(WebhookOutcome::SubscriptionUpdated {
            provider_subscription_id,
            status,
        })
    }

    async fn process_crypto_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        if event.event_type != "finished" {
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type.clone(),
            });
        }

        let payload = &event.payload;
        let organization_id = uuid_field(payload, "order_id")?;
        let amount = decimal_field(payload, "price_amount")?;
        let reference = event
            .event_id
            .clone()
            .ok_or_else(|| WebhookProcessorError::MalformedPayload("missing payment_id".to_string()))?;

        let result = self
            .wallet
            .add_funds(AddFunds {
                organization_id,
                amount,
                currency: str_field(payload, "price_currency")
                    .unwrap_or("usd")
                    .to_uppercase(),
                provider: ProviderName::NowPayments.as_str().to_string(),
                provider_reference: Some(reference),
                description: Some("Wallet top-up via crypto".to_string()),
                metadata: json!({
                    "pay_currency": payload.get("pay_currency"),
                    "actually_paid": payload.get("actually_paid"),
                    "invoice_id": payload.get("invoice_id"),
                }),
            })
            .await;

        credit_result(result)
    }
}

/// Client-class ledger errors are final and must not trigger redelivery.
fn credit_result(
    result: Result<CreditOutcome, AppError>,
) -> Result<WebhookOutcome, WebhookProcessorError> {
    match result {
        Ok(CreditOutcome::Applied(entry)) => Ok(WebhookOutcome::Credited {
            organization_id: entry.wallet.organization_id,
            amount_cents: entry.transaction.amount_cents,
            transaction_id: entry.transaction.id,
        }),
        Ok(CreditOutcome::Duplicate { provider_reference }) => {
            Ok(WebhookOutcome::Duplicate { provider_reference })
        }
        Err(err) if err.status_code() < 500 => Ok(WebhookOutcome::Rejected {
            reason: err.to_string(),
        }),
        Err(err) => Err(processing(err)),
    }
}

fn processing(err: AppError) -> WebhookProcessorError {
    WebhookProcessorError::ProcessingError(err.to_string())
}

fn str_field<'a>(value: &'a JsonValue, key: &str) -> Option<&'a str> {
    value.get(key).and_then(JsonValue::as_str)
}

fn uuid_field(value: &JsonValue, key: &str) -> Result<Uuid, WebhookProcessorError> {
    let raw = str_field(value, key)
        .ok_or_else(|| WebhookProcessorError::MalformedPayload(format!("missing {}", key)))?;
    Uuid::parse_str(raw)
        .map_err(|_| WebhookProcessorError::MalformedPayload(format!("invalid {} '{}'", key, raw)))
}

/// Amount given either as a JSON number or a numeric string.
fn decimal_field(value: &JsonValue, key: &str) -> Result<Decimal, WebhookProcessorError> {
    let raw = match value.get(key) {
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => s.clone(),
        _ => {
            return Err(WebhookProcessorError::MalformedPayload(format!(
                "missing {}",
                key
            )))
        }
    };
    Decimal::from_str(&raw)
        .map_err(|_| WebhookProcessorError::MalformedPayload(format!("invalid {} '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_error_types() {
        let err = WebhookProcessorError::InvalidSignature {
            provider: ProviderName::Stripe,
        };
        assert_eq!(err.to_string(), "Invalid stripe signature");
        assert_eq!(AppError::from(err).status_code(), 400);

        let err = WebhookProcessorError::ProcessingError("db down".to_string());
        assert_eq!(AppError::from(err).status_code(), 500);
    }

    #[test]
    fn test_decimal_field_accepts_numbers_and_strings() {
        let payload = json!({ "a": 100.5, "b": "42.10", "c": true });
        assert_eq!(decimal_field(&payload, "a").unwrap(), Decimal::new(1005, 1));
        assert_eq!(decimal_field(&payload, "b").unwrap(), Decimal::new(4210, 2));
        assert!(decimal_field(&payload, "c").is_err());
        assert!(decimal_field(&payload, "d").is_err());
    }

    #[test]
    fn test_uuid_field_rejects_garbage() {
        let payload = json!({ "order_id": "not-a-uuid" });
        assert!(matches!(
            uuid_field(&payload, "order_id"),
            Err(WebhookProcessorError::MalformedPayload(_))
        ));
    }
}
