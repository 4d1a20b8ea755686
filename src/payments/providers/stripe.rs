use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    CheckoutMode, CheckoutRequest, CheckoutSession, LineItem, ProviderName, WebhookEvent,
    WebhookVerificationResult,
};
use crate::payments::utils::{unix_now, verify_timestamped_signature, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl StripeConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("STRIPE_SECRET_KEY").map_err(|_| PaymentError::NotConfigured {
                provider: "stripe".to_string(),
            })?;

        Ok(Self {
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
            base_url: std::env::var("STRIPE_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            timeout_secs: std::env::var("STRIPE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("STRIPE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            secret_key,
        })
    }
}

pub struct StripeProvider {
    config: StripeConfig,
    http: PaymentHttpClient,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            "stripe",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Form fields for `POST /v1/checkout/sessions`.
    fn checkout_form(request: &CheckoutRequest) -> PaymentResult<Vec<(String, String)>> {
        let mut form = vec![
            ("mode".to_string(), request.mode.as_str().to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("client_reference_id".to_string(), request.reference.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];

        match &request.line_item {
            LineItem::Price { price_id } => {
                form.push(("line_items[0][price]".to_string(), price_id.clone()));
            }
            LineItem::Amount {
                name,
                amount_cents,
                currency,
            } => {
                if *amount_cents <= 0 {
                    return Err(PaymentError::ValidationError {
                        message: "amount must be greater than zero".to_string(),
                        field: Some("amount".to_string()),
                    });
                }
                form.push((
                    "line_items[0][price_data][currency]".to_string(),
                    currency.to_lowercase(),
                ));
                form.push((
                    "line_items[0][price_data][unit_amount]".to_string(),
                    amount_cents.to_string(),
                ));
                form.push((
                    "line_items[0][price_data][product_data][name]".to_string(),
                    name.clone(),
                ));
            }
        }

        if let Some(customer) = &request.customer_id {
            form.push(("customer".to_string(), customer.clone()));
        } else if let Some(email) = &request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }

        let nested = match request.mode {
            CheckoutMode::Payment => "payment_intent_data",
            CheckoutMode::Subscription => "subscription_data",
        };
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
            form.push((format!("{}[metadata][{}]", nested, key), value.clone()));
        }

        Ok(form)
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        let form = Self::checkout_form(&request)?;

        let raw: StripeCheckoutSession = self
            .http
            .request_form(
                reqwest::Method::POST,
                &self.endpoint("/v1/checkout/sessions"),
                Some(&self.config.secret_key),
                &form,
                &[],
            )
            .await?;
        info!(session_id = %raw.id, mode = request.mode.as_str(), "stripe checkout session created");

        Ok(CheckoutSession {
            provider: ProviderName::Stripe,
            session_id: raw.id,
            url: raw.url,
            provider_data: Some(serde_json::json!({ "amount_total": raw.amount_total })),
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::Stripe
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["USD", "EUR", "GBP"]
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let secret =
            self.config
                .webhook_secret
                .as_deref()
                .ok_or(PaymentError::NotConfigured {
                    provider: "stripe webhook secret".to_string(),
                })?;

        Ok(
            match verify_timestamped_signature(payload, secret, signature, unix_now()) {
                Ok(()) => WebhookVerificationResult {
                    valid: true,
                    reason: None,
                },
                Err(reason) => WebhookVerificationResult {
                    valid: false,
                    reason: Some(reason),
                },
            },
        )
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::ValidationError {
                message: format!("invalid webhook JSON payload: {}", e),
                field: Some("body".to_string()),
            }
        })?;

        let event_type = parsed
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let event_id = parsed
            .get("id")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());

        Ok(WebhookEvent {
            provider: ProviderName::Stripe,
            event_id,
            event_type,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
}
