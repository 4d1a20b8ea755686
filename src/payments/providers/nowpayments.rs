use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    CheckoutMode, CheckoutRequest, CheckoutSession, LineItem, ProviderName, WebhookEvent,
    WebhookVerificationResult,
};
use crate::payments::utils::{verify_hmac_sha512_hex, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct NowPaymentsConfig {
    pub api_key: String,
    pub ipn_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for NowPaymentsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            ipn_secret: None,
            base_url: "https://api.nowpayments.io".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl NowPaymentsConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let api_key =
            std::env::var("NOWPAYMENTS_API_KEY").map_err(|_| PaymentError::NotConfigured {
                provider: "nowpayments".to_string(),
            })?;

        Ok(Self {
            ipn_secret: std::env::var("NOWPAYMENTS_IPN_SECRET").ok(),
            base_url: std::env::var("NOWPAYMENTS_BASE_URL")
                .unwrap_or_else(|_| "https://api.nowpayments.io".to_string()),
            timeout_secs: std::env::var("NOWPAYMENTS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("NOWPAYMENTS_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            api_key,
        })
    }
}

pub struct NowPaymentsProvider {
    config: NowPaymentsConfig,
    http: PaymentHttpClient,
}

impl NowPaymentsProvider {
    pub fn new(config: NowPaymentsConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            "nowpayments",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(NowPaymentsConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn invoice_payload(request: &CheckoutRequest) -> PaymentResult<JsonValue> {
        if request.mode != CheckoutMode::Payment {
            return Err(PaymentError::ValidationError {
                message: "nowpayments only supports one-off payments".to_string(),
                field: Some("mode".to_string()),
            });
        }
        let (name, amount_cents, currency) = match &request.line_item {
            LineItem::Amount {
                name,
                amount_cents,
                currency,
            } => (name, *amount_cents, currency),
            LineItem::Price { .. } => {
                return Err(PaymentError::ValidationError {
                    message: "nowpayments invoices need an explicit amount".to_string(),
                    field: Some("amount".to_string()),
                })
            }
        };
        if amount_cents <= 0 {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }

        Ok(serde_json::json!({
            "price_amount": amount_cents as f64 / 100.0,
            "price_currency": currency.to_lowercase(),
            "order_id": request.reference,
            "order_description": name,
            "ipn_callback_url": request.callback_url,
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
        }))
    }
}

#[async_trait]
impl PaymentProvider for NowPaymentsProvider {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        let payload = Self::invoice_payload(&request)?;

        let raw: NowPaymentsInvoice = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/invoice"),
                None,
                Some(&payload),
                &[
                    ("x-api-key", self.config.api_key.as_str()),
                    ("Content-Type", "application/json"),
                ],
            )
            .await?;
        let session_id = match &raw.id {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        info!(invoice_id = %session_id, order_id = %request.reference, "nowpayments invoice created");

        Ok(CheckoutSession {
            provider: ProviderName::NowPayments,
            session_id,
            url: raw.invoice_url,
            provider_data: None,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::NowPayments
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        &["USD"]
    }

    /// The IPN signature is an HMAC-SHA512 over the body re-serialised with sorted keys.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let secret = self
            .config
            .ipn_secret
            .as_deref()
            .ok_or(PaymentError::NotConfigured {
                provider: "nowpayments ipn secret".to_string(),
            })?;

        let parsed: JsonValue = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(_) => {
                return Ok(WebhookVerificationResult {
                    valid: false,
                    reason: Some("body is not valid JSON".to_string()),
                })
            }
        };
        // serde_json maps are key-ordered, so this is the sorted compact form.
        let canonical = serde_json::to_string(&parsed).map_err(|e| PaymentError::ValidationError {
            message: format!("failed to serialize webhook payload: {}", e),
            field: None,
        })?;
        let valid = verify_hmac_sha512_hex(canonical.as_bytes(), secret, signature);

        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid nowpayments signature".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::ValidationError {
                message: format!("invalid webhook JSON payload: {}", e),
                field: Some("body".to_string()),
            }
        })?;

        let event_type = parsed
            .get("payment_status")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let event_id = parsed.get("payment_id").and_then(|v| match v {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(WebhookEvent {
            provider: ProviderName::NowPayments,
            event_id,
            event_type,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct NowPaymentsInvoice {
    id: JsonValue,
    #[serde(default)]
    invoice_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::hmac_sha512_hex;
    use std::collections::BTreeMap;

    fn provider() -> NowPaymentsProvider {
        NowPaymentsProvider::new(NowPaymentsConfig {
            api_key: "np_test".to_string(),
            ipn_secret: Some("ipn_secret".to_string()),
            ..NowPaymentsConfig::default()
        })
        .expect("provider init should succeed")
    }

    #[test]
    fn signature_is_computed_over_sorted_body() {
        let body = br#"{"payment_status":"finished","payment_id":42,"order_id":"org"}"#;
        let canonical = r#"{"order_id":"org","payment_id":42,"payment_status":"finished"}"#;
        let signature = hmac_sha512_hex(canonical.as_bytes(), "ipn_secret").unwrap();

        assert!(provider().verify_webhook(body, &signature).unwrap().valid);
        assert!(!provider().verify_webhook(body, "00ff").unwrap().valid);
    }

    #[test]
    fn nested_keys_are_sorted_before_signing() {
        let body = br#"{"b":1,"a":{"d":[2,{"z":1,"y":2}],"c":"x"}}"#;
        let canonical = r#"{"a":{"c":"x","d":[2,{"y":2,"z":1}]},"b":1}"#;
        let signature = hmac_sha512_hex(canonical.as_bytes(), "ipn_secret").unwrap();

        assert!(provider().verify_webhook(body, &signature).unwrap().valid);
    }

    #[test]
    fn numeric_payment_id_becomes_event_id() {
        let event = provider()
            .parse_webhook_event(br#"{"payment_status":"finished","payment_id":42}"#)
            .unwrap();
        assert_eq!(event.event_type, "finished");
        assert_eq!(event.event_id.as_deref(), Some("42"));
    }

    #[test]
    fn invoice_requires_payment_mode() {
        let request = CheckoutRequest {
            mode: CheckoutMode::Subscription,
            line_item: LineItem::Price {
                price_id: "price_1".to_string(),
            },
            reference: "org".to_string(),
            customer_email: None,
            customer_id: None,
            success_url: "https://app/s".to_string(),
            cancel_url: "https://app/c".to_string(),
            callback_url: None,
            metadata: BTreeMap::new(),
        };
        assert!(NowPaymentsProvider::invoice_payload(&request).is_err());
    }
}
