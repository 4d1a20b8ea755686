use crate::payments::error::PaymentResult;
use crate::payments::types::{
    CheckoutRequest, CheckoutSession, ProviderName, WebhookEvent, WebhookVerificationResult,
};
use async_trait::async_trait;

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout (session or invoice) the customer is redirected to.
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession>;

    fn name(&self) -> ProviderName;

    fn supported_currencies(&self) -> &'static [&'static str];

    /// Check the signature header against the raw request body.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CheckoutMode, LineItem};
    use std::collections::BTreeMap;

    struct MockProvider;

    #[async_trait]
    impl PaymentProvider for MockProvider {
        async fn create_checkout(
            &self,
            request: CheckoutRequest,
        ) -> PaymentResult<CheckoutSession> {
            Ok(CheckoutSession {
                provider: ProviderName::Stripe,
                session_id: format!("cs_{}", request.reference),
                url: Some("https://example.com/pay".to_string()),
                provider_data: None,
            })
        }

        fn name(&self) -> ProviderName {
            ProviderName::Stripe
        }

        fn supported_currencies(&self) -> &'static [&'static str] {
            &["USD"]
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> PaymentResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: true,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
            Ok(WebhookEvent {
                provider: ProviderName::Stripe,
                event_id: None,
                event_type: "mock".to_string(),
                payload: serde_json::json!({}),
                received_at: chrono::Utc::now().to_rfc3339(),
            })
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_provider() {
        let provider: Box<dyn PaymentProvider> = Box::new(MockProvider);
        let session = provider
            .create_checkout(CheckoutRequest {
                mode: CheckoutMode::Payment,
                line_item: LineItem::Amount {
                    name: "Wallet top-up".to_string(),
                    amount_cents: 1030,
                    currency: "USD".to_string(),
                },
                reference: "org_1".to_string(),
                customer_email: None,
                customer_id: None,
                success_url: "https://app/success".to_string(),
                cancel_url: "https://app/cancel".to_string(),
                callback_url: None,
                metadata: BTreeMap::new(),
            })
            .await
            .expect("checkout should succeed");
        assert_eq!(session.session_id, "cs_org_1");
        assert!(provider.verify_webhook(b"{}", "sig").unwrap().valid);
    }
}
