#![allow(dead_code)]

use std::sync::Arc;

use adhub_backend::database::models::{AssetType, NewAsset, Plan};
use adhub_backend::database::{LedgerStore, MemoryLedgerStore};
use adhub_backend::payments::providers::{
    NowPaymentsConfig, NowPaymentsProvider, StripeConfig, StripeProvider,
};
use adhub_backend::payments::utils::{
    hmac_sha512_hex, sign_timestamped_payload, unix_now,
};
use adhub_backend::payments::{PaymentProvider, PaymentProviderFactory, ProviderName};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const NOWPAYMENTS_IPN_SECRET: &str = "ipn_test_secret";

/// Providers configured with test secrets; no request ever leaves the process.
pub fn providers() -> Arc<PaymentProviderFactory> {
    let stripe = StripeProvider::new(StripeConfig {
        secret_key: "sk_test_123".to_string(),
        webhook_secret: Some(STRIPE_WEBHOOK_SECRET.to_string()),
        ..StripeConfig::default()
    })
    .unwrap();
    let nowpayments = NowPaymentsProvider::new(NowPaymentsConfig {
        api_key: "np_test_key".to_string(),
        ipn_secret: Some(NOWPAYMENTS_IPN_SECRET.to_string()),
        ..NowPaymentsConfig::default()
    })
    .unwrap();

    let providers: Vec<Arc<dyn PaymentProvider>> = vec![Arc::new(stripe), Arc::new(nowpayments)];
    Arc::new(PaymentProviderFactory::with_providers(
        ProviderName::Stripe,
        providers,
    ))
}

pub fn stripe_signature(payload: &[u8]) -> String {
    stripe_signature_at(payload, unix_now())
}

pub fn stripe_signature_at(payload: &[u8], timestamp: i64) -> String {
    sign_timestamped_payload(payload, STRIPE_WEBHOOK_SECRET, timestamp).unwrap()
}

pub fn nowpayments_signature(payload: &JsonValue) -> String {
    let canonical = serde_json::to_string(payload).unwrap();
    hmac_sha512_hex(canonical.as_bytes(), NOWPAYMENTS_IPN_SECRET).unwrap()
}

pub struct Fixture {
    pub store: MemoryLedgerStore,
    pub admin_id: Uuid,
    pub owner_id: Uuid,
    pub organization_id: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        let store = MemoryLedgerStore::new();
        let admin_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        store.add_profile(admin_id, "admin");
        store.add_profile(owner_id, "client");
        let organization = store.add_organization("Acme Ads", owner_id);

        Self {
            store,
            admin_id,
            owner_id,
            organization_id: organization.id,
        }
    }

    pub fn shared(&self) -> Arc<dyn LedgerStore> {
        Arc::new(self.store.clone())
    }

    pub fn ad_account(&self, dolphin_id: &str) -> Uuid {
        self.store
            .add_asset(NewAsset {
                r#type: AssetType::AdAccount,
                dolphin_id: dolphin_id.to_string(),
                name: format!("Account {}", dolphin_id),
                status: "active".to_string(),
                metadata: json!({ "business_manager_id": "bm_1" }),
            })
            .id
    }

    pub fn business_manager(&self, dolphin_id: &str) -> Uuid {
        self.store
            .add_asset(NewAsset {
                r#type: AssetType::BusinessManager,
                dolphin_id: dolphin_id.to_string(),
                name: format!("BM {}", dolphin_id),
                status: "active".to_string(),
                metadata: json!({}),
            })
            .id
    }

    pub fn subscribe_to_plan(&self, plan_id: &str, fee_percentage: f64) {
        self.store.add_plan(Plan {
            id: plan_id.to_string(),
            name: plan_id.to_string(),
            provider_price_id: Some(format!("price_{}", plan_id)),
            monthly_fee_cents: 9900,
            ad_spend_fee_percentage: fee_percentage,
            is_active: true,
        });
        self.store
            .set_organization_plan_id(self.organization_id, plan_id);
    }
}
