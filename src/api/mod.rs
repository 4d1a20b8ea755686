//! HTTP surface, grouped by resource.

pub mod ad_accounts;
pub mod applications;
pub mod asset_bindings;
pub mod checkout;
pub mod top_up_requests;
pub mod wallet;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query,
    },
    routing::{get, patch, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::config::AppConfig;
use crate::database::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::health::{self, HealthChecker};
use crate::middleware::auth::TokenVerifier;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::factory::PaymentProviderFactory;
use crate::services::{
    ApplicationService, AssetBindingReconciler, CheckoutService, PaymentWebhookProcessor,
    TopUpService, WalletService,
};

/// Shared handler state. Every service talks to the same store.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn LedgerStore>,
    pub auth: Arc<TokenVerifier>,
    pub wallet: Arc<WalletService>,
    pub reconciler: Arc<AssetBindingReconciler>,
    pub applications: Arc<ApplicationService>,
    pub top_ups: Arc<TopUpService>,
    pub checkout: Arc<CheckoutService>,
    pub webhooks: Arc<PaymentWebhookProcessor>,
    pub health: Arc<HealthChecker>,
}

impl ApiState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        providers: Arc<PaymentProviderFactory>,
        config: &AppConfig,
    ) -> Self {
        let wallet = Arc::new(WalletService::new(store.clone()));

        Self {
            auth: Arc::new(TokenVerifier::new(&config.auth)),
            reconciler: Arc::new(AssetBindingReconciler::new(store.clone())),
            applications: Arc::new(ApplicationService::new(store.clone())),
            top_ups: Arc::new(TopUpService::new(store.clone(), &config.billing)),
            checkout: Arc::new(CheckoutService::new(
                store.clone(),
                providers.clone(),
                config.billing.clone(),
                config.public_api_base_url.clone(),
                config.app_url.clone(),
            )),
            webhooks: Arc::new(PaymentWebhookProcessor::new(
                store.clone(),
                providers.clone(),
                wallet.clone(),
            )),
            health: Arc::new(HealthChecker::new(store.clone(), providers)),
            wallet,
            store,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/health/live", get(health::liveness))
        // Wallet
        .route("/api/wallet", get(wallet::get_wallet))
        .route(
            "/api/wallet/transactions",
            get(wallet::list_transactions).post(wallet::create_transaction),
        )
        .route("/api/admin/transactions", post(wallet::admin_create_transaction))
        // Top-ups
        .route(
            "/api/top-up-requests",
            get(top_up_requests::list_requests).post(top_up_requests::create_request),
        )
        .route("/api/topup-requests/{id}", patch(top_up_requests::review_request))
        // Asset bindings
        .route(
            "/api/admin/asset-bindings",
            post(asset_bindings::bind).delete(asset_bindings::unbind),
        )
        // Applications
        .route(
            "/api/applications",
            get(applications::list_applications).post(applications::submit_application),
        )
        .route("/api/applications/{id}", get(applications::get_application))
        .route("/api/applications/{id}/cancel", post(applications::cancel_application))
        .route("/api/admin/applications", get(applications::admin_list_applications))
        .route("/api/admin/applications/{id}/approve", post(applications::approve))
        .route("/api/admin/applications/{id}/mark-ready", post(applications::mark_ready))
        .route("/api/admin/applications/{id}/reject", post(applications::reject))
        .route("/api/admin/applications/{id}/fulfill", post(applications::fulfill))
        .route(
            "/api/admin/applications/{id}/fulfill-pixel",
            post(applications::fulfill_pixel),
        )
        // Ad accounts
        .route("/api/ad-accounts", get(ad_accounts::list_ad_accounts))
        // Checkout and payment webhooks
        .route("/api/subscriptions/checkout", post(checkout::subscription_checkout))
        .route("/api/payments/checkout", post(checkout::wallet_checkout))
        .route("/api/payments/webhook", post(webhooks::card_webhook))
        .route("/api/payments/crypto/webhook", post(webhooks::crypto_webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn root() -> &'static str {
    "AdHub backend API"
}

/// Unwrap a JSON body, turning extractor rejections into validation errors.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::invalid_field("body", rejection.body_text()))
}

pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::invalid_field("query", rejection.body_text()))
}

pub(crate) fn path_param<T>(path: Result<Path<T>, PathRejection>) -> AppResult<T> {
    path.map(|Path(value)| value)
        .map_err(|rejection| AppError::invalid_field("path", rejection.body_text()))
}
