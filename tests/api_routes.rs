//! Router-level tests: auth, status mapping and response shapes.

mod common;

use adhub_backend::api::{router, ApiState};
use adhub_backend::config::{
    AppConfig, AuthConfig, BillingConfig, LogFormat, LoggingConfig, ServerConfig,
};
use adhub_backend::services::{AssetBindingReconciler, BindRequest};
use axum::body::{to_bytes, Body};
use axum::Router;
use common::{providers, Fixture};
use http::{header, Request, StatusCode};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

fn config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        },
        database: None,
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Plain,
        },
        auth: AuthConfig {
            jwt_secret: "test-jwt-secret-with-enough-length".to_string(),
            audience: None,
        },
        billing: BillingConfig::default(),
        public_api_base_url: "http://localhost:8000".to_string(),
        app_url: "http://localhost:3000".to_string(),
        skip_externals: true,
    }
}

struct TestApp {
    fixture: Fixture,
    state: ApiState,
    app: Router,
}

impl TestApp {
    fn new() -> Self {
        let fixture = Fixture::new();
        let state = ApiState::new(fixture.shared(), providers(), &config());
        let app = router(state.clone());
        Self {
            fixture,
            state,
            app,
        }
    }

    fn token(&self, user_id: Uuid) -> String {
        self.state.auth.issue(user_id, Some("ops@example.com"), 3600).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, http::HeaderMap, JsonValue) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                JsonValue::String(String::from_utf8_lossy(&bytes).to_string())
            })
        };
        (status, headers, body)
    }

    async fn get(&self, uri: &str, user: Option<Uuid>) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        let (status, _, body) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, body)
    }

    async fn post(&self, uri: &str, user: Uuid, body: JsonValue) -> (StatusCode, JsonValue) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, body)
    }
}

#[tokio::test]
async fn liveness_answers_without_auth() {
    let app = TestApp::new();

    let (status, body) = app.get("/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Healthy");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health/live")
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = app.send(request).await;
    assert!(headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn wallet_requires_a_bearer_token() {
    let app = TestApp::new();
    let uri = format!("/api/wallet?organization_id={}", app.fixture.organization_id);

    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let request = Request::builder()
        .uri(&uri)
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn members_see_their_wallet_and_outsiders_are_forbidden() {
    let app = TestApp::new();
    app.fixture
        .store
        .set_balance(app.fixture.organization_id, 12_550);
    let uri = format!("/api/wallet?organization_id={}", app.fixture.organization_id);

    let (status, body) = app.get(&uri, Some(app.fixture.owner_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance_cents"], 12_550);
    assert_eq!(body["balance"], "125.50");
    assert_eq!(body["currency"], "USD");

    let outsider = Uuid::new_v4();
    let (status, body) = app.get(&uri, Some(outsider)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn only_admins_record_credits() {
    let app = TestApp::new();
    let deposit = json!({
        "organization_id": app.fixture.organization_id,
        "amount": "50.00",
        "type": "deposit",
        "description": "manual adjustment"
    });

    let (status, _) = app
        .post("/api/wallet/transactions", app.fixture.owner_id, deposit.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post("/api/admin/transactions", app.fixture.admin_id, deposit)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["wallet"]["balance_cents"], 5000);
    assert_eq!(
        body["transaction"]["metadata"]["recorded_by"],
        app.fixture.admin_id.to_string()
    );

    let (status, body) = app
        .post(
            "/api/wallet/transactions",
            app.fixture.owner_id,
            json!({
                "organization_id": app.fixture.organization_id,
                "amount": "80.00",
                "type": "spend"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
    assert_eq!(body["details"]["available_cents"], 5000);
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/transactions")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", app.token(app.fixture.admin_id)),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"organization_id\": 42"))
        .unwrap();

    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn ad_accounts_are_paginated() {
    let app = TestApp::new();
    let reconciler = AssetBindingReconciler::new(app.fixture.shared());
    for n in 0..3 {
        let asset_id = app.fixture.ad_account(&format!("act_{}", n));
        reconciler
            .bind(BindRequest {
                asset_id,
                organization_id: app.fixture.organization_id,
                bound_by: None,
                spend_limit_cents: None,
                fee_percentage: None,
            })
            .await
            .unwrap();
    }
    // Bound elsewhere, never listed for this organization.
    let other_org = app
        .fixture
        .store
        .add_organization("Other", Uuid::new_v4());
    reconciler
        .bind(BindRequest {
            asset_id: app.fixture.ad_account("act_other"),
            organization_id: other_org.id,
            bound_by: None,
            spend_limit_cents: None,
            fee_percentage: None,
        })
        .await
        .unwrap();

    let uri = format!(
        "/api/ad-accounts?organization_id={}&page=2&limit=2",
        app.fixture.organization_id
    );
    let (status, body) = app.get(&uri, Some(app.fixture.owner_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accounts"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({ "page": 2, "limit": 2, "total": 3, "total_pages": 2 })
    );

    let (status, body) = app.get("/api/ad-accounts", Some(app.fixture.admin_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 4);

    let (status, _) = app.get("/api/ad-accounts", Some(app.fixture.owner_id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn huge_page_number_returns_an_empty_page() {
    let app = TestApp::new();
    let reconciler = AssetBindingReconciler::new(app.fixture.shared());
    reconciler
        .bind(BindRequest {
            asset_id: app.fixture.ad_account("act_far"),
            organization_id: app.fixture.organization_id,
            bound_by: None,
            spend_limit_cents: None,
            fee_percentage: None,
        })
        .await
        .unwrap();

    let uri = format!(
        "/api/ad-accounts?organization_id={}&page={}&limit=20",
        app.fixture.organization_id,
        i64::MAX
    );
    let (status, body) = app.get(&uri, Some(app.fixture.owner_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accounts"].as_array().unwrap().is_empty());
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn application_flow_over_http() {
    let app = TestApp::new();
    let bm_id = app.fixture.business_manager("bm_http");

    let (status, created) = app
        .post(
            "/api/applications",
            app.fixture.owner_id,
            json!({
                "organization_id": app.fixture.organization_id,
                "request_type": "new_business_manager",
                "name": "Agency BM"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(
            &format!("/api/admin/applications/{}/approve", id),
            app.fixture.owner_id,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = app
        .post(
            &format!("/api/admin/applications/{}/approve", id),
            app.fixture.admin_id,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "processing");

    let fulfill_uri = format!("/api/admin/applications/{}/fulfill", id);
    let (status, fulfilled) = app
        .post(&fulfill_uri, app.fixture.admin_id, json!({ "asset_ids": [bm_id] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fulfilled["application"]["status"], "fulfilled");
    assert_eq!(fulfilled["bindings"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .post(&fulfill_uri, app.fixture.admin_id, json!({ "asset_ids": [bm_id] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, detail) = app
        .get(&format!("/api/applications/{}", id), Some(app.fixture.owner_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "fulfilled");
    assert_eq!(detail["fulfillments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_application_is_404() {
    let app = TestApp::new();

    let (status, body) = app
        .get(
            &format!("/api/applications/{}", Uuid::new_v4()),
            Some(app.fixture.owner_id),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_path_id_is_a_json_validation_error() {
    let app = TestApp::new();

    let (status, body) = app
        .get("/api/applications/not-a-uuid", Some(app.fixture.owner_id))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = TestApp::new();
    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_1" } }
    })
    .to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(Body::from(payload))
        .unwrap();
    let (status, _, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn signed_webhook_credits_over_http() {
    let app = TestApp::new();
    let payload = serde_json::to_vec(&json!({
        "id": "evt_http",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_http",
            "mode": "payment",
            "payment_status": "paid",
            "payment_intent": "pi_http",
            "amount_total": 2500,
            "metadata": { "organization_id": app.fixture.organization_id.to_string() }
        }}
    }))
    .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("stripe-signature", common::stripe_signature(&payload))
        .body(Body::from(payload))
        .unwrap();
    let (status, _, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["result"]["outcome"], "credited");
    assert_eq!(body["result"]["amount_cents"], 2500);
}

#[tokio::test]
async fn unhandled_webhook_event_is_acknowledged() {
    let app = TestApp::new();
    let payload = serde_json::to_vec(&json!({
        "id": "evt_invoice_http",
        "type": "invoice.paid",
        "data": { "object": { "id": "in_http", "amount_paid": 4900 } }
    }))
    .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("stripe-signature", common::stripe_signature(&payload))
        .body(Body::from(payload))
        .unwrap();
    let (status, _, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["result"]["outcome"], "ignored");

    let (status, wallet) = app
        .get(
            &format!("/api/wallet?organization_id={}", app.fixture.organization_id),
            Some(app.fixture.owner_id),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["balance_cents"], 0);
}

#[tokio::test]
async fn webhook_for_missing_wallet_is_not_redelivered() {
    let app = TestApp::new();
    let payload = serde_json::to_vec(&json!({
        "id": "evt_orphan_http",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_orphan",
            "mode": "payment",
            "payment_status": "paid",
            "payment_intent": "pi_orphan_http",
            "amount_total": 2500,
            "metadata": { "organization_id": Uuid::new_v4().to_string() }
        }}
    }))
    .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("stripe-signature", common::stripe_signature(&payload))
        .body(Body::from(payload))
        .unwrap();
    let (status, _, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["outcome"], "rejected");
}
