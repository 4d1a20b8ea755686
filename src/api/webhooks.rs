use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::api::ApiState;
use crate::error::{AppError, AppResult};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::types::ProviderName;

const CARD_SIGNATURE_HEADER: &str = "stripe-signature";
const CRYPTO_SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// POST /api/payments/webhook
pub async fn card_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    handle(&state, ProviderName::Stripe, CARD_SIGNATURE_HEADER, &headers, &body).await
}

/// POST /api/payments/crypto/webhook
pub async fn crypto_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<JsonValue>> {
    handle(
        &state,
        ProviderName::NowPayments,
        CRYPTO_SIGNATURE_HEADER,
        &headers,
        &body,
    )
    .await
}

/// Signatures are checked against the raw body, so it is never re-serialized before verification.
async fn handle(
    state: &ApiState,
    provider: ProviderName,
    header: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<Json<JsonValue>> {
    info!(provider = %provider, bytes = body.len(), "Received webhook");

    let signature = headers.get(header).and_then(|v| v.to_str().ok());
    let outcome = state
        .webhooks
        .process_webhook(provider, signature, body)
        .await
        .map_err(|err| {
            let err = AppError::from(err);
            match get_request_id_from_headers(headers) {
                Some(id) => err.with_request_id(id),
                None => err,
            }
        })?;

    Ok(Json(json!({ "received": true, "result": outcome })))
}
