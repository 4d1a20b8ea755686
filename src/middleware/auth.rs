//! Bearer token authentication and access checks.
//!
//! Tokens are HS256 JWTs issued by the hosted auth provider. The `sub` claim
//! carries the user id; admin rights and organization membership are looked
//! up in the ledger store on each request.

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ApiState;
use crate::config::AuthConfig;
use crate::database::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::middleware::error::get_request_id_from_headers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    pub exp: usize,
}

pub struct TokenVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    audience: Option<String>,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &config.audience {
            Some(audience) => validation.set_audience(std::slice::from_ref(audience)),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            audience: config.audience.clone(),
        }
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| AppError::unauthenticated(format!("invalid access token: {err}")))?;
        Ok(data.claims)
    }

    /// Sign a token the same way the auth provider does. Used for local runs and tests.
    pub fn issue(&self, user_id: Uuid, email: Option<&str>, ttl_secs: i64) -> AppResult<String> {
        let exp = usize::try_from(Utc::now().timestamp() + ttl_secs)
            .map_err(|_| AppError::configuration("token expiry does not fit into usize"))?;
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            role: Some("authenticated".to_string()),
            aud: self.audience.clone(),
            exp,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AppError::configuration(format!("failed to sign jwt: {err}")))
    }
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub request_id: Option<String>,
}

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let request_id = get_request_id_from_headers(&parts.headers);
        let attach = |err: AppError| match &request_id {
            Some(id) => err.with_request_id(id.clone()),
            None => err,
        };

        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| attach(AppError::unauthenticated("missing authorization header")))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| attach(AppError::unauthenticated("expected a bearer token")))?;

        let claims = state.auth.verify(token).map_err(attach)?;
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| attach(AppError::unauthenticated("token subject is not a user id")))?;

        Ok(AuthUser {
            id,
            email: claims.email,
            request_id,
        })
    }
}

impl AuthUser {
    /// Tag an error with this request's id.
    pub fn tag(&self, err: AppError) -> AppError {
        match &self.request_id {
            Some(id) => err.with_request_id(id.clone()),
            None => err,
        }
    }
}

pub async fn is_admin(store: &dyn LedgerStore, user: &AuthUser) -> AppResult<bool> {
    Ok(store.is_admin(user.id).await?)
}

pub async fn require_admin(store: &dyn LedgerStore, user: &AuthUser) -> AppResult<()> {
    if is_admin(store, user).await? {
        Ok(())
    } else {
        Err(user.tag(AppError::forbidden("admin access required")))
    }
}

/// Admins pass for every organization. Returns whether the caller is an admin.
pub async fn require_member(
    store: &dyn LedgerStore,
    user: &AuthUser,
    organization_id: Uuid,
) -> AppResult<bool> {
    if is_admin(store, user).await? {
        return Ok(true);
    }
    if store.is_member(user.id, organization_id).await? {
        Ok(false)
    } else {
        Err(user.tag(AppError::forbidden("not a member of this organization")))
    }
}
