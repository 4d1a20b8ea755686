//! Error handling for the AdHub backend
//!
//! This module provides a unified error system with HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    #[serde(rename = "INSUFFICIENT_FUNDS")]
    InsufficientFunds,
    #[serde(rename = "INVALID_SIGNATURE")]
    InvalidSignature,

    // Auth errors
    #[serde(rename = "UNAUTHENTICATED")]
    Unauthenticated,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Referenced organization, wallet, application, binding... is absent
    NotFound { entity: String, id: String },
    /// Operation attempted against an entity in the wrong lifecycle state
    InvalidState {
        entity: String,
        current: String,
        attempted: String,
    },
    /// Debit exceeds the wallet balance
    InsufficientFunds {
        available_cents: i64,
        required_cents: i64,
    },
    /// Payment provider callback failed signature verification
    InvalidSignature { provider: String },
}

#[derive(Debug, Clone)]
pub enum AuthError {
    /// Missing or invalid bearer token
    Unauthenticated { reason: String },
    /// Authenticated but not allowed to act on the target
    Forbidden { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
    /// Unexpected failure while handling an otherwise valid request
    Internal { message: String },
}

/// Payment provider API failures
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField { field: String },
    InvalidField { field: String, reason: String },
    InvalidAmount { amount: String, reason: String },
    OutOfRange {
        field: String,
        min: Option<String>,
        max: Option<String>,
    },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Auth(AuthError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }))
    }

    pub fn invalid_state(entity: &str, current: impl ToString, attempted: impl ToString) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::InvalidState {
            entity: entity.to_string(),
            current: current.to_string(),
            attempted: attempted.to_string(),
        }))
    }

    pub fn insufficient_funds(available_cents: i64, required_cents: i64) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::InsufficientFunds {
            available_cents,
            required_cents,
        }))
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Auth(AuthError::Unauthenticated {
            reason: reason.into(),
        }))
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Auth(AuthError::Forbidden {
            reason: reason.into(),
        }))
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: field.to_string(),
        }))
    }

    pub fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }))
    }

    pub fn invalid_amount(amount: impl ToString, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: amount.to_string(),
            reason: reason.into(),
        }))
    }

    pub fn below_minimum(field: &str, min: impl ToString) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::OutOfRange {
            field: field.to_string(),
            min: Some(min.to_string()),
            max: None,
        }))
    }

    pub fn invalid_signature(provider: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::InvalidSignature {
            provider: provider.into(),
        }))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Internal {
            message: message.into(),
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => 404,
                DomainError::InvalidState { .. } => 400,
                DomainError::InsufficientFunds { .. } => 400,
                DomainError::InvalidSignature { .. } => 400,
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::Unauthenticated { .. } => 401,
                AuthError::Forbidden { .. } => 403,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(_) => 502,
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => ErrorCode::NotFound,
                DomainError::InvalidState { .. } => ErrorCode::InvalidState,
                DomainError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
                DomainError::InvalidSignature { .. } => ErrorCode::InvalidSignature,
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::Unauthenticated { .. } => ErrorCode::Unauthenticated,
                AuthError::Forbidden { .. } => ErrorCode::Forbidden,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Internal { .. } => ErrorCode::InternalError,
            },
            AppErrorKind::External(_) => ErrorCode::PaymentProviderError,
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { entity, id } => {
                    format!("{} '{}' not found", entity, id)
                }
                DomainError::InvalidState {
                    entity,
                    current,
                    attempted,
                } => {
                    format!("Cannot {} {} in status '{}'", attempted, entity, current)
                }
                DomainError::InsufficientFunds {
                    available_cents,
                    required_cents,
                } => format!(
                    "Insufficient funds. Available: {} cents, Required: {} cents",
                    available_cents, required_cents
                ),
                DomainError::InvalidSignature { provider } => {
                    format!("Invalid {} webhook signature", provider)
                }
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::Unauthenticated { .. } => "Authentication required".to_string(),
                AuthError::Forbidden { reason } => format!("Forbidden: {}", reason),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(ExternalError::PaymentProvider {
                provider,
                is_retryable,
                ..
            }) => {
                if *is_retryable {
                    format!(
                        "Payment provider ({}) is temporarily unavailable. Please try again",
                        provider
                    )
                } else {
                    "Payment processing failed. Please contact support".to_string()
                }
            }
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::OutOfRange { field, min, max } => match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field '{}' must be between {} and {}", field, min, max)
                    }
                    (Some(min), None) => {
                        format!("Field '{}' must be at least {}", field, min)
                    }
                    (None, Some(max)) => {
                        format!("Field '{}' must be at most {}", field, max)
                    }
                    (None, None) => {
                        format!("Field '{}' is out of acceptable range", field)
                    }
                },
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) | AppErrorKind::Auth(_) | AppErrorKind::Validation(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Internal { .. } => true,
            },
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. })
            | AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            | AppErrorKind::Infrastructure(InfrastructureError::Internal { message })
            | AppErrorKind::External(ExternalError::PaymentProvider { message, .. }) => {
                write!(f, "{}", message)
            }
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
