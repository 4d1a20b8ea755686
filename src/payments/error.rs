use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Provider not configured: {provider}")]
    NotConfigured { provider: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NotConfigured { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::WebhookVerificationError { .. } => false,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::NotConfigured { .. } => 503,
            PaymentError::NetworkError { .. } => 502,
            PaymentError::RateLimitError { .. } => 502,
            PaymentError::WebhookVerificationError { .. } => 400,
            PaymentError::ProviderError { .. } => 502,
        }
    }

    fn provider_label(&self) -> String {
        match self {
            PaymentError::NotConfigured { provider } | PaymentError::ProviderError { provider, .. } => {
                provider.clone()
            }
            _ => "payments".to_string(),
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, ExternalError, ValidationError};

        match err {
            PaymentError::ValidationError { message, field } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                }))
            }
            PaymentError::WebhookVerificationError { .. } => {
                AppError::new(AppErrorKind::Domain(DomainError::InvalidSignature {
                    provider: err.provider_label(),
                }))
            }
            PaymentError::NotConfigured { provider } => {
                AppError::configuration(format!("payment provider {} is not configured", provider))
            }
            other => AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
                provider: other.provider_label(),
                message: other.to_string(),
                is_retryable: other.is_retryable(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::ValidationError {
                message: "bad".to_string(),
                field: None
            }
            .http_status_code(),
            400
        );
        assert_eq!(
            PaymentError::WebhookVerificationError {
                message: "bad signature".to_string()
            }
            .http_status_code(),
            400
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!PaymentError::NotConfigured {
            provider: "stripe".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn provider_failure_becomes_bad_gateway() {
        let err: AppError = PaymentError::ProviderError {
            provider: "stripe".to_string(),
            message: "HTTP 500".to_string(),
            provider_code: Some("500".to_string()),
            retryable: true,
        }
        .into();
        assert_eq!(err.status_code(), 502);
    }
}
