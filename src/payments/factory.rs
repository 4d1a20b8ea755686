use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{NowPaymentsProvider, StripeProvider};
use crate::payments::types::ProviderName;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PaymentFactoryConfig {
    pub default_provider: ProviderName,
    pub enabled_providers: Vec<ProviderName>,
}

impl PaymentFactoryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let default_provider =
            std::env::var("DEFAULT_PAYMENT_PROVIDER").unwrap_or_else(|_| "stripe".to_string());
        let default_provider = ProviderName::from_str(&default_provider)?;

        let enabled_raw = std::env::var("ENABLED_PAYMENT_PROVIDERS")
            .unwrap_or_else(|_| "stripe,nowpayments".to_string());
        let mut enabled_providers = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            enabled_providers.push(ProviderName::from_str(value)?);
        }

        if !enabled_providers.contains(&default_provider) {
            return Err(PaymentError::ValidationError {
                message: "default provider must be enabled".to_string(),
                field: Some("DEFAULT_PAYMENT_PROVIDER".to_string()),
            });
        }

        Ok(Self {
            default_provider,
            enabled_providers,
        })
    }
}

/// Holds one client per provider that is both enabled and has credentials.
pub struct PaymentProviderFactory {
    default_provider: ProviderName,
    providers: HashMap<ProviderName, Arc<dyn PaymentProvider>>,
}

impl PaymentProviderFactory {
    pub fn from_env() -> PaymentResult<Self> {
        let config = PaymentFactoryConfig::from_env()?;
        let mut providers: Vec<Arc<dyn PaymentProvider>> = Vec::new();

        for name in &config.enabled_providers {
            let built: PaymentResult<Arc<dyn PaymentProvider>> = match name {
                ProviderName::Stripe => {
                    StripeProvider::from_env().map(|p| Arc::new(p) as Arc<dyn PaymentProvider>)
                }
                ProviderName::NowPayments => NowPaymentsProvider::from_env()
                    .map(|p| Arc::new(p) as Arc<dyn PaymentProvider>),
            };
            match built {
                Ok(provider) => {
                    info!(provider = %name, "payment provider enabled");
                    providers.push(provider);
                }
                Err(PaymentError::NotConfigured { .. }) => {
                    warn!(provider = %name, "payment provider has no credentials, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self::with_providers(config.default_provider, providers))
    }

    pub fn with_providers(
        default_provider: ProviderName,
        providers: Vec<Arc<dyn PaymentProvider>>,
    ) -> Self {
        Self {
            default_provider,
            providers: providers.into_iter().map(|p| (p.name(), p)).collect(),
        }
    }

    /// Factory without any provider, for runs without external services.
    pub fn empty() -> Self {
        Self::with_providers(ProviderName::Stripe, Vec::new())
    }

    pub fn get_provider(&self, provider: ProviderName) -> PaymentResult<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&provider)
            .cloned()
            .ok_or(PaymentError::NotConfigured {
                provider: provider.to_string(),
            })
    }

    pub fn get_default_provider(&self) -> PaymentResult<Arc<dyn PaymentProvider>> {
        self.get_provider(self.default_provider)
    }

    pub fn list_available_providers(&self) -> Vec<ProviderName> {
        let mut names: Vec<ProviderName> = self.providers.keys().copied().collect();
        names.sort_by_key(|n| n.as_str());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::providers::{StripeConfig, StripeProvider};

    #[test]
    fn list_available_providers_returns_configured() {
        let stripe = StripeProvider::new(StripeConfig {
            secret_key: "sk_test".to_string(),
            ..StripeConfig::default()
        })
        .unwrap();
        let factory =
            PaymentProviderFactory::with_providers(ProviderName::Stripe, vec![Arc::new(stripe)]);

        assert_eq!(factory.list_available_providers(), vec![ProviderName::Stripe]);
        assert!(factory.get_default_provider().is_ok());
        assert!(matches!(
            factory.get_provider(ProviderName::NowPayments),
            Err(PaymentError::NotConfigured { .. })
        ));
    }

    #[test]
    fn empty_factory_has_no_providers() {
        assert!(PaymentProviderFactory::empty()
            .list_available_providers()
            .is_empty());
    }
}
