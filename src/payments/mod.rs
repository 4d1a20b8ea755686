pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::PaymentProviderFactory;
pub use provider::PaymentProvider;
pub use types::ProviderName;
