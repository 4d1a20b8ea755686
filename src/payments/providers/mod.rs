pub mod nowpayments;
pub mod stripe;

pub use nowpayments::{NowPaymentsConfig, NowPaymentsProvider};
pub use stripe::{StripeConfig, StripeProvider};
