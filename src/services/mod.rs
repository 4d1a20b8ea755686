//! Services module for business logic

pub mod application;
pub mod asset_binding;
pub mod checkout;
pub mod top_up;
pub mod wallet;
pub mod webhook_processor;

pub use application::{ApplicationService, CancelOutcome, SubmitApplication};
pub use asset_binding::{AssetBindingReconciler, AssetSpec, BindRequest, FulfillmentRequest};
pub use checkout::{CheckoutResponse, CheckoutService, WalletCheckout};
pub use top_up::{CreateTopUp, ReviewTopUp, TopUpService};
pub use wallet::{AddFunds, CreditOutcome, LedgerEntry, RecordTransaction, WalletService};
pub use webhook_processor::{PaymentWebhookProcessor, WebhookOutcome, WebhookProcessorError};
