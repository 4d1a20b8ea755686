//! Ledger store entities.
//!
//! Status and type columns are stored as TEXT and decoded through the
//! `TryFrom<String>` impls generated by `text_enum!`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Declares a TEXT-backed enum with `as_str`, `Display`, `FromStr` and `TryFrom<String>`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

text_enum!(TransactionType {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Spend => "spend",
    Refund => "refund",
});

impl TransactionType {
    /// Deposits and refunds increase the balance.
    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::Refund)
    }
}

text_enum!(TransactionStatus {
    Completed => "completed",
    Pending => "pending",
    Failed => "failed",
    Cancelled => "cancelled",
});

text_enum!(AssetType {
    BusinessManager => "business_manager",
    AdAccount => "ad_account",
    Pixel => "pixel",
});

text_enum!(BindingStatus {
    Active => "active",
    Inactive => "inactive",
});

text_enum!(RequestType {
    NewBusinessManager => "new_business_manager",
    AdAccount => "ad_account",
    PixelConnection => "pixel_connection",
});

text_enum!(ApplicationStatus {
    Pending => "pending",
    Processing => "processing",
    UnderReview => "under_review",
    Fulfilled => "fulfilled",
    Rejected => "rejected",
    Cancelled => "cancelled",
});

text_enum!(
    /// Lifecycle actions that move an application between statuses.
    ApplicationAction {
        Approve => "approve",
        MarkReady => "mark_ready",
        Fulfill => "fulfill",
        Reject => "reject",
        Cancel => "cancel",
    }
);

impl ApplicationStatus {
    /// Next status for `action`, or `None` when the transition is not allowed.
    ///
    /// Cancelling a rejected application is handled by deleting the row, so it
    /// has no target status here.
    pub fn transition(self, action: ApplicationAction) -> Option<ApplicationStatus> {
        use ApplicationAction as A;
        use ApplicationStatus as S;

        match (self, action) {
            (S::Pending, A::Approve) => Some(S::Processing),
            (S::Processing, A::MarkReady) => Some(S::UnderReview),
            (S::Processing | S::UnderReview, A::Fulfill) => Some(S::Fulfilled),
            (S::Pending | S::Processing, A::Reject) => Some(S::Rejected),
            (S::Pending | S::Processing | S::UnderReview, A::Cancel) => Some(S::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Fulfilled | ApplicationStatus::Rejected | ApplicationStatus::Cancelled
        )
    }
}

text_enum!(TopUpStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Rejected => "rejected",
});

impl TopUpStatus {
    pub fn can_transition_to(self, next: TopUpStatus) -> bool {
        use TopUpStatus as T;

        matches!(
            (self, next),
            (T::Pending, T::Processing | T::Completed | T::Rejected)
                | (T::Processing, T::Completed | T::Rejected)
        )
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub plan_id: Option<String>,
    pub subscription_status: Option<String>,
    pub billing_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub balance_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub wallet_id: Uuid,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub r#type: TransactionType,
    pub amount_cents: i64,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub provider: Option<String>,
    pub provider_reference: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub organization_id: Uuid,
    pub wallet_id: Uuid,
    pub r#type: TransactionType,
    pub amount_cents: i64,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub provider: Option<String>,
    pub provider_reference: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Asset {
    pub id: Uuid,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub r#type: AssetType,
    pub dolphin_id: String,
    pub name: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAsset {
    #[serde(rename = "type")]
    pub r#type: AssetType,
    pub dolphin_id: String,
    pub name: String,
    #[serde(default = "default_asset_status")]
    pub status: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_asset_status() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssetBinding {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub organization_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: BindingStatus,
    pub is_active: bool,
    pub spend_limit_cents: Option<i64>,
    pub fee_percentage: Option<f64>,
    pub bound_by: Option<Uuid>,
    pub bound_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBinding {
    pub asset_id: Uuid,
    pub organization_id: Uuid,
    pub spend_limit_cents: Option<i64>,
    pub fee_percentage: Option<f64>,
    pub bound_by: Option<Uuid>,
}

/// Result of a binding upsert: the row plus whether it was newly inserted.
#[derive(Debug, Clone)]
pub struct BindingUpsert {
    pub binding: AssetBinding,
    pub created: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Application {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[sqlx(try_from = "String")]
    pub request_type: RequestType,
    #[sqlx(try_from = "String")]
    pub status: ApplicationStatus,
    pub name: Option<String>,
    pub pixel_id: Option<String>,
    pub target_bm_id: Option<String>,
    pub requested_amount_cents: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_by: Uuid,
    pub reviewed_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub fulfilled_by: Option<Uuid>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub organization_id: Uuid,
    pub request_type: RequestType,
    pub name: Option<String>,
    pub pixel_id: Option<String>,
    pub target_bm_id: Option<String>,
    pub requested_amount_cents: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct ApplicationStatusChange {
    pub status: ApplicationStatus,
    pub actor: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub organization_id: Option<Uuid>,
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApplicationFulfillment {
    pub id: Uuid,
    pub application_id: Uuid,
    pub asset_id: Uuid,
    pub fulfilled_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TopUpRequest {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ad_account_id: Uuid,
    pub amount_cents: i64,
    #[sqlx(try_from = "String")]
    pub status: TopUpStatus,
    pub notes: Option<String>,
    pub approved_amount_cents: Option<i64>,
    pub admin_notes: Option<String>,
    pub requested_by: Uuid,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTopUpRequest {
    pub organization_id: Uuid,
    pub ad_account_id: Uuid,
    pub amount_cents: i64,
    pub notes: Option<String>,
    pub requested_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct TopUpRequestUpdate {
    pub status: TopUpStatus,
    pub approved_amount_cents: Option<i64>,
    pub admin_notes: Option<String>,
    pub processed_by: Uuid,
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub provider_price_id: Option<String>,
    pub monthly_fee_cents: i64,
    pub ad_spend_fee_percentage: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub plan_id: String,
    pub provider_subscription_id: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub organization_id: Uuid,
    pub plan_id: String,
    pub provider_subscription_id: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Ad-account asset joined with its active binding.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AdAccountRow {
    pub id: Uuid,
    pub dolphin_id: String,
    pub name: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub business_manager_id: Option<String>,
    pub binding_id: Uuid,
    pub organization_id: Uuid,
    pub spend_limit_cents: Option<i64>,
    pub fee_percentage: Option<f64>,
    pub bound_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AdAccountQuery {
    pub organization_id: Option<Uuid>,
    pub status: Option<String>,
    pub business_id: Option<String>,
    pub search: Option<String>,
    pub page: i64,
    pub limit: i64,
}

impl AdAccountQuery {
    /// Rows to skip. Saturates so an out-of-range page yields an empty result.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).max(0).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}
