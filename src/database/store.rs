//! Persistence seam for the ledger.
//!
//! `LedgerStore` exposes read queries plus `begin()`; every write goes through a
//! `LedgerTx`, which is atomic: nothing it wrote is visible until `commit`, and
//! dropping it without committing rolls everything back.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::DatabaseError;
use super::models::{
    AdAccountQuery, AdAccountRow, Application, ApplicationFilter, ApplicationFulfillment,
    ApplicationStatusChange, Asset, AssetBinding, BindingUpsert, NewApplication, NewAsset,
    NewBinding, NewTopUpRequest, NewTransaction, Organization, Page, Plan, Subscription,
    SubscriptionUpsert, TopUpRequest, TopUpRequestUpdate, Transaction, Wallet,
};

pub type StoreResult<T> = Result<T, DatabaseError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;

    async fn ping(&self) -> StoreResult<()>;

    async fn is_admin(&self, user_id: Uuid) -> StoreResult<bool>;

    async fn is_member(&self, user_id: Uuid, organization_id: Uuid) -> StoreResult<bool>;

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>>;

    async fn find_wallet(&self, organization_id: Uuid) -> StoreResult<Option<Wallet>>;

    async fn list_transactions(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>>;

    async fn find_application(&self, id: Uuid) -> StoreResult<Option<Application>>;

    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>>;

    async fn list_fulfillments(&self, application_id: Uuid)
        -> StoreResult<Vec<ApplicationFulfillment>>;

    async fn find_binding(
        &self,
        asset_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<AssetBinding>>;

    async fn list_ad_accounts(&self, query: &AdAccountQuery) -> StoreResult<Page<AdAccountRow>>;

    async fn list_top_up_requests(
        &self,
        organization_id: Option<Uuid>,
    ) -> StoreResult<Vec<TopUpRequest>>;

    async fn find_plan(&self, id: &str) -> StoreResult<Option<Plan>>;
}

#[async_trait]
pub trait LedgerTx: Send {
    /// Wallet row for the organization, locked until the transaction ends.
    async fn lock_wallet(&mut self, organization_id: Uuid) -> StoreResult<Option<Wallet>>;

    async fn update_wallet_balance(
        &mut self,
        wallet_id: Uuid,
        balance_cents: i64,
    ) -> StoreResult<Wallet>;

    async fn find_transaction_by_reference(
        &mut self,
        provider: &str,
        provider_reference: &str,
    ) -> StoreResult<Option<Transaction>>;

    async fn insert_transaction(&mut self, new: NewTransaction) -> StoreResult<Transaction>;

    async fn find_organization(&mut self, id: Uuid) -> StoreResult<Option<Organization>>;

    async fn find_plan(&mut self, id: &str) -> StoreResult<Option<Plan>>;

    /// Application row, locked until the transaction ends.
    async fn lock_application(&mut self, id: Uuid) -> StoreResult<Option<Application>>;

    async fn insert_application(&mut self, new: NewApplication) -> StoreResult<Application>;

    async fn update_application_status(
        &mut self,
        id: Uuid,
        change: ApplicationStatusChange,
    ) -> StoreResult<Application>;

    async fn delete_application(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn find_asset(&mut self, id: Uuid) -> StoreResult<Option<Asset>>;

    /// Insert or refresh the asset keyed by (type, dolphin_id).
    async fn upsert_asset(&mut self, new: NewAsset) -> StoreResult<Asset>;

    async fn find_binding(
        &mut self,
        asset_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<AssetBinding>>;

    /// Insert the binding or re-activate the existing row for the same pair.
    async fn upsert_binding(&mut self, new: NewBinding) -> StoreResult<BindingUpsert>;

    async fn delete_binding(&mut self, asset_id: Uuid, organization_id: Uuid) -> StoreResult<bool>;

    async fn insert_fulfillment(
        &mut self,
        application_id: Uuid,
        asset_id: Uuid,
        fulfilled_by: Uuid,
    ) -> StoreResult<ApplicationFulfillment>;

    async fn insert_top_up_request(&mut self, new: NewTopUpRequest) -> StoreResult<TopUpRequest>;

    /// Top-up request row, locked until the transaction ends.
    async fn lock_top_up_request(&mut self, id: Uuid) -> StoreResult<Option<TopUpRequest>>;

    async fn update_top_up_request(
        &mut self,
        id: Uuid,
        update: TopUpRequestUpdate,
    ) -> StoreResult<TopUpRequest>;

    async fn set_organization_plan(
        &mut self,
        organization_id: Uuid,
        plan_id: Option<&str>,
        subscription_status: &str,
        billing_customer_id: Option<&str>,
    ) -> StoreResult<Organization>;

    async fn upsert_subscription(&mut self, upsert: SubscriptionUpsert) -> StoreResult<Subscription>;

    async fn find_subscription_by_provider_id(
        &mut self,
        provider_subscription_id: &str,
    ) -> StoreResult<Option<Subscription>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
