//! In-memory ledger store.
//!
//! Used when the service runs with `SKIP_EXTERNALS=true` and by the test suite.
//! Transactions are serialised behind a single async lock; each one works on a
//! copy of the committed state which replaces it on `commit`. Dropping a
//! transaction discards its copy.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::error::{DatabaseError, DatabaseErrorKind};
use super::models::{
    AdAccountQuery, AdAccountRow, Application, ApplicationFilter, ApplicationFulfillment,
    ApplicationStatus, ApplicationStatusChange, Asset, AssetBinding, AssetType, BindingStatus,
    BindingUpsert, NewApplication, NewAsset, NewBinding, NewTopUpRequest, NewTransaction,
    Organization, Page, Plan, Subscription, SubscriptionUpsert, TopUpRequest, TopUpRequestUpdate,
    TopUpStatus, Transaction, Wallet,
};
use super::store::{LedgerStore, LedgerTx, StoreResult};

/// Operations that can be made to fail once, for exercising rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    UpdateWalletBalance,
    InsertTransaction,
    UpsertBinding,
    InsertFulfillment,
    UpdateApplicationStatus,
    UpdateTopUpRequest,
    Commit,
}

impl FailPoint {
    fn operation(&self) -> &'static str {
        match self {
            FailPoint::UpdateWalletBalance => "update_wallet_balance",
            FailPoint::InsertTransaction => "insert_transaction",
            FailPoint::UpsertBinding => "upsert_binding",
            FailPoint::InsertFulfillment => "insert_fulfillment",
            FailPoint::UpdateApplicationStatus => "update_application_status",
            FailPoint::UpdateTopUpRequest => "update_top_up_request",
            FailPoint::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    roles: HashMap<Uuid, String>,
    organizations: HashMap<Uuid, Organization>,
    members: HashSet<(Uuid, Uuid)>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<Transaction>,
    assets: HashMap<Uuid, Asset>,
    bindings: HashMap<Uuid, AssetBinding>,
    applications: HashMap<Uuid, Application>,
    fulfillments: Vec<ApplicationFulfillment>,
    top_ups: HashMap<Uuid, TopUpRequest>,
    plans: HashMap<String, Plan>,
    subscriptions: HashMap<String, Subscription>,
}

impl State {
    fn wallet_for(&self, organization_id: Uuid) -> Option<&Wallet> {
        self.wallets
            .values()
            .find(|w| w.organization_id == organization_id)
    }

    fn binding_for(&self, asset_id: Uuid, organization_id: Uuid) -> Option<&AssetBinding> {
        self.bindings
            .values()
            .find(|b| b.asset_id == asset_id && b.organization_id == organization_id)
    }

    fn is_member(&self, user_id: Uuid, organization_id: Uuid) -> bool {
        self.members.contains(&(organization_id, user_id))
            || self
                .organizations
                .get(&organization_id)
                .map(|org| org.owner_id == user_id)
                .unwrap_or(false)
    }

    fn transactions_desc(&self, organization_id: Uuid) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .iter()
            .rev()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    fn ad_accounts(&self, query: &AdAccountQuery) -> Page<AdAccountRow> {
        let search = query.search.as_ref().map(|s| s.to_lowercase());
        let mut rows: Vec<AdAccountRow> = self
            .bindings
            .values()
            .filter(|b| b.status == BindingStatus::Active)
            .filter(|b| query.organization_id.map_or(true, |org| b.organization_id == org))
            .filter_map(|b| {
                let asset = self.assets.get(&b.asset_id)?;
                if asset.r#type != AssetType::AdAccount {
                    return None;
                }
                let business_manager_id = asset
                    .metadata
                    .get("business_manager_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Some(AdAccountRow {
                    id: asset.id,
                    dolphin_id: asset.dolphin_id.clone(),
                    name: asset.name.clone(),
                    status: asset.status.clone(),
                    metadata: asset.metadata.clone(),
                    business_manager_id,
                    binding_id: b.id,
                    organization_id: b.organization_id,
                    spend_limit_cents: b.spend_limit_cents,
                    fee_percentage: b.fee_percentage,
                    bound_at: b.bound_at,
                })
            })
            .filter(|row| query.status.as_ref().map_or(true, |s| &row.status == s))
            .filter(|row| {
                query
                    .business_id
                    .as_ref()
                    .map_or(true, |bm| row.business_manager_id.as_ref() == Some(bm))
            })
            .filter(|row| {
                search.as_ref().map_or(true, |needle| {
                    row.name.to_lowercase().contains(needle)
                        || row.dolphin_id.to_lowercase().contains(needle)
                })
            })
            .collect();

        rows.sort_by(|a, b| b.bound_at.cmp(&a.bound_at).then(a.id.cmp(&b.id)));
        let total = rows.len() as i64;
        let items = rows
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit.max(0) as usize)
            .collect();

        Page { items, total }
    }
}

/// Ledger store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    committed: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `point` fail inside whichever transaction reaches it.
    pub fn fail_once(&self, point: FailPoint) {
        self.fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(point);
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let state = self.committed.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    fn write<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.committed.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn add_profile(&self, user_id: Uuid, role: &str) {
        self.write(|s| {
            s.roles.insert(user_id, role.to_string());
        });
    }

    /// Create an organization with an empty wallet.
    pub fn add_organization(&self, name: &str, owner_id: Uuid) -> Organization {
        let now = Utc::now();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id,
            plan_id: None,
            subscription_status: None,
            billing_customer_id: None,
            created_at: now,
        };
        let wallet = Wallet {
            id: Uuid::new_v4(),
            organization_id: organization.id,
            balance_cents: 0,
            currency: "USD".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.write(|s| {
            s.organizations.insert(organization.id, organization.clone());
            s.wallets.insert(wallet.id, wallet);
        });
        organization
    }

    pub fn add_member(&self, organization_id: Uuid, user_id: Uuid) {
        self.write(|s| {
            s.members.insert((organization_id, user_id));
        });
    }

    pub fn set_organization_plan_id(&self, organization_id: Uuid, plan_id: &str) {
        self.write(|s| {
            if let Some(org) = s.organizations.get_mut(&organization_id) {
                org.plan_id = Some(plan_id.to_string());
            }
        });
    }

    pub fn add_plan(&self, plan: Plan) {
        self.write(|s| {
            s.plans.insert(plan.id.clone(), plan);
        });
    }

    pub fn add_asset(&self, new: NewAsset) -> Asset {
        let asset = new_asset_row(new);
        self.write(|s| {
            s.assets.insert(asset.id, asset.clone());
        });
        asset
    }

    /// Overwrite a wallet balance without recording a transaction.
    pub fn set_balance(&self, organization_id: Uuid, balance_cents: i64) {
        self.write(|s| {
            if let Some(wallet) = s
                .wallets
                .values_mut()
                .find(|w| w.organization_id == organization_id)
            {
                wallet.balance_cents = balance_cents;
            }
        });
    }

    pub fn bindings_for_asset(&self, asset_id: Uuid) -> Vec<AssetBinding> {
        self.read(|s| {
            s.bindings
                .values()
                .filter(|b| b.asset_id == asset_id)
                .cloned()
                .collect()
        })
    }

    pub fn subscription(&self, provider_subscription_id: &str) -> Option<Subscription> {
        self.read(|s| s.subscriptions.get(provider_subscription_id).cloned())
    }

    pub fn top_up_request(&self, id: Uuid) -> Option<TopUpRequest> {
        self.read(|s| s.top_ups.get(&id).cloned())
    }
}

fn new_asset_row(new: NewAsset) -> Asset {
    let now = Utc::now();
    Asset {
        id: Uuid::new_v4(),
        r#type: new.r#type,
        dolphin_id: new.dolphin_id,
        name: new.name,
        status: new.status,
        metadata: normalize_metadata(new.metadata),
        created_at: now,
        updated_at: now,
    }
}

fn normalize_metadata(value: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::json!({})
    } else {
        value
    }
}

fn unique_violation(constraint: &str) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::UniqueViolation {
        constraint: constraint.to_string(),
    })
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let guard = self.writer.clone().lock_owned().await;
        let working = self.read(|s| s.clone());
        Ok(Box::new(MemoryLedgerTx {
            _guard: guard,
            committed: self.committed.clone(),
            fail_points: self.fail_points.clone(),
            working,
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn is_admin(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(self.read(|s| {
            s.roles
                .get(&user_id)
                .map(|role| role == "admin" || role == "superuser")
                .unwrap_or(false)
        }))
    }

    async fn is_member(&self, user_id: Uuid, organization_id: Uuid) -> StoreResult<bool> {
        Ok(self.read(|s| s.is_member(user_id, organization_id)))
    }

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(self.read(|s| s.organizations.get(&id).cloned()))
    }

    async fn find_wallet(&self, organization_id: Uuid) -> StoreResult<Option<Wallet>> {
        Ok(self.read(|s| s.wallet_for(organization_id).cloned()))
    }

    async fn list_transactions(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        Ok(self.read(|s| {
            s.transactions_desc(organization_id)
                .into_iter()
                .take(limit.max(0) as usize)
                .collect()
        }))
    }

    async fn find_application(&self, id: Uuid) -> StoreResult<Option<Application>> {
        Ok(self.read(|s| s.applications.get(&id).cloned()))
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>> {
        Ok(self.read(|s| {
            let mut rows: Vec<Application> = s
                .applications
                .values()
                .filter(|a| filter.organization_id.map_or(true, |org| a.organization_id == org))
                .filter(|a| filter.status.map_or(true, |status| a.status == status))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows
        }))
    }

    async fn list_fulfillments(
        &self,
        application_id: Uuid,
    ) -> StoreResult<Vec<ApplicationFulfillment>> {
        Ok(self.read(|s| {
            s.fulfillments
                .iter()
                .filter(|f| f.application_id == application_id)
                .cloned()
                .collect()
        }))
    }

    async fn find_binding(
        &self,
        asset_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<AssetBinding>> {
        Ok(self.read(|s| s.binding_for(asset_id, organization_id).cloned()))
    }

    async fn list_ad_accounts(&self, query: &AdAccountQuery) -> StoreResult<Page<AdAccountRow>> {
        Ok(self.read(|s| s.ad_accounts(query)))
    }

    async fn list_top_up_requests(
        &self,
        organization_id: Option<Uuid>,
    ) -> StoreResult<Vec<TopUpRequest>> {
        Ok(self.read(|s| {
            let mut rows: Vec<TopUpRequest> = s
                .top_ups
                .values()
                .filter(|r| organization_id.map_or(true, |org| r.organization_id == org))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows
        }))
    }

    async fn find_plan(&self, id: &str) -> StoreResult<Option<Plan>> {
        Ok(self.read(|s| s.plans.get(id).cloned()))
    }
}

pub struct MemoryLedgerTx {
    _guard: OwnedMutexGuard<()>,
    committed: Arc<RwLock<State>>,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
    working: State,
}

impl MemoryLedgerTx {
    fn check(&self, point: FailPoint) -> StoreResult<()> {
        let triggered = self
            .fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&point);
        if triggered {
            return Err(DatabaseError::new(DatabaseErrorKind::Injected {
                operation: point.operation().to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_wallet(&mut self, organization_id: Uuid) -> StoreResult<Option<Wallet>> {
        Ok(self.working.wallet_for(organization_id).cloned())
    }

    async fn update_wallet_balance(
        &mut self,
        wallet_id: Uuid,
        balance_cents: i64,
    ) -> StoreResult<Wallet> {
        self.check(FailPoint::UpdateWalletBalance)?;
        if balance_cents < 0 {
            return Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: "check constraint wallets_balance_cents_check violated".to_string(),
            }));
        }
        let wallet = self
            .working
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| DatabaseError::not_found("wallet", wallet_id))?;
        wallet.balance_cents = balance_cents;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn find_transaction_by_reference(
        &mut self,
        provider: &str,
        provider_reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .find(|t| {
                t.provider.as_deref() == Some(provider)
                    && t.provider_reference.as_deref() == Some(provider_reference)
            })
            .cloned())
    }

    async fn insert_transaction(&mut self, new: NewTransaction) -> StoreResult<Transaction> {
        self.check(FailPoint::InsertTransaction)?;
        if new.provider_reference.is_some() {
            let duplicate = self.working.transactions.iter().any(|t| {
                t.provider == new.provider && t.provider_reference == new.provider_reference
            });
            if duplicate {
                return Err(unique_violation("transactions_provider_reference_key"));
            }
        }
        let transaction = Transaction {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            wallet_id: new.wallet_id,
            r#type: new.r#type,
            amount_cents: new.amount_cents,
            status: new.status,
            description: new.description,
            provider: new.provider,
            provider_reference: new.provider_reference,
            metadata: normalize_metadata(new.metadata),
            created_at: Utc::now(),
        };
        self.working.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn find_organization(&mut self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(self.working.organizations.get(&id).cloned())
    }

    async fn find_plan(&mut self, id: &str) -> StoreResult<Option<Plan>> {
        Ok(self.working.plans.get(id).cloned())
    }

    async fn lock_application(&mut self, id: Uuid) -> StoreResult<Option<Application>> {
        Ok(self.working.applications.get(&id).cloned())
    }

    async fn insert_application(&mut self, new: NewApplication) -> StoreResult<Application> {
        let now = Utc::now();
        let application = Application {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            request_type: new.request_type,
            status: ApplicationStatus::Pending,
            name: new.name,
            pixel_id: new.pixel_id,
            target_bm_id: new.target_bm_id,
            requested_amount_cents: new.requested_amount_cents,
            metadata: normalize_metadata(new.metadata),
            created_by: new.created_by,
            reviewed_by: None,
            rejection_reason: None,
            fulfilled_by: None,
            fulfilled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working
            .applications
            .insert(application.id, application.clone());
        Ok(application)
    }

    async fn update_application_status(
        &mut self,
        id: Uuid,
        change: ApplicationStatusChange,
    ) -> StoreResult<Application> {
        self.check(FailPoint::UpdateApplicationStatus)?;
        let application = self
            .working
            .applications
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("application", id))?;
        let now = Utc::now();
        application.status = change.status;
        if change.status == ApplicationStatus::Fulfilled {
            application.fulfilled_by = Some(change.actor);
            application.fulfilled_at = Some(now);
        } else {
            application.reviewed_by = Some(change.actor);
        }
        if change.reason.is_some() {
            application.rejection_reason = change.reason;
        }
        application.updated_at = now;
        Ok(application.clone())
    }

    async fn delete_application(&mut self, id: Uuid) -> StoreResult<bool> {
        let removed = self.working.applications.remove(&id).is_some();
        if removed {
            self.working.fulfillments.retain(|f| f.application_id != id);
        }
        Ok(removed)
    }

    async fn find_asset(&mut self, id: Uuid) -> StoreResult<Option<Asset>> {
        Ok(self.working.assets.get(&id).cloned())
    }

    async fn upsert_asset(&mut self, new: NewAsset) -> StoreResult<Asset> {
        let existing = self
            .working
            .assets
            .values_mut()
            .find(|a| a.r#type == new.r#type && a.dolphin_id == new.dolphin_id);

        if let Some(asset) = existing {
            asset.name = new.name;
            asset.status = new.status;
            if let (Some(current), serde_json::Value::Object(extra)) =
                (asset.metadata.as_object_mut(), new.metadata)
            {
                current.extend(extra);
            }
            asset.updated_at = Utc::now();
            return Ok(asset.clone());
        }

        let asset = new_asset_row(new);
        self.working.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn find_binding(
        &mut self,
        asset_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<AssetBinding>> {
        Ok(self.working.binding_for(asset_id, organization_id).cloned())
    }

    async fn upsert_binding(&mut self, new: NewBinding) -> StoreResult<BindingUpsert> {
        self.check(FailPoint::UpsertBinding)?;
        if !self.working.assets.contains_key(&new.asset_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::ForeignKeyViolation {
                constraint: "asset_binding_asset_id_fkey".to_string(),
            }));
        }
        let now = Utc::now();
        let existing = self
            .working
            .bindings
            .values_mut()
            .find(|b| b.asset_id == new.asset_id && b.organization_id == new.organization_id);

        if let Some(binding) = existing {
            binding.status = BindingStatus::Active;
            binding.is_active = true;
            if new.spend_limit_cents.is_some() {
                binding.spend_limit_cents = new.spend_limit_cents;
            }
            if new.fee_percentage.is_some() {
                binding.fee_percentage = new.fee_percentage;
            }
            binding.bound_by = new.bound_by;
            binding.bound_at = now;
            return Ok(BindingUpsert {
                binding: binding.clone(),
                created: false,
            });
        }

        let binding = AssetBinding {
            id: Uuid::new_v4(),
            asset_id: new.asset_id,
            organization_id: new.organization_id,
            status: BindingStatus::Active,
            is_active: true,
            spend_limit_cents: new.spend_limit_cents,
            fee_percentage: new.fee_percentage,
            bound_by: new.bound_by,
            bound_at: now,
            created_at: now,
        };
        self.working.bindings.insert(binding.id, binding.clone());
        Ok(BindingUpsert {
            binding,
            created: true,
        })
    }

    async fn delete_binding(&mut self, asset_id: Uuid, organization_id: Uuid) -> StoreResult<bool> {
        let before = self.working.bindings.len();
        self.working
            .bindings
            .retain(|_, b| !(b.asset_id == asset_id && b.organization_id == organization_id));
        Ok(self.working.bindings.len() < before)
    }

    async fn insert_fulfillment(
        &mut self,
        application_id: Uuid,
        asset_id: Uuid,
        fulfilled_by: Uuid,
    ) -> StoreResult<ApplicationFulfillment> {
        self.check(FailPoint::InsertFulfillment)?;
        let fulfillment = ApplicationFulfillment {
            id: Uuid::new_v4(),
            application_id,
            asset_id,
            fulfilled_by,
            created_at: Utc::now(),
        };
        self.working.fulfillments.push(fulfillment.clone());
        Ok(fulfillment)
    }

    async fn insert_top_up_request(&mut self, new: NewTopUpRequest) -> StoreResult<TopUpRequest> {
        let now = Utc::now();
        let request = TopUpRequest {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            ad_account_id: new.ad_account_id,
            amount_cents: new.amount_cents,
            status: TopUpStatus::Pending,
            notes: new.notes,
            approved_amount_cents: None,
            admin_notes: None,
            requested_by: new.requested_by,
            processed_by: None,
            processed_at: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        self.working.top_ups.insert(request.id, request.clone());
        Ok(request)
    }

    async fn lock_top_up_request(&mut self, id: Uuid) -> StoreResult<Option<TopUpRequest>> {
        Ok(self.working.top_ups.get(&id).cloned())
    }

    async fn update_top_up_request(
        &mut self,
        id: Uuid,
        update: TopUpRequestUpdate,
    ) -> StoreResult<TopUpRequest> {
        self.check(FailPoint::UpdateTopUpRequest)?;
        let request = self
            .working
            .top_ups
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("topup_request", id))?;
        let now = Utc::now();
        request.status = update.status;
        if update.approved_amount_cents.is_some() {
            request.approved_amount_cents = update.approved_amount_cents;
        }
        if update.admin_notes.is_some() {
            request.admin_notes = update.admin_notes;
        }
        if update.transaction_id.is_some() {
            request.transaction_id = update.transaction_id;
        }
        request.processed_by = Some(update.processed_by);
        request.processed_at = Some(now);
        request.updated_at = now;
        Ok(request.clone())
    }

    async fn set_organization_plan(
        &mut self,
        organization_id: Uuid,
        plan_id: Option<&str>,
        subscription_status: &str,
        billing_customer_id: Option<&str>,
    ) -> StoreResult<Organization> {
        let organization = self
            .working
            .organizations
            .get_mut(&organization_id)
            .ok_or_else(|| DatabaseError::not_found("organization", organization_id))?;
        if let Some(plan_id) = plan_id {
            organization.plan_id = Some(plan_id.to_string());
        }
        organization.subscription_status = Some(subscription_status.to_string());
        if let Some(customer) = billing_customer_id {
            organization.billing_customer_id = Some(customer.to_string());
        }
        Ok(organization.clone())
    }

    async fn upsert_subscription(&mut self, upsert: SubscriptionUpsert) -> StoreResult<Subscription> {
        let now = Utc::now();
        let subscription = match self
            .working
            .subscriptions
            .get_mut(&upsert.provider_subscription_id)
        {
            Some(existing) => {
                existing.plan_id = upsert.plan_id;
                existing.status = upsert.status;
                if upsert.current_period_end.is_some() {
                    existing.current_period_end = upsert.current_period_end;
                }
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let subscription = Subscription {
                    id: Uuid::new_v4(),
                    organization_id: upsert.organization_id,
                    plan_id: upsert.plan_id,
                    provider_subscription_id: upsert.provider_subscription_id.clone(),
                    status: upsert.status,
                    current_period_end: upsert.current_period_end,
                    created_at: now,
                    updated_at: now,
                };
                self.working
                    .subscriptions
                    .insert(upsert.provider_subscription_id, subscription.clone());
                subscription
            }
        };
        Ok(subscription)
    }

    async fn find_subscription_by_provider_id(
        &mut self,
        provider_subscription_id: &str,
    ) -> StoreResult<Option<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .get(provider_subscription_id)
            .cloned())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.check(FailPoint::Commit)?;
        let MemoryLedgerTx {
            _guard,
            committed,
            working,
            ..
        } = *self;
        *committed.write().unwrap_or_else(|e| e.into_inner()) = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{TransactionStatus, TransactionType};

    fn deposit(org: Uuid, wallet: Uuid, reference: &str) -> NewTransaction {
        NewTransaction {
            organization_id: org,
            wallet_id: wallet,
            r#type: TransactionType::Deposit,
            amount_cents: 1000,
            status: TransactionStatus::Completed,
            description: None,
            provider: Some("stripe".to_string()),
            provider_reference: Some(reference.to_string()),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryLedgerStore::new();
        let org = store.add_organization("Acme", Uuid::new_v4());

        let mut tx = store.begin().await.unwrap();
        let wallet = tx.lock_wallet(org.id).await.unwrap().unwrap();
        tx.update_wallet_balance(wallet.id, 5000).await.unwrap();
        drop(tx);

        let wallet = store.find_wallet(org.id).await.unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 0);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryLedgerStore::new();
        let org = store.add_organization("Acme", Uuid::new_v4());

        let mut tx = store.begin().await.unwrap();
        let wallet = tx.lock_wallet(org.id).await.unwrap().unwrap();
        tx.update_wallet_balance(wallet.id, 5000).await.unwrap();
        tx.commit().await.unwrap();

        let wallet = store.find_wallet(org.id).await.unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 5000);
    }

    #[tokio::test]
    async fn provider_reference_is_unique() {
        let store = MemoryLedgerStore::new();
        let org = store.add_organization("Acme", Uuid::new_v4());
        let wallet = store.find_wallet(org.id).await.unwrap().unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_transaction(deposit(org.id, wallet.id, "pi_1"))
            .await
            .unwrap();
        let err = tx
            .insert_transaction(deposit(org.id, wallet.id, "pi_1"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn fail_point_fires_once() {
        let store = MemoryLedgerStore::new();
        let org = store.add_organization("Acme", Uuid::new_v4());
        let wallet = store.find_wallet(org.id).await.unwrap().unwrap();
        store.fail_once(FailPoint::InsertTransaction);

        let mut tx = store.begin().await.unwrap();
        assert!(tx
            .insert_transaction(deposit(org.id, wallet.id, "a"))
            .await
            .is_err());
        assert!(tx
            .insert_transaction(deposit(org.id, wallet.id, "b"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn binding_upsert_reuses_the_pair_row() {
        let store = MemoryLedgerStore::new();
        let org = store.add_organization("Acme", Uuid::new_v4());
        let asset = store.add_asset(NewAsset {
            r#type: AssetType::AdAccount,
            dolphin_id: "act_1".to_string(),
            name: "Main".to_string(),
            status: "active".to_string(),
            metadata: serde_json::json!({}),
        });
        let binding = NewBinding {
            asset_id: asset.id,
            organization_id: org.id,
            spend_limit_cents: None,
            fee_percentage: Some(5.0),
            bound_by: None,
        };

        let mut tx = store.begin().await.unwrap();
        let first = tx.upsert_binding(binding.clone()).await.unwrap();
        let second = tx.upsert_binding(binding).await.unwrap();
        tx.commit().await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.binding.id, second.binding.id);
        assert_eq!(store.bindings_for_asset(asset.id).len(), 1);
    }
}
