use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::error::DatabaseError;
use super::models::{
    AdAccountQuery, AdAccountRow, Application, ApplicationFilter, ApplicationFulfillment,
    ApplicationStatus, ApplicationStatusChange, Asset, AssetBinding, BindingUpsert,
    NewApplication, NewAsset, NewBinding, NewTopUpRequest, NewTransaction, Organization, Page,
    Plan, Subscription, SubscriptionUpsert, TopUpRequest, TopUpRequestUpdate, Transaction, Wallet,
};
use super::store::{LedgerStore, LedgerTx, StoreResult};

const ORGANIZATION_COLUMNS: &str =
    "id, name, owner_id, plan_id, subscription_status, billing_customer_id, created_at";
const WALLET_COLUMNS: &str =
    "id, organization_id, balance_cents, currency, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, organization_id, wallet_id, type, amount_cents, status, \
     description, provider, provider_reference, metadata, created_at";
const ASSET_COLUMNS: &str = "id, type, dolphin_id, name, status, metadata, created_at, updated_at";
const BINDING_COLUMNS: &str = "id, asset_id, organization_id, status, is_active, \
     spend_limit_cents, fee_percentage, bound_by, bound_at, created_at";
const APPLICATION_COLUMNS: &str = "id, organization_id, request_type, status, name, pixel_id, \
     target_bm_id, requested_amount_cents, metadata, created_by, reviewed_by, rejection_reason, \
     fulfilled_by, fulfilled_at, created_at, updated_at";
const TOP_UP_COLUMNS: &str = "id, organization_id, ad_account_id, amount_cents, status, notes, \
     approved_amount_cents, admin_notes, requested_by, processed_by, processed_at, \
     transaction_id, created_at, updated_at";
const PLAN_COLUMNS: &str =
    "id, name, provider_price_id, monthly_fee_cents, ad_spend_fee_percentage, is_active";
const SUBSCRIPTION_COLUMNS: &str = "id, organization_id, plan_id, provider_subscription_id, \
     status, current_period_end, created_at, updated_at";

/// Ledger store backed by the hosted Postgres database.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        super::health_check(&self.pool).await
    }

    async fn is_admin(&self, user_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE id = $1 AND role IN ('admin', 'superuser'))",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn is_member(&self, user_id: Uuid, organization_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
                 SELECT 1 FROM organization_members WHERE organization_id = $2 AND user_id = $1
                 UNION ALL
                 SELECT 1 FROM organizations WHERE id = $2 AND owner_id = $1
             )",
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        sqlx::query_as::<_, Organization>(&format!(
            "SELECT {} FROM organizations WHERE id = $1",
            ORGANIZATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_wallet(&self, organization_id: Uuid) -> StoreResult<Option<Wallet>> {
        sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE organization_id = $1",
            WALLET_COLUMNS
        ))
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_transactions(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM transactions WHERE organization_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
            TRANSACTION_COLUMNS
        ))
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_application(&self, id: Uuid) -> StoreResult<Option<Application>> {
        sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM application WHERE id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>> {
        sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM application \
             WHERE ($1::uuid IS NULL OR organization_id = $1) \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC",
            APPLICATION_COLUMNS
        ))
        .bind(filter.organization_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_fulfillments(
        &self,
        application_id: Uuid,
    ) -> StoreResult<Vec<ApplicationFulfillment>> {
        sqlx::query_as::<_, ApplicationFulfillment>(
            "SELECT id, application_id, asset_id, fulfilled_by, created_at \
             FROM application_fulfillment WHERE application_id = $1 ORDER BY created_at",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_binding(
        &self,
        asset_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<AssetBinding>> {
        sqlx::query_as::<_, AssetBinding>(&format!(
            "SELECT {} FROM asset_binding WHERE asset_id = $1 AND organization_id = $2",
            BINDING_COLUMNS
        ))
        .bind(asset_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_ad_accounts(&self, query: &AdAccountQuery) -> StoreResult<Page<AdAccountRow>> {
        let search = query.search.as_deref().map(contains_pattern);
        let filters = "a.type = 'ad_account' AND b.status = 'active' \
             AND ($1::uuid IS NULL OR b.organization_id = $1) \
             AND ($2::text IS NULL OR a.status = $2) \
             AND ($3::text IS NULL OR a.metadata->>'business_manager_id' = $3) \
             AND ($4::text IS NULL OR a.name ILIKE $4 OR a.dolphin_id ILIKE $4)";

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM asset a JOIN asset_binding b ON b.asset_id = a.id WHERE {}",
            filters
        ))
        .bind(query.organization_id)
        .bind(query.status.as_deref())
        .bind(query.business_id.as_deref())
        .bind(search.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let items = sqlx::query_as::<_, AdAccountRow>(&format!(
            "SELECT a.id, a.dolphin_id, a.name, a.status, a.metadata, \
                    a.metadata->>'business_manager_id' AS business_manager_id, \
                    b.id AS binding_id, b.organization_id, b.spend_limit_cents, \
                    b.fee_percentage, b.bound_at \
             FROM asset a JOIN asset_binding b ON b.asset_id = a.id \
             WHERE {} ORDER BY b.bound_at DESC LIMIT $5 OFFSET $6",
            filters
        ))
        .bind(query.organization_id)
        .bind(query.status.as_deref())
        .bind(query.business_id.as_deref())
        .bind(search.as_deref())
        .bind(query.limit)
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(Page { items, total })
    }

    async fn list_top_up_requests(
        &self,
        organization_id: Option<Uuid>,
    ) -> StoreResult<Vec<TopUpRequest>> {
        sqlx::query_as::<_, TopUpRequest>(&format!(
            "SELECT {} FROM topup_requests WHERE ($1::uuid IS NULL OR organization_id = $1) \
             ORDER BY created_at DESC",
            TOP_UP_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_plan(&self, id: &str) -> StoreResult<Option<Plan>> {
        sqlx::query_as::<_, Plan>(&format!("SELECT {} FROM plans WHERE id = $1", PLAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}

/// One database transaction; rolled back by sqlx when dropped uncommitted.
pub struct PgLedgerTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_wallet(&mut self, organization_id: Uuid) -> StoreResult<Option<Wallet>> {
        sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE organization_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(organization_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn update_wallet_balance(
        &mut self,
        wallet_id: Uuid,
        balance_cents: i64,
    ) -> StoreResult<Wallet> {
        sqlx::query_as::<_, Wallet>(&format!(
            "UPDATE wallets SET balance_cents = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(wallet_id)
        .bind(balance_cents)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_transaction_by_reference(
        &mut self,
        provider: &str,
        provider_reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM transactions WHERE provider = $1 AND provider_reference = $2",
            TRANSACTION_COLUMNS
        ))
        .bind(provider)
        .bind(provider_reference)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn insert_transaction(&mut self, new: NewTransaction) -> StoreResult<Transaction> {
        sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions \
             (organization_id, wallet_id, type, amount_cents, status, description, provider, \
              provider_reference, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(new.organization_id)
        .bind(new.wallet_id)
        .bind(new.r#type.as_str())
        .bind(new.amount_cents)
        .bind(new.status.as_str())
        .bind(new.description)
        .bind(new.provider)
        .bind(new.provider_reference)
        .bind(new.metadata)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_organization(&mut self, id: Uuid) -> StoreResult<Option<Organization>> {
        sqlx::query_as::<_, Organization>(&format!(
            "SELECT {} FROM organizations WHERE id = $1",
            ORGANIZATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_plan(&mut self, id: &str) -> StoreResult<Option<Plan>> {
        sqlx::query_as::<_, Plan>(&format!("SELECT {} FROM plans WHERE id = $1", PLAN_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn lock_application(&mut self, id: Uuid) -> StoreResult<Option<Application>> {
        sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM application WHERE id = $1 FOR UPDATE",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn insert_application(&mut self, new: NewApplication) -> StoreResult<Application> {
        sqlx::query_as::<_, Application>(&format!(
            "INSERT INTO application \
             (organization_id, request_type, status, name, pixel_id, target_bm_id, \
              requested_amount_cents, metadata, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            APPLICATION_COLUMNS
        ))
        .bind(new.organization_id)
        .bind(new.request_type.as_str())
        .bind(ApplicationStatus::Pending.as_str())
        .bind(new.name)
        .bind(new.pixel_id)
        .bind(new.target_bm_id)
        .bind(new.requested_amount_cents)
        .bind(new.metadata)
        .bind(new.created_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn update_application_status(
        &mut self,
        id: Uuid,
        change: ApplicationStatusChange,
    ) -> StoreResult<Application> {
        let fulfilled = change.status == ApplicationStatus::Fulfilled;
        sqlx::query_as::<_, Application>(&format!(
            "UPDATE application SET \
                 status = $2, \
                 reviewed_by = CASE WHEN $4 THEN reviewed_by ELSE $3 END, \
                 rejection_reason = COALESCE($5, rejection_reason), \
                 fulfilled_by = CASE WHEN $4 THEN $3 ELSE fulfilled_by END, \
                 fulfilled_at = CASE WHEN $4 THEN NOW() ELSE fulfilled_at END, \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .bind(change.status.as_str())
        .bind(change.actor)
        .bind(fulfilled)
        .bind(change.reason)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn delete_application(&mut self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM application WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_asset(&mut self, id: Uuid) -> StoreResult<Option<Asset>> {
        sqlx::query_as::<_, Asset>(&format!("SELECT {} FROM asset WHERE id = $1", ASSET_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn upsert_asset(&mut self, new: NewAsset) -> StoreResult<Asset> {
        sqlx::query_as::<_, Asset>(&format!(
            "INSERT INTO asset (type, dolphin_id, name, status, metadata) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT asset_type_dolphin_id_key DO UPDATE SET \
                 name = EXCLUDED.name, \
                 status = EXCLUDED.status, \
                 metadata = asset.metadata || EXCLUDED.metadata, \
                 updated_at = NOW() \
             RETURNING {}",
            ASSET_COLUMNS
        ))
        .bind(new.r#type.as_str())
        .bind(new.dolphin_id)
        .bind(new.name)
        .bind(new.status)
        .bind(new.metadata)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_binding(
        &mut self,
        asset_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<AssetBinding>> {
        sqlx::query_as::<_, AssetBinding>(&format!(
            "SELECT {} FROM asset_binding WHERE asset_id = $1 AND organization_id = $2 FOR UPDATE",
            BINDING_COLUMNS
        ))
        .bind(asset_id)
        .bind(organization_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn upsert_binding(&mut self, new: NewBinding) -> StoreResult<BindingUpsert> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            binding: AssetBinding,
            inserted: bool,
        }

        let row = sqlx::query_as::<_, Row>(&format!(
            "INSERT INTO asset_binding \
             (asset_id, organization_id, status, is_active, spend_limit_cents, fee_percentage, bound_by) \
             VALUES ($1, $2, 'active', TRUE, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT asset_binding_asset_organization_key DO UPDATE SET \
                 status = 'active', \
                 is_active = TRUE, \
                 spend_limit_cents = COALESCE(EXCLUDED.spend_limit_cents, asset_binding.spend_limit_cents), \
                 fee_percentage = COALESCE(EXCLUDED.fee_percentage, asset_binding.fee_percentage), \
                 bound_by = EXCLUDED.bound_by, \
                 bound_at = NOW() \
             RETURNING {}, (xmax = 0) AS inserted",
            BINDING_COLUMNS
        ))
        .bind(new.asset_id)
        .bind(new.organization_id)
        .bind(new.spend_limit_cents)
        .bind(new.fee_percentage)
        .bind(new.bound_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(BindingUpsert {
            binding: row.binding,
            created: row.inserted,
        })
    }

    async fn delete_binding(&mut self, asset_id: Uuid, organization_id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM asset_binding WHERE asset_id = $1 AND organization_id = $2")
                .bind(asset_id)
                .bind(organization_id)
                .execute(&mut *self.tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_fulfillment(
        &mut self,
        application_id: Uuid,
        asset_id: Uuid,
        fulfilled_by: Uuid,
    ) -> StoreResult<ApplicationFulfillment> {
        sqlx::query_as::<_, ApplicationFulfillment>(
            "INSERT INTO application_fulfillment (application_id, asset_id, fulfilled_by) \
             VALUES ($1, $2, $3) \
             RETURNING id, application_id, asset_id, fulfilled_by, created_at",
        )
        .bind(application_id)
        .bind(asset_id)
        .bind(fulfilled_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn insert_top_up_request(&mut self, new: NewTopUpRequest) -> StoreResult<TopUpRequest> {
        sqlx::query_as::<_, TopUpRequest>(&format!(
            "INSERT INTO topup_requests \
             (organization_id, ad_account_id, amount_cents, status, notes, requested_by) \
             VALUES ($1, $2, $3, 'pending', $4, $5) RETURNING {}",
            TOP_UP_COLUMNS
        ))
        .bind(new.organization_id)
        .bind(new.ad_account_id)
        .bind(new.amount_cents)
        .bind(new.notes)
        .bind(new.requested_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn lock_top_up_request(&mut self, id: Uuid) -> StoreResult<Option<TopUpRequest>> {
        sqlx::query_as::<_, TopUpRequest>(&format!(
            "SELECT {} FROM topup_requests WHERE id = $1 FOR UPDATE",
            TOP_UP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn update_top_up_request(
        &mut self,
        id: Uuid,
        update: TopUpRequestUpdate,
    ) -> StoreResult<TopUpRequest> {
        sqlx::query_as::<_, TopUpRequest>(&format!(
            "UPDATE topup_requests SET \
                 status = $2, \
                 approved_amount_cents = COALESCE($3, approved_amount_cents), \
                 admin_notes = COALESCE($4, admin_notes), \
                 processed_by = $5, \
                 processed_at = NOW(), \
                 transaction_id = COALESCE($6, transaction_id), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            TOP_UP_COLUMNS
        ))
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.approved_amount_cents)
        .bind(update.admin_notes)
        .bind(update.processed_by)
        .bind(update.transaction_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_organization_plan(
        &mut self,
        organization_id: Uuid,
        plan_id: Option<&str>,
        subscription_status: &str,
        billing_customer_id: Option<&str>,
    ) -> StoreResult<Organization> {
        sqlx::query_as::<_, Organization>(&format!(
            "UPDATE organizations SET \
                 plan_id = COALESCE($2, plan_id), \
                 subscription_status = $3, \
                 billing_customer_id = COALESCE($4, billing_customer_id) \
             WHERE id = $1 RETURNING {}",
            ORGANIZATION_COLUMNS
        ))
        .bind(organization_id)
        .bind(plan_id)
        .bind(subscription_status)
        .bind(billing_customer_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn upsert_subscription(&mut self, upsert: SubscriptionUpsert) -> StoreResult<Subscription> {
        sqlx::query_as::<_, Subscription>(&format!(
            "INSERT INTO subscriptions \
             (organization_id, plan_id, provider_subscription_id, status, current_period_end) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (provider_subscription_id) DO UPDATE SET \
                 plan_id = EXCLUDED.plan_id, \
                 status = EXCLUDED.status, \
                 current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end), \
                 updated_at = NOW() \
             RETURNING {}",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(upsert.organization_id)
        .bind(upsert.plan_id)
        .bind(upsert.provider_subscription_id)
        .bind(upsert.status)
        .bind(upsert.current_period_end)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_subscription_by_provider_id(
        &mut self,
        provider_subscription_id: &str,
    ) -> StoreResult<Option<Subscription>> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE provider_subscription_id = $1 FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(provider_subscription_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(DatabaseError::from_sqlx)
    }
}

/// `ILIKE` pattern matching `needle` anywhere, with its wildcards taken literally.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_wildcards_are_escaped() {
        assert_eq!(contains_pattern("act_1"), "%act\\_1%");
        assert_eq!(contains_pattern("50%"), "%50\\%%");
        assert_eq!(contains_pattern("plain"), "%plain%");
    }
}
