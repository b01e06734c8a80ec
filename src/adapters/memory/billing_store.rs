//! In-memory billing store.
//!
//! Implements every storage port over one mutex-guarded state, so each
//! port call is atomic the same way a single SQL statement or
//! transaction is in the PostgreSQL adapters. Meant for tests and local
//! runs without a database.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryBillingStore::new());
//! store.seed_plan(price);
//! store.insert_mandate(mandate.clone());
//!
//! // ... run handlers against `store` as every storage port ...
//!
//! assert_eq!(store.subscription_count(), 1);
//! assert!(store.user_paid(&mandate.user_id));
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::domain::billing::{
    GatewayMode, Mandate, MandateStatus, OneTimeProgramPurchase, PlanPrice, ProgramPrice,
    PurchaseStatus, Subscription, SubscriptionInvoice,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, ExternalRef, MandateId, OrderId, PlanId, ProductId, PurchaseId,
    SubscriptionId, Timestamp, UserId,
};
use crate::ports::{
    ActivationWrite, GatewayConfigStore, MandateRepository, PriceCatalog, PurchaseRepository,
    RenewalWrite, StatusWrite, SubscriptionStore,
};

#[derive(Default)]
struct State {
    mandates: Vec<Mandate>,
    subscriptions: Vec<Subscription>,
    invoices: Vec<SubscriptionInvoice>,
    purchases: Vec<OneTimeProgramPurchase>,
    plans: HashMap<PlanId, PlanPrice>,
    programs: HashMap<ProductId, ProgramPrice>,
    paid_users: HashSet<UserId>,
    renewal_claims: HashMap<SubscriptionId, Timestamp>,
    mode: Option<GatewayMode>,
    fail_writes: bool,
}

/// Mutex-backed implementation of all billing storage ports.
#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<State>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "billing store lock poisoned"))
    }

    fn lock_for_write(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        let state = self.lock()?;
        if state.fail_writes {
            return Err(DomainError::database("simulated write failure"));
        }
        Ok(state)
    }

    // === Seeding and inspection ===

    pub fn seed_plan(&self, price: PlanPrice) {
        if let Ok(mut state) = self.lock() {
            state.plans.insert(price.plan_id.clone(), price);
        }
    }

    pub fn seed_program(&self, price: ProgramPrice) {
        if let Ok(mut state) = self.lock() {
            state.programs.insert(price.product_id.clone(), price);
        }
    }

    pub fn insert_mandate(&self, mandate: Mandate) {
        if let Ok(mut state) = self.lock() {
            state.mandates.push(mandate);
        }
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        if let Ok(mut state) = self.lock() {
            state.subscriptions.push(subscription);
        }
    }

    /// Operator toggle for the active gateway environment.
    pub fn set_mode(&self, mode: GatewayMode) {
        if let Ok(mut state) = self.lock() {
            state.mode = Some(mode);
        }
    }

    /// Makes every subsequent write fail with `DatabaseError`.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_writes = fail;
        }
    }

    pub fn mandate(&self, reference: &str) -> Option<Mandate> {
        self.lock().ok().and_then(|state| {
            state
                .mandates
                .iter()
                .find(|m| m.external_ref.as_str() == reference)
                .cloned()
        })
    }

    pub fn mandate_count(&self) -> usize {
        self.lock().map(|s| s.mandates.len()).unwrap_or(0)
    }

    pub fn purchases(&self) -> Vec<OneTimeProgramPurchase> {
        self.lock().map(|s| s.purchases.clone()).unwrap_or_default()
    }

    pub fn purchase(&self, id: &PurchaseId) -> Option<OneTimeProgramPurchase> {
        self.lock()
            .ok()
            .and_then(|state| state.purchases.iter().find(|p| p.id == *id).cloned())
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().map(|s| s.subscriptions.clone()).unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions().len()
    }

    pub fn invoices(&self) -> Vec<SubscriptionInvoice> {
        self.lock().map(|s| s.invoices.clone()).unwrap_or_default()
    }

    pub fn user_paid(&self, user_id: &UserId) -> bool {
        self.lock()
            .map(|s| s.paid_users.contains(user_id))
            .unwrap_or(false)
    }

    /// Number of times a user's flag has been flipped to paid.
    pub fn paid_user_count(&self) -> usize {
        self.lock().map(|s| s.paid_users.len()).unwrap_or(0)
    }
}

fn append_invoice(state: &mut State, invoice: &SubscriptionInvoice) -> bool {
    if state
        .invoices
        .iter()
        .any(|i| i.external_transaction_id == invoice.external_transaction_id)
    {
        return false;
    }
    state.invoices.push(invoice.clone());
    true
}

#[async_trait]
impl MandateRepository for InMemoryBillingStore {
    async fn insert(&self, mandate: &Mandate) -> Result<(), DomainError> {
        let mut state = self.lock_for_write()?;
        if state
            .mandates
            .iter()
            .any(|m| m.external_ref == mandate.external_ref)
        {
            return Err(DomainError::new(
                ErrorCode::DuplicateReference,
                format!("mandate reference {} already exists", mandate.external_ref),
            ));
        }
        state.mandates.push(mandate.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &MandateId) -> Result<Option<Mandate>, DomainError> {
        let state = self.lock()?;
        Ok(state.mandates.iter().find(|m| m.id == *id).cloned())
    }

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<Mandate>, DomainError> {
        let state = self.lock()?;
        Ok(state
            .mandates
            .iter()
            .find(|m| m.external_ref == *reference)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Mandate>, DomainError> {
        let state = self.lock()?;
        let mut active: Vec<Mandate> = state
            .mandates
            .iter()
            .filter(|m| m.status == MandateStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|m| m.created_at);
        Ok(active)
    }

    async fn transition_pending(
        &self,
        reference: &ExternalRef,
        target: MandateStatus,
        now: Timestamp,
    ) -> Result<StatusWrite<Mandate>, DomainError> {
        let mut state = self.lock_for_write()?;
        let Some(mandate) = state
            .mandates
            .iter_mut()
            .find(|m| m.external_ref == *reference)
        else {
            return Ok(StatusWrite::NotFound);
        };

        if mandate.status != MandateStatus::Pending {
            return Ok(StatusWrite::Unchanged(mandate.clone()));
        }
        mandate.status = target;
        mandate.updated_at = now;
        Ok(StatusWrite::Updated(mandate.clone()))
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryBillingStore {
    async fn find_by_mandate(
        &self,
        mandate_id: &MandateId,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.lock()?;
        Ok(state
            .subscriptions
            .iter()
            .find(|s| s.mandate_id == *mandate_id)
            .cloned())
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.lock()?;
        Ok(state
            .subscriptions
            .iter()
            .filter(|s| s.user_id == *user_id)
            .max_by_key(|s| s.end_date)
            .cloned())
    }

    async fn activate(
        &self,
        mandate: &Mandate,
        now: Timestamp,
    ) -> Result<ActivationWrite, DomainError> {
        let mut state = self.lock_for_write()?;

        let position = state
            .subscriptions
            .iter()
            .position(|s| s.mandate_id == mandate.id);

        let write = match position {
            Some(i) if state.subscriptions[i].is_current(now) => {
                ActivationWrite::Unchanged(state.subscriptions[i].clone())
            }
            Some(i) => {
                let existing = &mut state.subscriptions[i];
                existing.restart(mandate.frequency, now);
                ActivationWrite::Refreshed(existing.clone())
            }
            None => {
                let created = Subscription::for_activation(mandate, now);
                state.subscriptions.push(created.clone());
                ActivationWrite::Created(created)
            }
        };

        state.paid_users.insert(mandate.user_id.clone());
        Ok(write)
    }

    async fn claim_renewal(
        &self,
        id: &SubscriptionId,
        period_end: Timestamp,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut state = self.lock_for_write()?;
        let due = state
            .subscriptions
            .iter()
            .any(|s| s.id == *id && s.end_date == period_end);
        if !due {
            return Ok(false);
        }
        if let Some(claimed_at) = state.renewal_claims.get(id) {
            if claimed_at.is_after(&stale_before) {
                return Ok(false);
            }
        }
        state.renewal_claims.insert(*id, now);
        Ok(true)
    }

    async fn release_renewal(&self, id: &SubscriptionId) -> Result<(), DomainError> {
        let mut state = self.lock_for_write()?;
        state.renewal_claims.remove(id);
        Ok(())
    }

    async fn record_renewal(
        &self,
        renewed: &Subscription,
        previous_end: Timestamp,
        invoice: &SubscriptionInvoice,
    ) -> Result<RenewalWrite, DomainError> {
        let mut state = self.lock_for_write()?;
        state.renewal_claims.remove(&renewed.id);
        let Some(index) = state.subscriptions.iter().position(|s| s.id == renewed.id) else {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("subscription {} not found", renewed.id),
            ));
        };

        append_invoice(&mut state, invoice);

        let current = &mut state.subscriptions[index];
        if current.end_date != previous_end {
            return Ok(RenewalWrite::Superseded(current.clone()));
        }
        current.status = renewed.status;
        current.end_date = renewed.end_date;
        current.renewed_at = renewed.renewed_at;
        current.updated_at = renewed.updated_at;
        let stored = current.clone();
        state.paid_users.insert(stored.user_id.clone());
        Ok(RenewalWrite::Renewed(stored))
    }

    async fn record_failed_charge(
        &self,
        invoice: &SubscriptionInvoice,
    ) -> Result<bool, DomainError> {
        let mut state = self.lock_for_write()?;
        Ok(append_invoice(&mut state, invoice))
    }

    async fn list_invoices(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<SubscriptionInvoice>, DomainError> {
        let state = self.lock()?;
        Ok(state
            .invoices
            .iter()
            .filter(|i| i.subscription_id == *subscription_id)
            .cloned()
            .collect())
    }

    async fn is_user_paid(&self, user_id: &UserId) -> Result<bool, DomainError> {
        let state = self.lock()?;
        Ok(state.paid_users.contains(user_id))
    }
}

#[async_trait]
impl PurchaseRepository for InMemoryBillingStore {
    async fn insert(&self, purchase: &OneTimeProgramPurchase) -> Result<(), DomainError> {
        let mut state = self.lock_for_write()?;
        state.purchases.push(purchase.clone());
        Ok(())
    }

    async fn attach_order(&self, id: &PurchaseId, order_id: &OrderId) -> Result<(), DomainError> {
        let mut state = self.lock_for_write()?;
        let purchase = state
            .purchases
            .iter_mut()
            .find(|p| p.id == *id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::PurchaseNotFound, format!("purchase {} not found", id))
            })?;
        purchase.order_id = Some(order_id.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<OneTimeProgramPurchase>, DomainError> {
        let state = self.lock()?;
        Ok(state.purchases.iter().find(|p| p.id == *id).cloned())
    }

    async fn settle_pending(
        &self,
        id: &PurchaseId,
        target: PurchaseStatus,
        failure_reason: Option<&str>,
        now: Timestamp,
    ) -> Result<StatusWrite<OneTimeProgramPurchase>, DomainError> {
        let mut state = self.lock_for_write()?;
        let Some(purchase) = state.purchases.iter_mut().find(|p| p.id == *id) else {
            return Ok(StatusWrite::NotFound);
        };
        if purchase.status != PurchaseStatus::Pending {
            return Ok(StatusWrite::Unchanged(purchase.clone()));
        }
        purchase.status = target;
        purchase.failure_reason = failure_reason.map(str::to_string);
        purchase.updated_at = now;
        Ok(StatusWrite::Updated(purchase.clone()))
    }
}

#[async_trait]
impl PriceCatalog for InMemoryBillingStore {
    async fn plan_price(&self, plan_id: &PlanId) -> Result<Option<PlanPrice>, DomainError> {
        let state = self.lock()?;
        Ok(state.plans.get(plan_id).cloned())
    }

    async fn program_price(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProgramPrice>, DomainError> {
        let state = self.lock()?;
        Ok(state.programs.get(product_id).cloned())
    }
}

#[async_trait]
impl GatewayConfigStore for InMemoryBillingStore {
    async fn current_mode(&self) -> Result<Option<GatewayMode>, DomainError> {
        let state = self.lock()?;
        Ok(state.mode)
    }
}
