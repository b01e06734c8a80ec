//! Subscription store port.
//!
//! Every operation that touches more than one row is atomic:
//!
//! - activation writes the subscription and the user's paid flag together
//! - renewal moves the end date and appends the paid invoice together
//!
//! A renewal charge is preceded by a claim on the due period, so two
//! overlapping scheduler runs never both charge for it.
//!
//! Invoices are keyed by their external transaction id; inserting a
//! duplicate is a silent no-op (first write wins).

use crate::domain::billing::{Mandate, Subscription, SubscriptionInvoice};
use crate::domain::foundation::{DomainError, MandateId, SubscriptionId, Timestamp, UserId};
use async_trait::async_trait;

/// What an activation did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationWrite {
    /// No row existed for the mandate; one was inserted.
    Created(Subscription),
    /// An expired or non-active row was restarted from `now`.
    Refreshed(Subscription),
    /// The row was already active with a future end date.
    Unchanged(Subscription),
}

impl ActivationWrite {
    pub fn subscription(&self) -> &Subscription {
        match self {
            ActivationWrite::Created(s)
            | ActivationWrite::Refreshed(s)
            | ActivationWrite::Unchanged(s) => s,
        }
    }

    pub fn into_subscription(self) -> Subscription {
        match self {
            ActivationWrite::Created(s)
            | ActivationWrite::Refreshed(s)
            | ActivationWrite::Unchanged(s) => s,
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, ActivationWrite::Unchanged(_))
    }
}

/// What a renewal did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalWrite {
    /// End date moved and invoice appended.
    Renewed(Subscription),
    /// Another run moved the end date first; the invoice was still
    /// appended, the subscription was left as found.
    Superseded(Subscription),
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_mandate(
        &self,
        mandate_id: &MandateId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// The user's subscription with the latest end date, if any.
    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Upserts the subscription for an active mandate and sets the
    /// owner's paid flag, in one transaction.
    ///
    /// A row that is already active with an end date after `now` is
    /// left untouched and reported as `Unchanged`.
    async fn activate(&self, mandate: &Mandate, now: Timestamp)
        -> Result<ActivationWrite, DomainError>;

    /// Claims the period ending at `period_end` for one charge attempt.
    ///
    /// Returns false when the end date has moved on, or when another run
    /// holds a claim taken after `stale_before`. Older claims belong to a
    /// run that died and are taken over.
    async fn claim_renewal(
        &self,
        id: &SubscriptionId,
        period_end: Timestamp,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<bool, DomainError>;

    /// Drops any renewal claim on the subscription.
    async fn release_renewal(&self, id: &SubscriptionId) -> Result<(), DomainError>;

    /// Persists a renewed subscription and its paid invoice atomically,
    /// clearing the renewal claim.
    ///
    /// The end date only moves if it still equals `previous_end`.
    async fn record_renewal(
        &self,
        renewed: &Subscription,
        previous_end: Timestamp,
        invoice: &SubscriptionInvoice,
    ) -> Result<RenewalWrite, DomainError>;

    /// Appends a failed-charge invoice. Returns false for a replayed
    /// transaction id.
    async fn record_failed_charge(&self, invoice: &SubscriptionInvoice)
        -> Result<bool, DomainError>;

    /// Invoices for a subscription, oldest first.
    async fn list_invoices(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<SubscriptionInvoice>, DomainError>;

    /// Current value of the user's paid membership flag.
    async fn is_user_paid(&self, user_id: &UserId) -> Result<bool, DomainError>;
}
