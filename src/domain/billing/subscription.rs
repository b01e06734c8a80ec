//! Subscription entity: the billing period currently granted to a user.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{BillingFrequency, Mandate};
use crate::domain::foundation::{
    MandateId, PlanId, SubscriptionId, Timestamp, UserId, ValidationError,
};

/// Stored subscription status.
///
/// `Expired` is never written by the billing core; it is derived at
/// read time via [`Subscription::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    CancellationPending,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::CancellationPending => "cancellation_pending",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "cancellation_pending" => Ok(SubscriptionStatus::CancellationPending),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "subscription_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Billing period granted against one mandate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub mandate_id: MandateId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub renewed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// First period for a freshly activated mandate.
    pub fn for_activation(mandate: &Mandate, now: Timestamp) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id: mandate.user_id.clone(),
            mandate_id: mandate.id,
            plan_id: mandate.plan_id.clone(),
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: mandate.frequency.period_end(now),
            renewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when an activation at `now` would change nothing: the row is
    /// active and its period has not run out.
    pub fn is_current(&self, now: Timestamp) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date.is_after(&now)
    }

    /// Restarts the period from `now`, keeping the row identity.
    pub fn restart(&mut self, frequency: BillingFrequency, now: Timestamp) {
        self.status = SubscriptionStatus::Active;
        self.start_date = now;
        self.end_date = frequency.period_end(now);
        self.updated_at = now;
    }

    /// Extends by one period after a successful recurring charge.
    ///
    /// The new period starts at the later of the current end date and
    /// `now`, so early renewals keep the unused days and late renewals
    /// do not backfill a lapsed gap.
    pub fn renew(&mut self, frequency: BillingFrequency, now: Timestamp) {
        let base = self.end_date.max(now);
        self.end_date = frequency.period_end(base);
        self.status = SubscriptionStatus::Active;
        self.renewed_at = Some(now);
        self.updated_at = now;
    }

    /// True when the end date falls on or before `horizon`.
    pub fn is_due(&self, horizon: Timestamp) -> bool {
        !self.end_date.is_after(&horizon)
    }

    /// Status as observed at `now`; lapsed periods read as `Expired`.
    pub fn effective_status(&self, now: Timestamp) -> SubscriptionStatus {
        if self.end_date.is_after(&now) {
            self.status
        } else {
            SubscriptionStatus::Expired
        }
    }

    /// Whether the user should hold the paid membership flag at `now`.
    pub fn grants_access(&self, now: Timestamp) -> bool {
        matches!(
            self.effective_status(now),
            SubscriptionStatus::Active | SubscriptionStatus::CancellationPending
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::NewMandate;
    use crate::domain::foundation::ExternalRef;

    fn at(s: &str) -> Timestamp {
        Timestamp::parse_rfc3339(s).unwrap()
    }

    fn mandate(frequency: BillingFrequency) -> Mandate {
        Mandate::pending(
            NewMandate {
                external_ref: ExternalRef::new("m1").unwrap(),
                user_id: UserId::new("user-1").unwrap(),
                plan_id: PlanId::new("pro").unwrap(),
                frequency,
                payment_method: "upi".to_string(),
                max_amount: 10_000,
                currency: "INR".to_string(),
            },
            at("2024-01-01T00:00:00Z"),
        )
        .unwrap()
    }

    #[test]
    fn yearly_activation_ends_365_days_later() {
        let day = at("2024-03-10T12:00:00Z");
        let sub = Subscription::for_activation(&mandate(BillingFrequency::Yearly), day);
        assert_eq!(sub.end_date, day.add_days(365));
        assert_eq!(sub.start_date, day);
    }

    #[test]
    fn monthly_activation_ends_30_days_later() {
        let day = at("2024-03-10T12:00:00Z");
        let sub = Subscription::for_activation(&mandate(BillingFrequency::Monthly), day);
        assert_eq!(sub.end_date, day.add_days(30));
    }

    #[test]
    fn early_renewal_extends_from_existing_end() {
        let start = at("2024-01-01T00:00:00Z");
        let mut sub = Subscription::for_activation(&mandate(BillingFrequency::Monthly), start);
        let now = at("2024-01-30T00:00:00Z");

        sub.renew(BillingFrequency::Monthly, now);

        assert_eq!(sub.end_date, start.add_days(60));
        assert_eq!(sub.renewed_at, Some(now));
    }

    #[test]
    fn late_renewal_extends_from_now() {
        let start = at("2024-01-01T00:00:00Z");
        let mut sub = Subscription::for_activation(&mandate(BillingFrequency::Monthly), start);
        let now = at("2024-03-01T00:00:00Z");

        sub.renew(BillingFrequency::Monthly, now);

        assert_eq!(sub.end_date, now.add_days(30));
    }

    #[test]
    fn lapsed_subscription_reads_as_expired() {
        let start = at("2024-01-01T00:00:00Z");
        let sub = Subscription::for_activation(&mandate(BillingFrequency::Monthly), start);

        assert_eq!(sub.effective_status(start.add_days(29)), SubscriptionStatus::Active);
        assert_eq!(sub.effective_status(start.add_days(30)), SubscriptionStatus::Expired);
        assert!(!sub.grants_access(start.add_days(31)));
    }

    #[test]
    fn is_current_requires_future_end() {
        let start = at("2024-01-01T00:00:00Z");
        let sub = Subscription::for_activation(&mandate(BillingFrequency::Monthly), start);
        assert!(sub.is_current(start));
        assert!(!sub.is_current(start.add_days(30)));
    }

    #[test]
    fn is_due_includes_horizon() {
        let start = at("2024-01-01T00:00:00Z");
        let sub = Subscription::for_activation(&mandate(BillingFrequency::Monthly), start);
        assert!(sub.is_due(start.add_days(30)));
        assert!(!sub.is_due(start.add_days(29)));
    }
}
