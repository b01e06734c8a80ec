//! MandateLifecycle - The single writer of mandate status.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Mandate, MandateStatus};
use crate::domain::foundation::{ExternalRef, StateMachine, Timestamp};
use crate::ports::{MandateRepository, StatusWrite};

/// Result of asking for a mandate transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MandateTransition {
    /// This call moved the mandate out of PENDING.
    Applied(Mandate),
    /// The mandate was already in the requested state; nothing written.
    AlreadyInState(Mandate),
    /// The mandate is in the opposite terminal state; write refused.
    Conflict(Mandate),
}

impl MandateTransition {
    pub fn mandate(&self) -> &Mandate {
        match self {
            MandateTransition::Applied(m)
            | MandateTransition::AlreadyInState(m)
            | MandateTransition::Conflict(m) => m,
        }
    }

    pub fn into_mandate(self) -> Mandate {
        match self {
            MandateTransition::Applied(m)
            | MandateTransition::AlreadyInState(m)
            | MandateTransition::Conflict(m) => m,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, MandateTransition::Applied(_))
    }
}

/// Moves mandates from PENDING to ACTIVE or FAILED.
///
/// Each transition is one conditional write that only matches PENDING
/// rows, so concurrent webhook and callback deliveries cannot both win
/// and a late failure can never demote an ACTIVE mandate.
pub struct MandateLifecycle {
    mandates: Arc<dyn MandateRepository>,
}

impl MandateLifecycle {
    pub fn new(mandates: Arc<dyn MandateRepository>) -> Self {
        Self { mandates }
    }

    pub async fn activate(&self, reference: &ExternalRef) -> Result<MandateTransition, BillingError> {
        self.transition(reference, MandateStatus::Active).await
    }

    pub async fn mark_failed(
        &self,
        reference: &ExternalRef,
    ) -> Result<MandateTransition, BillingError> {
        self.transition(reference, MandateStatus::Failed).await
    }

    async fn transition(
        &self,
        reference: &ExternalRef,
        target: MandateStatus,
    ) -> Result<MandateTransition, BillingError> {
        if !MandateStatus::Pending.can_transition_to(&target) {
            return Err(BillingError::InvalidTransition(format!(
                "mandates cannot be moved to {}",
                target
            )));
        }

        let write = self
            .mandates
            .transition_pending(reference, target, Timestamp::now())
            .await?;

        match write {
            StatusWrite::Updated(mandate) => {
                tracing::info!(
                    mandate_ref = %reference,
                    status = %mandate.status,
                    "Mandate transitioned"
                );
                Ok(MandateTransition::Applied(mandate))
            }
            StatusWrite::Unchanged(mandate) if mandate.status == target => {
                tracing::debug!(mandate_ref = %reference, status = %target, "Mandate already in state");
                Ok(MandateTransition::AlreadyInState(mandate))
            }
            StatusWrite::Unchanged(mandate) => {
                tracing::warn!(
                    mandate_ref = %reference,
                    current = %mandate.status,
                    requested = %target,
                    "Mandate transition refused"
                );
                Ok(MandateTransition::Conflict(mandate))
            }
            StatusWrite::NotFound => {
                tracing::warn!(mandate_ref = %reference, "Mandate not found for transition");
                Err(BillingError::mandate_not_found(reference.as_str()))
            }
        }
    }
}
