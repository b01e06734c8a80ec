//! Notifier that keeps every notification in memory.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{BillingNotification, BillingNotifier};

/// In-memory notifier for tests. Can be told to fail so callers'
/// fire-and-forget handling is exercised.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<BillingNotification>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(true),
        }
    }

    fn sent_guard(&self) -> MutexGuard<'_, Vec<BillingNotification>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sent(&self) -> Vec<BillingNotification> {
        self.sent_guard().clone()
    }

    pub fn count(&self) -> usize {
        self.sent_guard().len()
    }
}

#[async_trait]
impl BillingNotifier for RecordingNotifier {
    async fn notify(&self, notification: BillingNotification) -> Result<(), DomainError> {
        let failing = *self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing {
            return Err(DomainError::new(ErrorCode::InternalError, "notifier unavailable"));
        }
        self.sent_guard().push(notification);
        Ok(())
    }
}
