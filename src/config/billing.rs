//! Billing flow configuration (redirect targets, scheduler, webhook queue)

use secrecy::SecretString;
use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Browser lands here after a verified payment
    pub success_url: String,

    /// Browser lands here with `reason` (and `orderId` when known)
    pub failure_url: String,

    /// Gateway sends the browser back here; normally the callback endpoint
    pub return_url: String,

    /// Gateway posts webhooks here
    pub notify_url: String,

    /// Shared secret for the recurring-run trigger (`x-cron-secret`)
    #[serde(default)]
    pub cron_secret: Option<SecretString>,

    /// Renew subscriptions ending within this many days
    #[serde(default = "default_renewal_lead_days")]
    pub renewal_lead_days: i64,

    /// Mandates charged concurrently in one run
    #[serde(default = "default_scheduler_concurrency")]
    pub scheduler_concurrency: usize,

    /// Webhook deliveries buffered before the endpoint waits
    #[serde(default = "default_webhook_queue_capacity")]
    pub webhook_queue_capacity: usize,
}

impl BillingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_url("billing.success_url", &self.success_url)?;
        check_url("billing.failure_url", &self.failure_url)?;
        check_url("billing.return_url", &self.return_url)?;
        check_url("billing.notify_url", &self.notify_url)?;

        if !(0..=30).contains(&self.renewal_lead_days) {
            return Err(ValidationError::OutOfRange {
                field: "billing.renewal_lead_days",
                min: 0,
                max: 30,
            });
        }
        if self.scheduler_concurrency == 0 || self.scheduler_concurrency > 64 {
            return Err(ValidationError::OutOfRange {
                field: "billing.scheduler_concurrency",
                min: 1,
                max: 64,
            });
        }
        if self.webhook_queue_capacity == 0 {
            return Err(ValidationError::OutOfRange {
                field: "billing.webhook_queue_capacity",
                min: 1,
                max: i64::MAX,
            });
        }
        Ok(())
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingRequired(field));
    }
    url::Url::parse(value).map_err(|_| ValidationError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    Ok(())
}

fn default_renewal_lead_days() -> i64 {
    1
}

fn default_scheduler_concurrency() -> usize {
    4
}

fn default_webhook_queue_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BillingConfig {
        BillingConfig {
            success_url: "https://app.example.com/billing/success".to_string(),
            failure_url: "https://app.example.com/billing/failure".to_string(),
            return_url: "https://api.example.com/api/billing/callback".to_string(),
            notify_url: "https://api.example.com/api/webhooks/gateway".to_string(),
            cron_secret: None,
            renewal_lead_days: default_renewal_lead_days(),
            scheduler_concurrency: default_scheduler_concurrency(),
            webhook_queue_capacity: default_webhook_queue_capacity(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn relative_redirect_is_rejected() {
        let config = BillingConfig {
            failure_url: "/billing/failure".to_string(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidUrl {
                field: "billing.failure_url",
                ..
            })
        ));
    }

    #[test]
    fn empty_url_is_missing() {
        let config = BillingConfig {
            notify_url: String::new(),
            ..valid()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("billing.notify_url"))
        );
    }

    #[test]
    fn scheduler_bounds_are_checked() {
        let config = BillingConfig {
            scheduler_concurrency: 0,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = BillingConfig {
            renewal_lead_days: 90,
            ..valid()
        };
        assert!(config.validate().is_err());
    }
}
