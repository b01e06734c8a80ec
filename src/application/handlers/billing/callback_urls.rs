//! Return and notify URLs handed to the gateway.

use url::Url;

use crate::domain::billing::BillingError;
use crate::domain::foundation::ValidationError;

/// Placeholder the gateway substitutes with its order id on redirect.
const ORDER_ID_PLACEHOLDER: &str = "order_id={order_id}";

#[derive(Debug, Clone)]
pub struct CallbackUrls {
    /// Browser return target, normally the callback endpoint.
    pub return_url: String,
    /// Webhook target.
    pub notify_url: String,
}

impl CallbackUrls {
    pub fn new(return_url: impl Into<String>, notify_url: impl Into<String>) -> Self {
        Self {
            return_url: return_url.into(),
            notify_url: notify_url.into(),
        }
    }

    /// Return URL carrying a correlation tag plus the order id placeholder.
    ///
    /// The placeholder is appended verbatim; URL-encoding its braces
    /// would stop the gateway from recognizing it.
    pub fn return_url_for(&self, key: &str, value: &str) -> Result<String, BillingError> {
        let mut url = Url::parse(&self.return_url).map_err(|e| {
            BillingError::Validation(ValidationError::invalid_format("return_url", e.to_string()))
        })?;
        url.query_pairs_mut().append_pair(key, value);
        Ok(format!("{}&{}", url, ORDER_ID_PLACEHOLDER))
    }
}
