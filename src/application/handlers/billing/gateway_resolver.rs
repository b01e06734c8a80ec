//! GatewayConfigResolver - Picks the live gateway environment per call.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::domain::billing::BillingError;
use crate::ports::{GatewayConfigStore, GatewayContext};

/// Resolves the active gateway environment and its credentials.
///
/// The operator toggle is read on every call, never cached, so a switch
/// between sandbox and production applies to the next request. A missing
/// toggle row means sandbox.
pub struct GatewayConfigResolver {
    store: Arc<dyn GatewayConfigStore>,
    config: GatewayConfig,
}

impl GatewayConfigResolver {
    pub fn new(store: Arc<dyn GatewayConfigStore>, config: GatewayConfig) -> Self {
        Self { store, config }
    }

    /// # Errors
    ///
    /// - `Infrastructure` if the toggle cannot be read
    /// - `Infrastructure` if the selected environment has no credentials
    pub async fn resolve(&self) -> Result<GatewayContext, BillingError> {
        let mode = self.store.current_mode().await?.unwrap_or_default();
        let environment = self.config.environment(mode);

        if !environment.has_credentials() {
            tracing::error!(mode = %mode, "Active gateway environment has no credentials");
            return Err(BillingError::infrastructure(format!(
                "no credentials configured for {} gateway",
                mode
            )));
        }

        Ok(GatewayContext {
            mode,
            base_url: environment.base_url.trim_end_matches('/').to_string(),
            credential_id: environment.client_id.clone(),
            secret: environment.client_secret.clone(),
            api_version: self.config.api_version.clone(),
        })
    }

    /// Signature replay window from configuration.
    pub fn webhook_max_age_secs(&self) -> Option<i64> {
        self.config.webhook_max_age_secs
    }
}
