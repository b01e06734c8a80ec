//! Gateway environment selector port.

use crate::domain::billing::GatewayMode;
use crate::domain::foundation::DomainError;
use async_trait::async_trait;

/// Reads the operator-controlled environment switch.
///
/// Implementations must not cache: a toggle takes effect on the very
/// next read.
#[async_trait]
pub trait GatewayConfigStore: Send + Sync {
    /// `None` when the singleton row has never been written.
    async fn current_mode(&self) -> Result<Option<GatewayMode>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_config_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn GatewayConfigStore) {}
    }
}
