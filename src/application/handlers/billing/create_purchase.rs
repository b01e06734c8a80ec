//! CreatePurchaseHandler - Checkout for a one-time program.

use std::sync::Arc;

use crate::domain::billing::{BillingError, OneTimeProgramPurchase, PurchaseStatus};
use crate::domain::foundation::{OrderId, ProductId, PurchaseId, Timestamp, UserId};
use crate::ports::{CreateOrderRequest, PaymentGateway, PriceCatalog, PurchaseRepository};

use super::{CallbackUrls, GatewayConfigResolver};

const RETURN_KEY: &str = "purchase_id";
pub const REASON_ORDER_CREATION_FAILED: &str = "order_creation_failed";

#[derive(Debug, Clone)]
pub struct CreatePurchaseCommand {
    pub user_id: UserId,
    pub product_id: ProductId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePurchaseResult {
    pub purchase_id: PurchaseId,
    pub order_id: OrderId,
    pub payment_session_id: Option<String>,
}

/// Inserts a PENDING purchase and opens a gateway order for it.
///
/// The purchase id travels in the order tags and on the return URL;
/// both reconciliation paths settle the row through it.
pub struct CreatePurchaseHandler {
    purchases: Arc<dyn PurchaseRepository>,
    catalog: Arc<dyn PriceCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    resolver: Arc<GatewayConfigResolver>,
    urls: CallbackUrls,
}

impl CreatePurchaseHandler {
    pub fn new(
        purchases: Arc<dyn PurchaseRepository>,
        catalog: Arc<dyn PriceCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        resolver: Arc<GatewayConfigResolver>,
        urls: CallbackUrls,
    ) -> Self {
        Self {
            purchases,
            catalog,
            gateway,
            resolver,
            urls,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreatePurchaseCommand,
    ) -> Result<CreatePurchaseResult, BillingError> {
        let price = self
            .catalog
            .program_price(&cmd.product_id)
            .await?
            .ok_or_else(|| BillingError::plan_not_found(cmd.product_id.as_str()))?;

        let ctx = self.resolver.resolve().await?;

        let now = Timestamp::now();
        let purchase = OneTimeProgramPurchase::pending(
            cmd.user_id.clone(),
            cmd.product_id,
            price.amount,
            price.currency.clone(),
            now,
        )?;
        let return_url = self
            .urls
            .return_url_for(RETURN_KEY, &purchase.id.to_string())?;
        self.purchases.insert(&purchase).await?;

        let request = CreateOrderRequest {
            purchase_id: purchase.id,
            user_id: cmd.user_id,
            amount: purchase.amount,
            currency: purchase.currency.clone(),
            return_url,
            notify_url: self.urls.notify_url.clone(),
        };

        let order = match self.gateway.create_order(&ctx, request).await {
            Ok(order) => order,
            Err(err) => {
                tracing::error!(purchase_id = %purchase.id, error = %err, "Order creation failed");
                self.purchases
                    .settle_pending(
                        &purchase.id,
                        PurchaseStatus::Failed,
                        Some(REASON_ORDER_CREATION_FAILED),
                        Timestamp::now(),
                    )
                    .await?;
                return Err(err.into());
            }
        };

        self.purchases.attach_order(&purchase.id, &order.order_id).await?;
        tracing::info!(
            purchase_id = %purchase.id,
            order_id = %order.order_id,
            mode = %ctx.mode,
            "Purchase order created"
        );

        Ok(CreatePurchaseResult {
            purchase_id: purchase.id,
            order_id: order.order_id,
            payment_session_id: order.payment_session_id,
        })
    }
}
