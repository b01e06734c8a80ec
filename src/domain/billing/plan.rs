//! Catalog prices as read by the billing core.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanId, ProductId};

/// Price of one billing period. Tax is precomputed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrice {
    pub plan_id: PlanId,
    pub base_amount: i64,
    pub tax_amount: i64,
    pub currency: String,
}

impl PlanPrice {
    pub fn total(&self) -> i64 {
        self.base_amount + self.tax_amount
    }
}

/// Price of a one-time program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramPrice {
    pub product_id: ProductId,
    pub amount: i64,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_adds_tax() {
        let price = PlanPrice {
            plan_id: PlanId::new("pro").unwrap(),
            base_amount: 84_661,
            tax_amount: 15_239,
            currency: "INR".to_string(),
        };
        assert_eq!(price.total(), 99_900);
    }
}
