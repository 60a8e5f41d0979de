use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{OrderItem, Product};

/// Highest unit price the catalog accepts.
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("order amount is too large")]
pub struct AmountOverflow;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingConfig {
    pub delivery_fee_cents: i64,
    pub free_delivery_threshold_cents: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { delivery_fee_cents: 499, free_delivery_threshold_cents: 5000 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Totals {
    pub subtotal_cents: i64,
    pub delivery_fee_cents: i64,
    pub total_cents: i64,
}

impl PricingConfig {
    /// Charged on every order below the threshold, free products included.
    pub fn delivery_fee(&self, subtotal_cents: i64) -> i64 {
        if subtotal_cents >= self.free_delivery_threshold_cents {
            0
        } else {
            self.delivery_fee_cents
        }
    }

    pub fn totals(&self, items: &[OrderItem]) -> Result<Totals, AmountOverflow> {
        let subtotal_cents = items.iter().try_fold(0i64, |acc, i| acc.checked_add(i.line_total_cents)).ok_or(AmountOverflow)?;
        let delivery_fee_cents = self.delivery_fee(subtotal_cents);
        let total_cents = subtotal_cents.checked_add(delivery_fee_cents).ok_or(AmountOverflow)?;
        Ok(Totals { subtotal_cents, delivery_fee_cents, total_cents })
    }
}

pub fn line_total(unit_price_cents: i64, quantity: i64) -> Result<i64, AmountOverflow> {
    unit_price_cents.checked_mul(quantity).ok_or(AmountOverflow)
}

/// Prices one line at the product's current effective price.
pub fn order_line(product: &Product, quantity: i64) -> Result<OrderItem, AmountOverflow> {
    let unit_price_cents = product.effective_price_cents();
    Ok(OrderItem {
        product_id: product.id,
        name: product.name.clone(),
        unit_price_cents,
        quantity,
        line_total_cents: line_total(unit_price_cents, quantity)?,
    })
}
