//! Order placement and lifecycle changes shared by checkout, the admin
//! dashboard and the recurring-order processor.

use std::collections::HashMap;

use crate::error::ApiError;
use crate::models::*;
use crate::pricing::{line_total, order_line, AmountOverflow, PricingConfig, Totals};
use crate::repo::{OrderRepo, ProductRepo, Repo, RepoError};

pub const MAX_LINE_QUANTITY: i64 = 99;

#[derive(thiserror::Error, Debug)]
pub enum OrderError {
    #[error("order has no items")]
    Empty,
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,
    #[error("product unavailable")]
    Unavailable,
    #[error("{0}")]
    Stock(String),
    #[error(transparent)]
    Amount(#[from] AmountOverflow),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Empty | OrderError::InvalidQuantity | OrderError::Amount(_) => ApiError::Validation(e.to_string()),
            OrderError::Unavailable => ApiError::NotFound,
            OrderError::Stock(msg) => ApiError::Conflict(msg),
            OrderError::Repo(r) => r.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub user_id: Id,
    pub items: Vec<BagItem>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub recurring_order_id: Option<Id>,
}

pub fn validate_items(items: &[BagItem]) -> Result<(), OrderError> {
    if items.is_empty() { return Err(OrderError::Empty); }
    if items.iter().any(|i| i.quantity < 1 || i.quantity > MAX_LINE_QUANTITY) {
        return Err(OrderError::InvalidQuantity);
    }
    Ok(())
}

/// Merges repeated products into one line each, priced from `products`.
fn price_lines(pricing: &PricingConfig, products: &[Product], items: &[BagItem]) -> Result<(Vec<OrderItem>, Totals), AmountOverflow> {
    let by_id: HashMap<Id, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let mut lines: Vec<OrderItem> = Vec::new();
    for item in items {
        if let Some(line) = lines.iter_mut().find(|l| l.product_id == item.product_id) {
            line.quantity += item.quantity;
            line.line_total_cents = line_total(line.unit_price_cents, line.quantity)?;
            continue;
        }
        let Some(product) = by_id.get(&item.product_id) else { continue };
        lines.push(order_line(product, item.quantity)?);
    }
    let totals = pricing.totals(&lines)?;
    Ok((lines, totals))
}

/// Reserves stock for every line, prices them at current effective prices and
/// stores a `Pending` order. Stock is released again if the order cannot be stored.
pub async fn place_order(repo: &dyn Repo, pricing: &PricingConfig, req: PlaceOrder) -> Result<Order, OrderError> {
    validate_items(&req.items)?;
    let reserved = repo.reserve_stock(&req.items).await.map_err(|e| match e {
        RepoError::NotFound => OrderError::Unavailable,
        RepoError::Conflict(msg) => OrderError::Stock(msg),
        other => OrderError::Repo(other),
    })?;
    let (lines, totals) = match price_lines(pricing, &reserved, &req.items) {
        Ok(priced) => priced,
        Err(e) => {
            if let Err(release_err) = repo.release_stock(&req.items).await {
                tracing::error!("failed to release stock after pricing error: {release_err}");
            }
            return Err(e.into());
        }
    };

    let new = NewOrder {
        user_id: req.user_id,
        items: lines,
        subtotal_cents: totals.subtotal_cents,
        delivery_fee_cents: totals.delivery_fee_cents,
        total_cents: totals.total_cents,
        shipping_address: req.shipping_address,
        payment_method: req.payment_method,
        recurring_order_id: req.recurring_order_id,
        notes: req.notes,
    };
    match repo.create_order(new).await {
        Ok(order) => {
            metrics::increment_counter!("freshpick_orders_created_total");
            tracing::info!(order_id = order.id, user_id = order.user_id, total_cents = order.total_cents, "order placed");
            Ok(order)
        }
        Err(e) => {
            if let Err(release_err) = repo.release_stock(&req.items).await {
                tracing::error!("failed to release stock after order write error: {release_err}");
            }
            Err(e.into())
        }
    }
}

fn order_stock(order: &Order) -> Vec<BagItem> {
    order.items.iter().map(|i| BagItem { product_id: i.product_id, quantity: i.quantity }).collect()
}

/// Moves an order through its lifecycle; cancelling puts its stock back.
pub async fn change_status(repo: &dyn Repo, id: Id, status: OrderStatus) -> Result<Order, ApiError> {
    let order = repo.set_order_status(id, status).await?;
    if status == OrderStatus::Cancelled {
        repo.release_stock(&order_stock(&order)).await?;
        tracing::info!(order_id = id, "order cancelled, stock released");
    }
    Ok(order)
}

/// Customer-initiated cancellation, only while the order is still pending.
pub async fn cancel_own_order(repo: &dyn Repo, user_id: Id, id: Id) -> Result<Order, ApiError> {
    let order = repo.get_order(id).await?;
    if order.user_id != user_id { return Err(ApiError::NotFound); }
    if order.status != OrderStatus::Pending {
        return Err(ApiError::Conflict("only pending orders can be cancelled".into()));
    }
    change_status(repo, id, OrderStatus::Cancelled).await
}
