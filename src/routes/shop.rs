//! Customer-facing bag, checkout, order history and recurring subscriptions.

use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::middleware::RateLimit;
use crate::models::*;
use crate::orders::{cancel_own_order, place_order, validate_items, PlaceOrder, MAX_LINE_QUANTITY};
use crate::rate_limit::Bucket;
use crate::recurring::next_occurrence;
use crate::repo::{BagRepo, OrderRepo, ProductRepo, RecurringAction, RecurringRepo, RepoError, UserRepo};

use super::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/bag").route(web::get().to(get_bag)).route(web::delete().to(clear_bag)))
        .service(web::resource("/bag/items").route(web::post().to(add_bag_item)))
        .service(
            web::resource("/bag/items/{product_id}")
                .route(web::put().to(set_bag_item))
                .route(web::delete().to(remove_bag_item)),
        )
        .service(web::resource("/checkout").wrap(RateLimit::new(Bucket::Checkout)).route(web::post().to(checkout)))
        .service(web::resource("/orders").route(web::get().to(list_my_orders)))
        .service(web::resource("/orders/{id}").route(web::get().to(get_my_order)))
        .service(web::resource("/orders/{id}/cancel").route(web::post().to(cancel_my_order)))
        .service(
            web::resource("/recurring-orders")
                .route(web::get().to(list_my_recurring))
                .route(web::post().to(create_recurring)),
        )
        .service(web::resource("/recurring-orders/{id}/pause").route(web::post().to(pause_recurring)))
        .service(web::resource("/recurring-orders/{id}/resume").route(web::post().to(resume_recurring)))
        .service(web::resource("/recurring-orders/{id}/cancel").route(web::post().to(cancel_recurring)));
}

// ---------------------------------------------------------------- bag

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BagLine {
    pub product_id: Id,
    pub name: String,
    pub slug: String,
    pub unit: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    /// False when current stock no longer covers the quantity.
    pub available: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BagView {
    pub items: Vec<BagLine>,
    pub subtotal_cents: i64,
    pub delivery_fee_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddBagItem {
    pub product_id: Id,
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 { 1 }

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuantity {
    pub quantity: i64,
}

/// Resolves bag lines against the live catalog. Lines whose product was
/// removed or deactivated are left out.
async fn bag_view(data: &AppState, bag: &Bag) -> Result<BagView, ApiError> {
    let products: HashMap<Id, Product> = data.repo.list_products().await?.into_iter().map(|p| (p.id, p)).collect();
    let items: Vec<BagLine> = bag
        .items
        .iter()
        .filter_map(|i| {
            let p = products.get(&i.product_id).filter(|p| p.active)?;
            let price = p.effective_price_cents();
            Some(BagLine {
                product_id: p.id,
                name: p.name.clone(),
                slug: p.slug.clone(),
                unit: p.unit.clone(),
                unit_price_cents: price,
                quantity: i.quantity,
                line_total_cents: price.saturating_mul(i.quantity),
                available: p.stock >= i.quantity,
            })
        })
        .collect();
    // a preview only; checkout refuses amounts that do not fit
    let subtotal_cents = items.iter().fold(0i64, |acc, l| acc.saturating_add(l.line_total_cents));
    let delivery_fee_cents = if items.is_empty() { 0 } else { data.config.pricing.delivery_fee(subtotal_cents) };
    Ok(BagView { items, subtotal_cents, delivery_fee_cents, total_cents: subtotal_cents.saturating_add(delivery_fee_cents) })
}

async fn active_product(data: &AppState, id: Id) -> Result<Product, ApiError> {
    let p = data.repo.get_product(id).await?;
    if !p.active {
        return Err(ApiError::NotFound);
    }
    Ok(p)
}

fn check_quantity(q: i64) -> Result<(), ApiError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&q) {
        return Err(ApiError::validation(format!("quantity must be between 1 and {MAX_LINE_QUANTITY}")));
    }
    Ok(())
}

#[utoipa::path(get, path = "/api/bag", responses((status = 200, description = "Current bag with totals", body = BagView)))]
pub async fn get_bag(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let bag = data.repo.get_bag(auth.0.user_id()?).await?;
    Ok(HttpResponse::Ok().json(bag_view(&data, &bag).await?))
}

#[utoipa::path(
    post,
    path = "/api/bag/items",
    request_body = AddBagItem,
    responses(
        (status = 200, description = "Updated bag", body = BagView),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Unknown or inactive product")
    )
)]
pub async fn add_bag_item(auth: Auth, data: web::Data<AppState>, payload: web::Json<AddBagItem>) -> Result<HttpResponse, ApiError> {
    let AddBagItem { product_id, quantity } = payload.into_inner();
    check_quantity(quantity)?;
    active_product(&data, product_id).await?;
    let mut bag = data.repo.get_bag(auth.0.user_id()?).await?;
    match bag.items.iter_mut().find(|i| i.product_id == product_id) {
        Some(line) => {
            check_quantity(line.quantity + quantity)?;
            line.quantity += quantity;
        }
        None => bag.items.push(BagItem { product_id, quantity }),
    }
    let bag = data.repo.save_bag(bag).await?;
    Ok(HttpResponse::Ok().json(bag_view(&data, &bag).await?))
}

#[utoipa::path(
    put,
    path = "/api/bag/items/{product_id}",
    params(("product_id" = Id, Path, description = "Product id")),
    request_body = SetQuantity,
    responses((status = 200, description = "Updated bag; quantity 0 removes the line", body = BagView))
)]
pub async fn set_bag_item(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<SetQuantity>,
) -> Result<HttpResponse, ApiError> {
    let product_id = path.into_inner();
    let quantity = payload.quantity;
    let mut bag = data.repo.get_bag(auth.0.user_id()?).await?;
    if quantity == 0 {
        bag.items.retain(|i| i.product_id != product_id);
    } else {
        check_quantity(quantity)?;
        active_product(&data, product_id).await?;
        match bag.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(line) => line.quantity = quantity,
            None => bag.items.push(BagItem { product_id, quantity }),
        }
    }
    let bag = data.repo.save_bag(bag).await?;
    Ok(HttpResponse::Ok().json(bag_view(&data, &bag).await?))
}

#[utoipa::path(
    delete,
    path = "/api/bag/items/{product_id}",
    params(("product_id" = Id, Path, description = "Product id")),
    responses((status = 200, description = "Updated bag", body = BagView))
)]
pub async fn remove_bag_item(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let product_id = path.into_inner();
    let mut bag = data.repo.get_bag(auth.0.user_id()?).await?;
    bag.items.retain(|i| i.product_id != product_id);
    let bag = data.repo.save_bag(bag).await?;
    Ok(HttpResponse::Ok().json(bag_view(&data, &bag).await?))
}

#[utoipa::path(delete, path = "/api/bag", responses((status = 204, description = "Bag emptied")))]
pub async fn clear_bag(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.repo.clear_bag(auth.0.user_id()?).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- checkout

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecurringChoice {
    pub frequency: Frequency,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Falls back to the address saved on the account.
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub recurring: Option<RecurringChoice>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: Order,
    pub recurring_order: Option<RecurringOrder>,
}

/// Deactivated or deleted accounts cannot order even with a live access token.
async fn active_user(data: &AppState, user_id: Id) -> Result<User, ApiError> {
    match data.repo.get_user(user_id).await {
        Ok(u) if u.active => Ok(u),
        Ok(_) | Err(RepoError::NotFound) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    }
}

fn shipping_address(user: &User, given: Option<Address>) -> Result<Address, ApiError> {
    if let Some(a) = given {
        validate_address(&a)?;
        return Ok(a);
    }
    user.address.clone().ok_or_else(|| ApiError::validation("shipping address is required"))
}

pub(crate) fn validate_address(a: &Address) -> Result<(), ApiError> {
    if a.line1.trim().is_empty() || a.city.trim().is_empty() || a.postal_code.trim().is_empty() {
        return Err(ApiError::validation("address needs line1, city and postal_code"));
    }
    Ok(())
}

/// Work left once the order exists. The subscription is created first; the bag
/// is emptied either way, and a bag that cannot be emptied is only logged
/// since the order already stands.
pub(crate) async fn settle_checkout<R>(
    repo: &R,
    order: &Order,
    subscription: Option<NewRecurringOrder>,
) -> Result<Option<RecurringOrder>, ApiError>
where
    R: BagRepo + RecurringRepo + ?Sized,
{
    let recurring = match subscription {
        None => Ok(None),
        Some(new) => repo.create_recurring(new).await.map(Some),
    };
    if let Err(e) = &recurring {
        tracing::error!(order_id = order.id, user_id = order.user_id, "order placed but subscription not created: {e}");
    }
    if let Err(e) = repo.clear_bag(order.user_id).await {
        tracing::warn!(order_id = order.id, user_id = order.user_id, "order placed but bag not cleared: {e}");
    }
    Ok(recurring?)
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = CheckoutResponse),
        (status = 400, description = "Empty bag or missing address"),
        (status = 404, description = "A product is no longer available"),
        (status = 409, description = "Insufficient stock"),
        (status = 429, description = "Too many checkouts")
    )
)]
pub async fn checkout(auth: Auth, data: web::Data<AppState>, payload: web::Json<CheckoutRequest>) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, auth.0.user_id()?).await?;
    let user_id = user.id;
    let req = payload.into_inner();
    let bag = data.repo.get_bag(user_id).await?;
    if bag.items.is_empty() {
        return Err(ApiError::validation("bag is empty"));
    }
    let address = shipping_address(&user, req.shipping_address)?;

    let order = place_order(
        data.repo.as_ref(),
        &data.config.pricing,
        PlaceOrder {
            user_id,
            items: bag.items.clone(),
            shipping_address: address.clone(),
            payment_method: req.payment_method,
            notes: req.notes,
            recurring_order_id: None,
        },
    )
    .await?;
    let subscription = req.recurring.map(|choice| NewRecurringOrder {
        user_id,
        items: bag.items,
        frequency: choice.frequency,
        shipping_address: address,
        payment_method: req.payment_method,
        next_run_at: next_occurrence(choice.frequency, order.created_at),
    });
    let recurring_order = settle_checkout(data.repo.as_ref(), &order, subscription).await?;
    Ok(HttpResponse::Created().json(CheckoutResponse { order, recurring_order }))
}

// ---------------------------------------------------------------- orders

#[utoipa::path(get, path = "/api/orders", responses((status = 200, description = "Own orders, newest first", body = [Order])))]
pub async fn list_my_orders(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_user_orders(auth.0.user_id()?).await?))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Id, Path, description = "Order id")),
    responses((status = 200, description = "Order", body = Order), (status = 404, description = "Not found or not yours"))
)]
pub async fn get_my_order(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let order = data.repo.get_order(path.into_inner()).await?;
    if order.user_id != auth.0.user_id()? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(order))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(("id" = Id, Path, description = "Order id")),
    responses((status = 200, description = "Cancelled", body = Order), (status = 409, description = "No longer pending"))
)]
pub async fn cancel_my_order(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let order = cancel_own_order(data.repo.as_ref(), auth.0.user_id()?, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

// ---------------------------------------------------------------- recurring

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRecurring {
    pub items: Vec<BagItem>,
    pub frequency: Frequency,
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[utoipa::path(get, path = "/api/recurring-orders", responses((status = 200, description = "Own subscriptions", body = [RecurringOrder])))]
pub async fn list_my_recurring(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_user_recurring(auth.0.user_id()?).await?))
}

#[utoipa::path(
    post,
    path = "/api/recurring-orders",
    request_body = CreateRecurring,
    responses(
        (status = 201, description = "Subscription created; first order one period from now", body = RecurringOrder),
        (status = 400, description = "Invalid items or missing address"),
        (status = 404, description = "Unknown or inactive product")
    )
)]
pub async fn create_recurring(auth: Auth, data: web::Data<AppState>, payload: web::Json<CreateRecurring>) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, auth.0.user_id()?).await?;
    let req = payload.into_inner();
    validate_items(&req.items)?;
    for item in &req.items {
        active_product(&data, item.product_id).await?;
    }
    let address = shipping_address(&user, req.shipping_address)?;
    let rec = data
        .repo
        .create_recurring(NewRecurringOrder {
            user_id: user.id,
            items: req.items,
            frequency: req.frequency,
            shipping_address: address,
            payment_method: req.payment_method,
            next_run_at: next_occurrence(req.frequency, Utc::now()),
        })
        .await?;
    Ok(HttpResponse::Created().json(rec))
}

async fn own_recurring(data: &AppState, auth: &Auth, id: Id) -> Result<RecurringOrder, ApiError> {
    let rec = match data.repo.get_recurring(id).await {
        Ok(r) => r,
        Err(RepoError::NotFound) => return Err(ApiError::NotFound),
        Err(e) => return Err(e.into()),
    };
    if rec.user_id != auth.0.user_id()? {
        return Err(ApiError::NotFound);
    }
    Ok(rec)
}

#[utoipa::path(
    post,
    path = "/api/recurring-orders/{id}/pause",
    params(("id" = Id, Path, description = "Subscription id")),
    responses((status = 200, description = "Paused", body = RecurringOrder), (status = 409, description = "Not active"))
)]
pub async fn pause_recurring(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let rec = own_recurring(&data, &auth, path.into_inner()).await?;
    let rec = data.repo.change_recurring(rec.id, RecurringAction::Pause, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(rec))
}

#[utoipa::path(
    post,
    path = "/api/recurring-orders/{id}/resume",
    params(("id" = Id, Path, description = "Subscription id")),
    responses((status = 200, description = "Active again", body = RecurringOrder), (status = 409, description = "Not paused"))
)]
pub async fn resume_recurring(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let rec = own_recurring(&data, &auth, path.into_inner()).await?;
    let rec = data.repo.change_recurring(rec.id, RecurringAction::Resume, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(rec))
}

#[utoipa::path(
    post,
    path = "/api/recurring-orders/{id}/cancel",
    params(("id" = Id, Path, description = "Subscription id")),
    responses((status = 200, description = "Cancelled for good", body = RecurringOrder), (status = 409, description = "Already cancelled"))
)]
pub async fn cancel_recurring(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let rec = own_recurring(&data, &auth, path.into_inner()).await?;
    let rec = data.repo.change_recurring(rec.id, RecurringAction::Cancel, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(rec))
}
