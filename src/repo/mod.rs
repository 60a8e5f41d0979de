use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict: {0}")] Conflict(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

fn conflict(msg: impl Into<String>) -> RepoError { RepoError::Conflict(msg.into()) }

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User>;
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait RoleRepo: Send + Sync {
    async fn list_roles(&self) -> RepoResult<Vec<RoleDef>>;
    async fn get_role(&self, name: &str) -> RepoResult<RoleDef>;
    async fn create_role(&self, new: NewRole) -> RepoResult<RoleDef>;
    async fn update_role(&self, name: &str, upd: UpdateRole) -> RepoResult<RoleDef>;
    async fn delete_role(&self, name: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait TokenRepo: Send + Sync {
    async fn store_refresh_token(&self, user_id: Id, token_hash: &str, expires_at: DateTime<Utc>) -> RepoResult<RefreshTokenRecord>;
    async fn find_refresh_token(&self, token_hash: &str) -> RepoResult<RefreshTokenRecord>;
    async fn revoke_refresh_token(&self, id: Id, replaced_by: Option<Id>) -> RepoResult<()>;
    /// Revokes every live token of the user, returning how many were live.
    async fn revoke_user_tokens(&self, user_id: Id) -> RepoResult<usize>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category>;
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ProductRepo: Send + Sync {
    async fn list_products(&self) -> RepoResult<Vec<Product>>;
    async fn get_product(&self, id: Id) -> RepoResult<Product>;
    async fn get_product_by_slug(&self, slug: &str) -> RepoResult<Product>;
    async fn create_product(&self, new: NewProduct) -> RepoResult<Product>;
    async fn update_product(&self, id: Id, upd: UpdateProduct) -> RepoResult<Product>;
    async fn delete_product(&self, id: Id) -> RepoResult<()>;
    async fn adjust_stock(&self, id: Id, delta: i64) -> RepoResult<Product>;
    /// All-or-nothing stock decrement. Returns the products after reservation.
    async fn reserve_stock(&self, items: &[BagItem]) -> RepoResult<Vec<Product>>;
    async fn release_stock(&self, items: &[BagItem]) -> RepoResult<()>;
}

#[async_trait]
pub trait BagRepo: Send + Sync {
    async fn get_bag(&self, user_id: Id) -> RepoResult<Bag>;
    async fn save_bag(&self, bag: Bag) -> RepoResult<Bag>;
    async fn clear_bag(&self, user_id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait OrderRepo: Send + Sync {
    async fn create_order(&self, new: NewOrder) -> RepoResult<Order>;
    async fn get_order(&self, id: Id) -> RepoResult<Order>;
    async fn list_orders(&self) -> RepoResult<Vec<Order>>;
    async fn list_user_orders(&self, user_id: Id) -> RepoResult<Vec<Order>>;
    /// Applies a lifecycle transition; an illegal one is a conflict.
    async fn set_order_status(&self, id: Id, status: OrderStatus) -> RepoResult<Order>;
}

#[async_trait]
pub trait RecurringRepo: Send + Sync {
    async fn create_recurring(&self, new: NewRecurringOrder) -> RepoResult<RecurringOrder>;
    async fn get_recurring(&self, id: Id) -> RepoResult<RecurringOrder>;
    async fn list_recurring(&self) -> RepoResult<Vec<RecurringOrder>>;
    async fn list_user_recurring(&self, user_id: Id) -> RepoResult<Vec<RecurringOrder>>;
    async fn list_due_recurring(&self, now: DateTime<Utc>) -> RepoResult<Vec<RecurringOrder>>;
    /// Moves an active subscription from `expected` to `next_run_at` in one
    /// step. `None` means it was already claimed or is no longer active.
    async fn claim_recurring(
        &self,
        id: Id,
        expected: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> RepoResult<Option<RecurringOrder>>;
    /// Records the outcome of a claimed run without touching the schedule
    /// or a status the customer changed meanwhile.
    async fn record_recurring_run(&self, id: Id, run: RecurringRun) -> RepoResult<RecurringOrder>;
    /// Customer pause/resume/cancel; an illegal change is a conflict.
    async fn change_recurring(&self, id: Id, action: RecurringAction, now: DateTime<Utc>) -> RepoResult<RecurringOrder>;
}

/// Outcome of one processor run for a claimed subscription.
#[derive(Debug, Clone)]
pub struct RecurringRun {
    pub ran_at: DateTime<Utc>,
    pub result: Result<Id, String>,
    /// Consecutive failures after which a still-active subscription is paused.
    pub pause_after: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurringAction {
    Pause,
    Resume,
    Cancel,
}

#[async_trait]
pub trait SupplierRepo: Send + Sync {
    async fn create_supplier(&self, new: NewSupplier) -> RepoResult<Supplier>;
    async fn get_supplier(&self, id: Id) -> RepoResult<Supplier>;
    async fn list_suppliers(&self) -> RepoResult<Vec<Supplier>>;
    async fn set_supplier_status(&self, id: Id, status: SupplierStatus) -> RepoResult<Supplier>;
    async fn delete_supplier(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait BlogRepo: Send + Sync {
    async fn list_posts(&self) -> RepoResult<Vec<BlogPost>>;
    async fn get_post(&self, id: Id) -> RepoResult<BlogPost>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<BlogPost>;
    async fn create_post(&self, new: NewBlogPost) -> RepoResult<BlogPost>;
    async fn update_post(&self, id: Id, upd: UpdateBlogPost) -> RepoResult<BlogPost>;
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

pub trait Repo:
    UserRepo + RoleRepo + TokenRepo + CategoryRepo + ProductRepo + BagRepo + OrderRepo + RecurringRepo + SupplierRepo + BlogRepo
{
}

impl<T> Repo for T where
    T: UserRepo + RoleRepo + TokenRepo + CategoryRepo + ProductRepo + BagRepo + OrderRepo + RecurringRepo + SupplierRepo + BlogRepo
{
}

// ---------------------------------------------------------------------------
// Document rules shared by every backend. Each backend loads the affected
// collection into a map, applies one of these, then writes the result back.

pub(crate) fn builtin_roles(now: DateTime<Utc>) -> Vec<RoleDef> {
    vec![
        RoleDef { id: 1, name: ROLE_CUSTOMER.into(), description: "Storefront customer".into(), permissions: vec![], built_in: true, created_at: now },
        RoleDef { id: 2, name: ROLE_SUPPLIER.into(), description: "Approved supplier".into(), permissions: vec![], built_in: true, created_at: now },
        RoleDef { id: 3, name: ROLE_ADMIN.into(), description: "Full dashboard access".into(), permissions: Permission::ALL.to_vec(), built_in: true, created_at: now },
    ]
}

pub(crate) fn insert_user(users: &HashMap<Id, User>, id: Id, new: NewUser, now: DateTime<Utc>) -> RepoResult<User> {
    let email = new.email.trim().to_lowercase();
    if users.values().any(|u| u.email == email) { return Err(conflict("email already registered")); }
    Ok(User {
        id,
        name: new.name,
        email,
        password_hash: new.password_hash,
        role: new.role,
        phone: None,
        address: None,
        active: true,
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn apply_user_update(user: &mut User, upd: UpdateUser, now: DateTime<Utc>) {
    if let Some(name) = upd.name { user.name = name; }
    if let Some(phone) = upd.phone { user.phone = Some(phone); }
    if let Some(address) = upd.address { user.address = Some(address); }
    if let Some(active) = upd.active { user.active = active; }
    if let Some(role) = upd.role { user.role = role; }
    user.updated_at = now;
}

pub(crate) fn insert_role(roles: &HashMap<Id, RoleDef>, id: Id, new: NewRole, now: DateTime<Utc>) -> RepoResult<RoleDef> {
    let name = new.name.trim().to_lowercase();
    if roles.values().any(|r| r.name == name) { return Err(conflict("role already exists")); }
    Ok(RoleDef { id, name, description: new.description, permissions: unique_permissions(new.permissions), built_in: false, created_at: now })
}

fn unique_permissions(perms: Vec<Permission>) -> Vec<Permission> {
    let mut out = Vec::with_capacity(perms.len());
    for p in perms {
        if !out.contains(&p) { out.push(p); }
    }
    out
}

pub(crate) fn apply_role_update(role: &mut RoleDef, upd: UpdateRole) -> RepoResult<()> {
    if let Some(perms) = upd.permissions {
        if role.name == ROLE_ADMIN && !perms.contains(&Permission::ManageRoles) {
            return Err(conflict("admin role must keep manage_roles"));
        }
        role.permissions = unique_permissions(perms);
    }
    if let Some(d) = upd.description { role.description = d; }
    Ok(())
}

pub(crate) fn check_role_deletable<'a>(role: &RoleDef, mut users: impl Iterator<Item = &'a User>) -> RepoResult<()> {
    if role.built_in { return Err(conflict("built-in roles cannot be deleted")); }
    if users.any(|u| u.role == role.name) { return Err(conflict("role is assigned to users")); }
    Ok(())
}

pub(crate) fn insert_category(cats: &HashMap<Id, Category>, id: Id, new: NewCategory, now: DateTime<Utc>) -> RepoResult<Category> {
    if cats.values().any(|c| c.slug == new.slug) { return Err(conflict("category slug taken")); }
    Ok(Category { id, name: new.name, slug: new.slug, description: new.description, image_url: new.image_url, created_at: now })
}

pub(crate) fn apply_category_update(cats: &mut HashMap<Id, Category>, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
    if let Some(ref slug) = upd.slug {
        if cats.values().any(|c| c.slug == *slug && c.id != id) { return Err(conflict("category slug taken")); }
    }
    let cat = cats.get_mut(&id).ok_or(RepoError::NotFound)?;
    if let Some(name) = upd.name { cat.name = name; }
    if let Some(slug) = upd.slug { cat.slug = slug; }
    if let Some(d) = upd.description { cat.description = d; }
    if let Some(url) = upd.image_url { cat.image_url = Some(url); }
    Ok(cat.clone())
}

pub(crate) fn check_category_deletable<'a>(id: Id, mut products: impl Iterator<Item = &'a Product>) -> RepoResult<()> {
    if products.any(|p| p.category_id == Some(id)) { return Err(conflict("category has products")); }
    Ok(())
}

fn check_product_unique(products: &HashMap<Id, Product>, slug: Option<&str>, sku: Option<&str>, except: Option<Id>) -> RepoResult<()> {
    for p in products.values().filter(|p| Some(p.id) != except) {
        if slug == Some(p.slug.as_str()) { return Err(conflict("product slug taken")); }
        if sku == Some(p.sku.as_str()) { return Err(conflict("product sku taken")); }
    }
    Ok(())
}

pub(crate) fn insert_product(products: &HashMap<Id, Product>, id: Id, new: NewProduct, now: DateTime<Utc>) -> RepoResult<Product> {
    check_product_unique(products, Some(&new.slug), Some(&new.sku), None)?;
    Ok(Product {
        id,
        name: new.name,
        slug: new.slug,
        sku: new.sku,
        description: new.description,
        category_id: new.category_id,
        supplier_id: new.supplier_id,
        price_cents: new.price_cents,
        sale_price_cents: new.sale_price_cents,
        unit: new.unit,
        stock: new.stock,
        image_urls: new.image_urls,
        tags: new.tags,
        featured: new.featured,
        active: new.active,
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn apply_product_update(products: &mut HashMap<Id, Product>, id: Id, upd: UpdateProduct, now: DateTime<Utc>) -> RepoResult<Product> {
    check_product_unique(products, upd.slug.as_deref(), upd.sku.as_deref(), Some(id))?;
    let p = products.get_mut(&id).ok_or(RepoError::NotFound)?;
    if let Some(v) = upd.name { p.name = v; }
    if let Some(v) = upd.slug { p.slug = v; }
    if let Some(v) = upd.sku { p.sku = v; }
    if let Some(v) = upd.description { p.description = v; }
    if let Some(v) = upd.category_id { p.category_id = Some(v); }
    if let Some(v) = upd.supplier_id { p.supplier_id = Some(v); }
    if let Some(v) = upd.price_cents { p.price_cents = v; }
    if let Some(v) = upd.sale_price_cents { p.sale_price_cents = v; }
    if let Some(v) = upd.unit { p.unit = v; }
    if let Some(v) = upd.stock { p.stock = v; }
    if let Some(v) = upd.image_urls { p.image_urls = v; }
    if let Some(v) = upd.tags { p.tags = v; }
    if let Some(v) = upd.featured { p.featured = v; }
    if let Some(v) = upd.active { p.active = v; }
    p.updated_at = now;
    Ok(p.clone())
}

pub(crate) fn apply_stock_delta(products: &mut HashMap<Id, Product>, id: Id, delta: i64, now: DateTime<Utc>) -> RepoResult<Product> {
    let p = products.get_mut(&id).ok_or(RepoError::NotFound)?;
    let next = p.stock.checked_add(delta).ok_or_else(|| conflict("stock overflow"))?;
    if next < 0 { return Err(conflict("stock cannot go negative")); }
    p.stock = next;
    p.updated_at = now;
    Ok(p.clone())
}

/// Sums duplicate lines so a product listed twice is checked against its
/// combined quantity.
fn merged_quantities(items: &[BagItem]) -> Vec<(Id, i64)> {
    let mut merged: Vec<(Id, i64)> = Vec::new();
    for item in items {
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, q)) => *q += item.quantity,
            None => merged.push((item.product_id, item.quantity)),
        }
    }
    merged
}

pub(crate) fn reserve_in(products: &mut HashMap<Id, Product>, items: &[BagItem], now: DateTime<Utc>) -> RepoResult<Vec<Product>> {
    let wanted = merged_quantities(items);
    for (id, qty) in &wanted {
        let p = products.get(id).filter(|p| p.active).ok_or(RepoError::NotFound)?;
        if *qty <= 0 { return Err(conflict("quantity must be positive")); }
        if p.stock < *qty { return Err(conflict(format!("insufficient stock for {}", p.name))); }
    }
    let mut out = Vec::with_capacity(wanted.len());
    for (id, qty) in wanted {
        if let Some(p) = products.get_mut(&id) {
            p.stock -= qty;
            p.updated_at = now;
            out.push(p.clone());
        }
    }
    Ok(out)
}

/// Returns the ids whose stock changed. Products deleted since reservation are skipped.
pub(crate) fn release_in(products: &mut HashMap<Id, Product>, items: &[BagItem], now: DateTime<Utc>) -> Vec<Id> {
    let mut touched = Vec::new();
    for (id, qty) in merged_quantities(items) {
        if let Some(p) = products.get_mut(&id) {
            p.stock = p.stock.saturating_add(qty);
            p.updated_at = now;
            touched.push(id);
        }
    }
    touched
}

pub(crate) fn build_order(id: Id, new: NewOrder, now: DateTime<Utc>) -> Order {
    Order {
        id,
        user_id: new.user_id,
        items: new.items,
        subtotal_cents: new.subtotal_cents,
        delivery_fee_cents: new.delivery_fee_cents,
        total_cents: new.total_cents,
        status: OrderStatus::Pending,
        shipping_address: new.shipping_address,
        payment_method: new.payment_method,
        recurring_order_id: new.recurring_order_id,
        notes: new.notes,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn transition_order(order: &mut Order, status: OrderStatus, now: DateTime<Utc>) -> RepoResult<()> {
    if !order.status.can_transition_to(status) {
        return Err(conflict(format!("cannot move order from {:?} to {:?}", order.status, status)));
    }
    order.status = status;
    order.updated_at = now;
    Ok(())
}

pub(crate) fn build_recurring(id: Id, new: NewRecurringOrder, now: DateTime<Utc>) -> RecurringOrder {
    RecurringOrder {
        id,
        user_id: new.user_id,
        items: new.items,
        frequency: new.frequency,
        shipping_address: new.shipping_address,
        payment_method: new.payment_method,
        status: RecurringStatus::Active,
        next_run_at: new.next_run_at,
        last_run_at: None,
        last_order_id: None,
        failure_count: 0,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn claim_due(rec: &mut RecurringOrder, expected: DateTime<Utc>, next_run_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    if rec.status != RecurringStatus::Active || rec.next_run_at != expected {
        return false;
    }
    rec.next_run_at = next_run_at;
    rec.updated_at = now;
    true
}

pub(crate) fn apply_run(rec: &mut RecurringOrder, run: RecurringRun, now: DateTime<Utc>) {
    match run.result {
        Ok(order_id) => {
            rec.last_order_id = Some(order_id);
            rec.last_run_at = Some(run.ran_at);
            rec.failure_count = 0;
            rec.last_error = None;
        }
        Err(error) => {
            rec.failure_count += 1;
            rec.last_error = Some(error);
            if rec.status == RecurringStatus::Active && rec.failure_count >= run.pause_after {
                rec.status = RecurringStatus::Paused;
            }
        }
    }
    rec.updated_at = now;
}

pub(crate) fn apply_recurring_action(rec: &mut RecurringOrder, action: RecurringAction, now: DateTime<Utc>) -> RepoResult<()> {
    match action {
        RecurringAction::Pause => {
            if rec.status != RecurringStatus::Active {
                return Err(conflict("only active subscriptions can be paused"));
            }
            rec.status = RecurringStatus::Paused;
        }
        RecurringAction::Resume => {
            if rec.status != RecurringStatus::Paused {
                return Err(conflict("only paused subscriptions can be resumed"));
            }
            rec.status = RecurringStatus::Active;
            rec.failure_count = 0;
            rec.last_error = None;
            // periods missed while paused are skipped
            rec.next_run_at = crate::recurring::advance_past(rec.frequency, rec.next_run_at, now);
        }
        RecurringAction::Cancel => {
            if rec.status == RecurringStatus::Cancelled {
                return Err(conflict("subscription already cancelled"));
            }
            rec.status = RecurringStatus::Cancelled;
        }
    }
    rec.updated_at = now;
    Ok(())
}

/// A rejected application may be resubmitted; the old one is replaced. Returns
/// the id of the replaced application, if any.
pub(crate) fn check_supplier_email(suppliers: &HashMap<Id, Supplier>, email: &str) -> RepoResult<Option<Id>> {
    match suppliers.values().find(|s| s.email == email) {
        Some(s) if s.status == SupplierStatus::Rejected => Ok(Some(s.id)),
        Some(_) => Err(conflict("supplier already registered")),
        None => Ok(None),
    }
}

pub(crate) fn build_supplier(id: Id, new: NewSupplier, now: DateTime<Utc>) -> Supplier {
    Supplier {
        id,
        business_name: new.business_name,
        contact_name: new.contact_name,
        email: new.email.trim().to_lowercase(),
        phone: new.phone,
        address: new.address,
        product_categories: new.product_categories,
        message: new.message,
        status: SupplierStatus::Pending,
        created_at: now,
        reviewed_at: None,
    }
}

pub(crate) fn insert_post(posts: &HashMap<Id, BlogPost>, id: Id, new: NewBlogPost, now: DateTime<Utc>) -> RepoResult<BlogPost> {
    if posts.values().any(|p| p.slug == new.slug) { return Err(conflict("post slug taken")); }
    Ok(BlogPost {
        id,
        title: new.title,
        slug: new.slug,
        excerpt: new.excerpt,
        body: new.body,
        author: new.author,
        cover_image_url: new.cover_image_url,
        tags: new.tags,
        published: new.published,
        published_at: new.published.then_some(now),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn apply_post_update(posts: &mut HashMap<Id, BlogPost>, id: Id, upd: UpdateBlogPost, now: DateTime<Utc>) -> RepoResult<BlogPost> {
    if let Some(ref slug) = upd.slug {
        if posts.values().any(|p| p.slug == *slug && p.id != id) { return Err(conflict("post slug taken")); }
    }
    let post = posts.get_mut(&id).ok_or(RepoError::NotFound)?;
    if let Some(v) = upd.title { post.title = v; }
    if let Some(v) = upd.slug { post.slug = v; }
    if let Some(v) = upd.excerpt { post.excerpt = v; }
    if let Some(v) = upd.body { post.body = v; }
    if let Some(v) = upd.author { post.author = v; }
    if let Some(v) = upd.cover_image_url { post.cover_image_url = Some(v); }
    if let Some(v) = upd.tags { post.tags = v; }
    if let Some(v) = upd.published {
        post.published = v;
        if v && post.published_at.is_none() { post.published_at = Some(now); }
    }
    post.updated_at = now;
    Ok(post.clone())
}
