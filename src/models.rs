use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

// ---------------------------------------------------------------- users & roles

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageProducts,
    ManageCategories,
    ManageOrders,
    ManageCustomers,
    ManageSuppliers,
    ManageRoles,
    ManageBlog,
    ViewDashboard,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::ManageProducts,
        Permission::ManageCategories,
        Permission::ManageOrders,
        Permission::ManageCustomers,
        Permission::ManageSuppliers,
        Permission::ManageRoles,
        Permission::ManageBlog,
        Permission::ViewDashboard,
    ];
}

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_SUPPLIER: &str = "supplier";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleDef {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
    pub built_in: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateRole {
    pub description: Option<String>,
    pub permissions: Option<Vec<Permission>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
}

/// Stored user document. Never serialized to clients directly; see [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub active: Option<bool>,
    #[serde(skip)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role.clone(),
            phone: u.phone.clone(),
            address: u.address.clone(),
            active: u.active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: Id,
    pub user_id: Id,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Id>,
}

// ---------------------------------------------------------------- catalog

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: String,
    pub category_id: Option<Id>,
    pub supplier_id: Option<Id>,
    pub price_cents: i64,
    pub sale_price_cents: Option<i64>,
    pub unit: String,
    pub stock: i64,
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
    pub featured: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price a customer pays right now.
    pub fn effective_price_cents(&self) -> i64 {
        match self.sale_price_cents {
            Some(sale) if sale < self.price_cents => sale,
            _ => self.price_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<Id>,
    pub supplier_id: Option<Id>,
    pub price_cents: i64,
    pub sale_price_cents: Option<i64>,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_unit() -> String { "pc".into() }
fn default_true() -> bool { true }

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Id>,
    pub supplier_id: Option<Id>,
    pub price_cents: Option<i64>,
    /// `Some(None)` clears the sale price.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub sale_price_cents: Option<Option<i64>>,
    pub unit: Option<String>,
    pub stock: Option<i64>,
    pub image_urls: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub featured: Option<bool>,
    pub active: Option<bool>,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

// ---------------------------------------------------------------- bags & orders

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BagItem {
    pub product_id: Id,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Bag {
    pub user_id: Id,
    pub items: Vec<BagItem>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Packed,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Forward-only lifecycle; any non-terminal status may be cancelled.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() { return false; }
        matches!(
            (self, next),
            (_, Cancelled)
                | (Pending, Confirmed)
                | (Confirmed, Packed)
                | (Packed, OutForDelivery)
                | (OutForDelivery, Delivered)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
    Card,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub product_id: Id,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Id,
    pub user_id: Id,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub delivery_fee_cents: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub recurring_order_id: Option<Id>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Id,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub delivery_fee_cents: i64,
    pub total_cents: i64,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub recurring_order_id: Option<Id>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------- recurring orders

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurringStatus {
    Active,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecurringOrder {
    pub id: Id,
    pub user_id: Id,
    pub items: Vec<BagItem>,
    pub frequency: Frequency,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub status: RecurringStatus,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_order_id: Option<Id>,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecurringOrder {
    pub user_id: Id,
    pub items: Vec<BagItem>,
    pub frequency: Frequency,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub next_run_at: DateTime<Utc>,
}

// ---------------------------------------------------------------- suppliers

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupplierStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Supplier {
    pub id: Id,
    pub business_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<Address>,
    pub product_categories: Vec<String>,
    pub message: Option<String>,
    pub status: SupplierStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewSupplier {
    pub business_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<Address>,
    #[serde(default)]
    pub product_categories: Vec<String>,
    pub message: Option<String>,
}

// ---------------------------------------------------------------- blog

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlogPost {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub body: String,
    pub author: String,
    pub cover_image_url: Option<String>,
    pub tags: Vec<String>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewBlogPost {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: String,
    pub body: String,
    pub author: String,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateBlogPost {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub published: Option<bool>,
}
