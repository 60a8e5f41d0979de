//! Dashboard endpoints under `/api/admin`. Every handler checks one permission
//! from the caller's claims before touching the store.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::orders::change_status;
use crate::pricing::MAX_PRICE_CENTS;
use crate::recurring::{process_due, RecurringReport};
use crate::repo::{
    BlogRepo, CategoryRepo, OrderRepo, ProductRepo, RecurringRepo, RepoError, RoleRepo, SupplierRepo, TokenRepo, UserRepo,
};
use crate::require_permission;

use super::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/products").route(web::get().to(list_products)).route(web::post().to(create_product)))
        .service(
            web::resource("/products/{id}")
                .route(web::get().to(get_product))
                .route(web::put().to(update_product))
                .route(web::delete().to(delete_product)),
        )
        .service(web::resource("/products/{id}/stock").route(web::post().to(adjust_stock)))
        .service(web::resource("/categories").route(web::get().to(list_categories)).route(web::post().to(create_category)))
        .service(
            web::resource("/categories/{id}")
                .route(web::put().to(update_category))
                .route(web::delete().to(delete_category)),
        )
        .service(web::resource("/orders").route(web::get().to(list_orders)))
        .service(web::resource("/orders/{id}").route(web::get().to(get_order)))
        .service(web::resource("/orders/{id}/status").route(web::put().to(set_order_status)))
        .service(web::resource("/customers").route(web::get().to(list_customers)))
        .service(
            web::resource("/customers/{id}")
                .route(web::get().to(get_customer))
                .route(web::put().to(update_customer))
                .route(web::delete().to(delete_customer)),
        )
        .service(web::resource("/customers/{id}/role").route(web::put().to(set_customer_role)))
        .service(web::resource("/suppliers").route(web::get().to(list_suppliers)))
        .service(web::resource("/suppliers/{id}").route(web::get().to(get_supplier)).route(web::delete().to(delete_supplier)))
        .service(web::resource("/suppliers/{id}/status").route(web::put().to(set_supplier_status)))
        .service(web::resource("/roles").route(web::get().to(list_roles)).route(web::post().to(create_role)))
        .service(web::resource("/roles/{name}").route(web::put().to(update_role)).route(web::delete().to(delete_role)))
        .service(web::resource("/blogs").route(web::get().to(list_posts)).route(web::post().to(create_post)))
        .service(
            web::resource("/blogs/{id}")
                .route(web::get().to(get_post))
                .route(web::put().to(update_post))
                .route(web::delete().to(delete_post)),
        )
        .service(web::resource("/stats").route(web::get().to(stats)))
        .service(web::resource("/recurring").route(web::get().to(list_recurring)))
        .service(web::resource("/recurring/run").route(web::post().to(run_recurring)));
}

/// Maps a missing referenced document to a 400 rather than a 404 of the
/// resource being written.
fn unknown_reference(what: &'static str) -> impl FnOnce(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::validation(format!("unknown {what}")),
        other => other.into(),
    }
}

// ---------------------------------------------------------------- products

async fn check_product_refs(data: &AppState, category_id: Option<Id>, supplier_id: Option<Id>) -> Result<(), ApiError> {
    if let Some(id) = category_id {
        data.repo.get_category(id).await.map_err(unknown_reference("category"))?;
    }
    if let Some(id) = supplier_id {
        data.repo.get_supplier(id).await.map_err(unknown_reference("supplier"))?;
    }
    Ok(())
}

fn check_count(field: &str, v: Option<i64>) -> Result<(), ApiError> {
    match v {
        Some(n) if n < 0 => Err(ApiError::validation(format!("{field} cannot be negative"))),
        _ => Ok(()),
    }
}

fn check_price(field: &str, v: Option<i64>) -> Result<(), ApiError> {
    check_count(field, v)?;
    match v {
        Some(n) if n > MAX_PRICE_CENTS => Err(ApiError::validation(format!("{field} cannot exceed {MAX_PRICE_CENTS}"))),
        _ => Ok(()),
    }
}

fn check_not_blank(field: &str, v: Option<&str>) -> Result<(), ApiError> {
    match v {
        Some(s) if s.trim().is_empty() => Err(ApiError::validation(format!("{field} cannot be blank"))),
        _ => Ok(()),
    }
}

#[utoipa::path(get, path = "/api/admin/products", responses((status = 200, description = "All products, inactive included", body = [Product]), (status = 403, description = "Forbidden")))]
pub async fn list_products(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageProducts);
    Ok(HttpResponse::Ok().json(data.repo.list_products().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/products",
    request_body = NewProduct,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Invalid product"),
        (status = 409, description = "Slug or SKU taken")
    )
)]
pub async fn create_product(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewProduct>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageProducts);
    let new = payload.into_inner();
    check_not_blank("name", Some(&new.name))?;
    check_not_blank("slug", Some(&new.slug))?;
    check_not_blank("sku", Some(&new.sku))?;
    check_price("price_cents", Some(new.price_cents))?;
    check_price("sale_price_cents", new.sale_price_cents)?;
    check_count("stock", Some(new.stock))?;
    check_product_refs(&data, new.category_id, new.supplier_id).await?;
    let product = data.repo.create_product(new).await?;
    tracing::info!(product_id = product.id, by = %auth.0.sub, "product created");
    Ok(HttpResponse::Created().json(product))
}

#[utoipa::path(
    get,
    path = "/api/admin/products/{id}",
    params(("id" = Id, Path, description = "Product id")),
    responses((status = 200, description = "Product", body = Product), (status = 404, description = "Not found"))
)]
pub async fn get_product(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageProducts);
    Ok(HttpResponse::Ok().json(data.repo.get_product(path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/products/{id}",
    params(("id" = Id, Path, description = "Product id")),
    request_body = UpdateProduct,
    responses((status = 200, description = "Updated product", body = Product), (status = 404, description = "Not found"))
)]
pub async fn update_product(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateProduct>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageProducts);
    let upd = payload.into_inner();
    check_not_blank("name", upd.name.as_deref())?;
    check_not_blank("slug", upd.slug.as_deref())?;
    check_not_blank("sku", upd.sku.as_deref())?;
    check_price("price_cents", upd.price_cents)?;
    check_price("sale_price_cents", upd.sale_price_cents.flatten())?;
    check_count("stock", upd.stock)?;
    check_product_refs(&data, upd.category_id, upd.supplier_id).await?;
    Ok(HttpResponse::Ok().json(data.repo.update_product(path.into_inner(), upd).await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    params(("id" = Id, Path, description = "Product id")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found"))
)]
pub async fn delete_product(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageProducts);
    data.repo.delete_product(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StockAdjustment {
    pub delta: i64,
}

#[utoipa::path(
    post,
    path = "/api/admin/products/{id}/stock",
    params(("id" = Id, Path, description = "Product id")),
    request_body = StockAdjustment,
    responses((status = 200, description = "Stock adjusted", body = Product), (status = 409, description = "Stock would go negative"))
)]
pub async fn adjust_stock(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<StockAdjustment>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageProducts);
    let product = data.repo.adjust_stock(path.into_inner(), payload.delta).await?;
    Ok(HttpResponse::Ok().json(product))
}

// ---------------------------------------------------------------- categories

#[utoipa::path(get, path = "/api/admin/categories", responses((status = 200, description = "Categories", body = [Category])))]
pub async fn list_categories(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCategories);
    Ok(HttpResponse::Ok().json(data.repo.list_categories().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/categories",
    request_body = NewCategory,
    responses((status = 201, description = "Category created", body = Category), (status = 409, description = "Slug taken"))
)]
pub async fn create_category(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewCategory>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCategories);
    let new = payload.into_inner();
    check_not_blank("name", Some(&new.name))?;
    check_not_blank("slug", Some(&new.slug))?;
    Ok(HttpResponse::Created().json(data.repo.create_category(new).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/categories/{id}",
    params(("id" = Id, Path, description = "Category id")),
    request_body = UpdateCategory,
    responses((status = 200, description = "Updated category", body = Category))
)]
pub async fn update_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCategory>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCategories);
    let upd = payload.into_inner();
    check_not_blank("name", upd.name.as_deref())?;
    check_not_blank("slug", upd.slug.as_deref())?;
    Ok(HttpResponse::Ok().json(data.repo.update_category(path.into_inner(), upd).await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/categories/{id}",
    params(("id" = Id, Path, description = "Category id")),
    responses((status = 204, description = "Deleted"), (status = 409, description = "Category still has products"))
)]
pub async fn delete_category(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCategories);
    data.repo.delete_category(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- orders

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(OrderFilter),
    responses((status = 200, description = "Orders, newest first", body = [Order]))
)]
pub async fn list_orders(auth: Auth, data: web::Data<AppState>, query: web::Query<OrderFilter>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageOrders);
    let mut orders = data.repo.list_orders().await?;
    if let Some(status) = query.status {
        orders.retain(|o| o.status == status);
    }
    Ok(HttpResponse::Ok().json(orders))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(("id" = Id, Path, description = "Order id")),
    responses((status = 200, description = "Order", body = Order), (status = 404, description = "Not found"))
)]
pub async fn get_order(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageOrders);
    Ok(HttpResponse::Ok().json(data.repo.get_order(path.into_inner()).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetOrderStatus {
    pub status: OrderStatus,
}

#[utoipa::path(
    put,
    path = "/api/admin/orders/{id}/status",
    params(("id" = Id, Path, description = "Order id")),
    request_body = SetOrderStatus,
    responses((status = 200, description = "Status changed", body = Order), (status = 409, description = "Illegal transition"))
)]
pub async fn set_order_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<SetOrderStatus>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageOrders);
    let id = path.into_inner();
    let order = change_status(data.repo.as_ref(), id, payload.status).await?;
    tracing::info!(order_id = id, status = ?order.status, by = %auth.0.sub, "order status changed");
    Ok(HttpResponse::Ok().json(order))
}

// ---------------------------------------------------------------- customers

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CustomerFilter {
    /// Role name, e.g. `customer`.
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerDetail {
    pub customer: PublicUser,
    pub orders: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCustomer {
    pub active: Option<bool>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRole {
    pub role: String,
}

fn not_self(auth: &Auth, id: Id) -> Result<(), ApiError> {
    if auth.0.user_id()? == id {
        return Err(ApiError::Conflict("administrators cannot change their own account here".into()));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/admin/customers",
    params(CustomerFilter),
    responses((status = 200, description = "Accounts", body = [PublicUser]))
)]
pub async fn list_customers(auth: Auth, data: web::Data<AppState>, query: web::Query<CustomerFilter>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCustomers);
    let users: Vec<PublicUser> = data
        .repo
        .list_users()
        .await?
        .iter()
        .filter(|u| query.role.as_deref().map_or(true, |r| u.role == r))
        .map(PublicUser::from)
        .collect();
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    get,
    path = "/api/admin/customers/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses((status = 200, description = "Account with its orders", body = CustomerDetail), (status = 404, description = "Not found"))
)]
pub async fn get_customer(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCustomers);
    let user = data.repo.get_user(path.into_inner()).await?;
    let orders = data.repo.list_user_orders(user.id).await?;
    Ok(HttpResponse::Ok().json(CustomerDetail { customer: PublicUser::from(&user), orders }))
}

#[utoipa::path(
    put,
    path = "/api/admin/customers/{id}",
    params(("id" = Id, Path, description = "User id")),
    request_body = UpdateCustomer,
    responses((status = 200, description = "Updated account", body = PublicUser))
)]
pub async fn update_customer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCustomer>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCustomers);
    let id = path.into_inner();
    let p = payload.into_inner();
    if p.active.is_some() {
        not_self(&auth, id)?;
    }
    check_not_blank("name", p.name.as_deref())?;
    let upd = UpdateUser { name: p.name, phone: p.phone, active: p.active, ..Default::default() };
    let user = data.repo.update_user(id, upd).await?;
    if p.active == Some(false) {
        let revoked = data.repo.revoke_user_tokens(id).await?;
        tracing::info!(user_id = id, revoked, "account deactivated");
    }
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/customers/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses((status = 204, description = "Deleted"), (status = 409, description = "Cannot delete yourself"))
)]
pub async fn delete_customer(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageCustomers);
    let id = path.into_inner();
    not_self(&auth, id)?;
    data.repo.get_user(id).await?;
    data.repo.revoke_user_tokens(id).await?;
    data.repo.delete_user(id).await?;
    tracing::info!(user_id = id, by = %auth.0.sub, "account deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    put,
    path = "/api/admin/customers/{id}/role",
    params(("id" = Id, Path, description = "User id")),
    request_body = SetRole,
    responses((status = 200, description = "Role assigned", body = PublicUser), (status = 404, description = "Unknown user or role"))
)]
pub async fn set_customer_role(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<SetRole>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageRoles);
    let id = path.into_inner();
    not_self(&auth, id)?;
    let role = data.repo.get_role(payload.role.trim()).await?;
    let upd = UpdateUser { role: Some(role.name), ..Default::default() };
    let user = data.repo.update_user(id, upd).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

// ---------------------------------------------------------------- suppliers

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierFilter {
    pub status: Option<SupplierStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewSupplier {
    pub status: SupplierStatus,
}

#[utoipa::path(
    get,
    path = "/api/admin/suppliers",
    params(SupplierFilter),
    responses((status = 200, description = "Supplier applications", body = [Supplier]))
)]
pub async fn list_suppliers(auth: Auth, data: web::Data<AppState>, query: web::Query<SupplierFilter>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageSuppliers);
    let mut suppliers = data.repo.list_suppliers().await?;
    if let Some(status) = query.status {
        suppliers.retain(|s| s.status == status);
    }
    Ok(HttpResponse::Ok().json(suppliers))
}

#[utoipa::path(
    get,
    path = "/api/admin/suppliers/{id}",
    params(("id" = Id, Path, description = "Supplier id")),
    responses((status = 200, description = "Supplier", body = Supplier), (status = 404, description = "Not found"))
)]
pub async fn get_supplier(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageSuppliers);
    Ok(HttpResponse::Ok().json(data.repo.get_supplier(path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/suppliers/{id}/status",
    params(("id" = Id, Path, description = "Supplier id")),
    request_body = ReviewSupplier,
    responses(
        (status = 200, description = "Reviewed; approval promotes the matching account", body = Supplier),
        (status = 400, description = "Status must be approved or rejected")
    )
)]
pub async fn set_supplier_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReviewSupplier>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageSuppliers);
    if payload.status == SupplierStatus::Pending {
        return Err(ApiError::validation("status must be approved or rejected"));
    }
    let supplier = data.repo.set_supplier_status(path.into_inner(), payload.status).await?;
    if supplier.status == SupplierStatus::Approved {
        match data.repo.find_user_by_email(&supplier.email).await {
            Ok(user) if user.role == ROLE_CUSTOMER => {
                let upd = UpdateUser { role: Some(ROLE_SUPPLIER.into()), ..Default::default() };
                data.repo.update_user(user.id, upd).await?;
                tracing::info!(user_id = user.id, supplier_id = supplier.id, "account promoted to supplier");
            }
            Ok(_) | Err(RepoError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(HttpResponse::Ok().json(supplier))
}

#[utoipa::path(
    delete,
    path = "/api/admin/suppliers/{id}",
    params(("id" = Id, Path, description = "Supplier id")),
    responses((status = 204, description = "Deleted"))
)]
pub async fn delete_supplier(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageSuppliers);
    data.repo.delete_supplier(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- roles

#[utoipa::path(get, path = "/api/admin/roles", responses((status = 200, description = "Roles", body = [RoleDef])))]
pub async fn list_roles(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageRoles);
    Ok(HttpResponse::Ok().json(data.repo.list_roles().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/roles",
    request_body = NewRole,
    responses((status = 201, description = "Role created", body = RoleDef), (status = 409, description = "Name taken"))
)]
pub async fn create_role(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewRole>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageRoles);
    let new = payload.into_inner();
    check_not_blank("name", Some(&new.name))?;
    Ok(HttpResponse::Created().json(data.repo.create_role(new).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/roles/{name}",
    params(("name" = String, Path, description = "Role name")),
    request_body = UpdateRole,
    responses((status = 200, description = "Updated role", body = RoleDef), (status = 409, description = "Admin must keep manage_roles"))
)]
pub async fn update_role(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateRole>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageRoles);
    Ok(HttpResponse::Ok().json(data.repo.update_role(&path.into_inner(), payload.into_inner()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/roles/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses((status = 204, description = "Deleted"), (status = 409, description = "Built-in or assigned role"))
)]
pub async fn delete_role(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageRoles);
    data.repo.delete_role(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- blog

#[utoipa::path(get, path = "/api/admin/blogs", responses((status = 200, description = "All posts, drafts included", body = [BlogPost])))]
pub async fn list_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageBlog);
    Ok(HttpResponse::Ok().json(data.repo.list_posts().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/blogs",
    request_body = NewBlogPost,
    responses((status = 201, description = "Post created", body = BlogPost), (status = 409, description = "Slug taken"))
)]
pub async fn create_post(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewBlogPost>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageBlog);
    let new = payload.into_inner();
    check_not_blank("title", Some(&new.title))?;
    check_not_blank("slug", Some(&new.slug))?;
    Ok(HttpResponse::Created().json(data.repo.create_post(new).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/blogs/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 200, description = "Post", body = BlogPost))
)]
pub async fn get_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageBlog);
    Ok(HttpResponse::Ok().json(data.repo.get_post(path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/blogs/{id}",
    params(("id" = Id, Path, description = "Post id")),
    request_body = UpdateBlogPost,
    responses((status = 200, description = "Updated post", body = BlogPost))
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateBlogPost>,
) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageBlog);
    let upd = payload.into_inner();
    check_not_blank("title", upd.title.as_deref())?;
    check_not_blank("slug", upd.slug.as_deref())?;
    Ok(HttpResponse::Ok().json(data.repo.update_post(path.into_inner(), upd).await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/blogs/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 204, description = "Deleted"))
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageBlog);
    data.repo.delete_post(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- stats & recurring

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub product_count: usize,
    pub active_product_count: usize,
    pub low_stock: Vec<Product>,
    pub order_count: usize,
    pub orders_by_status: Vec<StatusCount>,
    /// Sum of totals of all orders that were not cancelled.
    pub revenue_cents: i64,
    pub customer_count: usize,
    pub pending_suppliers: usize,
    pub active_recurring: usize,
}

const ALL_STATUSES: [OrderStatus; 6] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Packed,
    OrderStatus::OutForDelivery,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
];

#[utoipa::path(get, path = "/api/admin/stats", responses((status = 200, description = "Dashboard summary", body = DashboardStats)))]
pub async fn stats(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ViewDashboard);
    let products = data.repo.list_products().await?;
    let orders = data.repo.list_orders().await?;
    let users = data.repo.list_users().await?;
    let suppliers = data.repo.list_suppliers().await?;
    let recurring = data.repo.list_recurring().await?;

    let threshold = data.config.low_stock_threshold;
    let active_product_count = products.iter().filter(|p| p.active).count();
    let low_stock = products.iter().filter(|p| p.active && p.stock <= threshold).cloned().collect();
    let orders_by_status = ALL_STATUSES
        .iter()
        .map(|s| StatusCount { status: *s, count: orders.iter().filter(|o| o.status == *s).count() })
        .collect();
    let revenue_cents = orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .fold(0i64, |acc, o| acc.saturating_add(o.total_cents));

    Ok(HttpResponse::Ok().json(DashboardStats {
        product_count: products.len(),
        active_product_count,
        low_stock,
        order_count: orders.len(),
        orders_by_status,
        revenue_cents,
        customer_count: users.iter().filter(|u| u.role == ROLE_CUSTOMER).count(),
        pending_suppliers: suppliers.iter().filter(|s| s.status == SupplierStatus::Pending).count(),
        active_recurring: recurring.iter().filter(|r| r.status == RecurringStatus::Active).count(),
    }))
}

#[utoipa::path(get, path = "/api/admin/recurring", responses((status = 200, description = "All subscriptions", body = [RecurringOrder])))]
pub async fn list_recurring(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageOrders);
    Ok(HttpResponse::Ok().json(data.repo.list_recurring().await?))
}

#[utoipa::path(post, path = "/api/admin/recurring/run", responses((status = 200, description = "Batch report", body = RecurringReport)))]
pub async fn run_recurring(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_permission!(auth, Permission::ManageOrders);
    let report = process_due(data.repo.as_ref(), &data.config.pricing, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(report))
}
