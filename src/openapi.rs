use crate::catalog::{ProductPage, ProductSort, SearchResults};
use crate::error::ApiErrorBody;
use crate::models::*;
use crate::pricing::Totals;
use crate::recurring::{RecurringFailure, RecurringReport};
use crate::routes::{admin, auth, catalog, shop, suppliers};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::telemetry::health,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::me,
        auth::update_me,
        catalog::list_products,
        catalog::get_product,
        catalog::list_categories,
        catalog::category_products,
        catalog::search_all,
        catalog::list_blogs,
        catalog::get_blog,
        shop::get_bag,
        shop::add_bag_item,
        shop::set_bag_item,
        shop::remove_bag_item,
        shop::clear_bag,
        shop::checkout,
        shop::list_my_orders,
        shop::get_my_order,
        shop::cancel_my_order,
        shop::list_my_recurring,
        shop::create_recurring,
        shop::pause_recurring,
        shop::resume_recurring,
        shop::cancel_recurring,
        suppliers::register_supplier,
        admin::list_products,
        admin::create_product,
        admin::get_product,
        admin::update_product,
        admin::delete_product,
        admin::adjust_stock,
        admin::list_categories,
        admin::create_category,
        admin::update_category,
        admin::delete_category,
        admin::list_orders,
        admin::get_order,
        admin::set_order_status,
        admin::list_customers,
        admin::get_customer,
        admin::update_customer,
        admin::delete_customer,
        admin::set_customer_role,
        admin::list_suppliers,
        admin::get_supplier,
        admin::set_supplier_status,
        admin::delete_supplier,
        admin::list_roles,
        admin::create_role,
        admin::update_role,
        admin::delete_role,
        admin::list_posts,
        admin::create_post,
        admin::get_post,
        admin::update_post,
        admin::delete_post,
        admin::stats,
        admin::list_recurring,
        admin::run_recurring,
    ),
    components(schemas(
        ApiErrorBody, Permission, RoleDef, NewRole, UpdateRole, Address, PublicUser,
        Category, NewCategory, UpdateCategory, Product, NewProduct, UpdateProduct,
        BagItem, Bag, OrderStatus, PaymentMethod, OrderItem, Order, Totals,
        Frequency, RecurringStatus, RecurringOrder, RecurringReport, RecurringFailure,
        SupplierStatus, Supplier, NewSupplier, BlogPost, NewBlogPost, UpdateBlogPost,
        ProductPage, ProductSort, SearchResults,
        auth::RegisterRequest, auth::LoginRequest, auth::AuthResponse, auth::UpdateProfile,
        shop::BagLine, shop::BagView, shop::AddBagItem, shop::SetQuantity,
        shop::RecurringChoice, shop::CheckoutRequest, shop::CheckoutResponse, shop::CreateRecurring,
        admin::StockAdjustment, admin::SetOrderStatus, admin::CustomerDetail, admin::UpdateCustomer,
        admin::SetRole, admin::ReviewSupplier, admin::StatusCount, admin::DashboardStats,
    )),
    tags(
        (name = "auth", description = "Accounts and sessions"),
        (name = "catalog", description = "Products, categories, search and blog"),
        (name = "shop", description = "Bag, checkout, orders and subscriptions"),
        (name = "admin", description = "Dashboard"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_storefront_and_admin_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/checkout"));
        assert!(doc.paths.paths.contains_key("/api/admin/recurring/run"));
        assert!(doc.paths.paths.contains_key("/api/auth/refresh"));
    }
}
