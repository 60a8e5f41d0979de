//! Storefront browsing: filtering, sorting and paginating the product list,
//! plus free-text search across products and blog posts.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::models::{BlogPost, Id, Product};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    /// Category slug.
    pub category: Option<String>,
    pub q: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub featured: Option<bool>,
    pub in_stock: Option<bool>,
    pub sort: Option<ProductSort>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl ProductQuery {
    pub fn page(&self) -> usize { self.page.unwrap_or(1).max(1) }
    pub fn limit(&self) -> usize { self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) }

    pub fn validate(&self) -> Result<(), ApiError> {
        if let (Some(lo), Some(hi)) = (self.min_price, self.max_price) {
            if lo > hi { return Err(ApiError::validation("min_price exceeds max_price")); }
        }
        if self.min_price.is_some_and(|p| p < 0) || self.max_price.is_some_and(|p| p < 0) {
            return Err(ApiError::validation("prices cannot be negative"));
        }
        Ok(())
    }

    pub fn empty_page(&self) -> ProductPage {
        ProductPage { items: vec![], total: 0, page: self.page(), limit: self.limit() }
    }
}

fn normalize(s: &str) -> String { s.trim().to_lowercase() }

pub fn product_matches(p: &Product, needle: &str) -> bool {
    p.name.to_lowercase().contains(needle)
        || p.description.to_lowercase().contains(needle)
        || p.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Applies the storefront filters to `products`; only active products are shown.
/// `category_id` is the already-resolved category slug.
pub fn browse(products: Vec<Product>, category_id: Option<Id>, q: &ProductQuery) -> ProductPage {
    let needle = q.q.as_deref().map(normalize).filter(|s| !s.is_empty());
    let mut items: Vec<Product> = products
        .into_iter()
        .filter(|p| p.active)
        .filter(|p| category_id.is_none() || p.category_id == category_id)
        .filter(|p| needle.as_deref().map_or(true, |n| product_matches(p, n)))
        .filter(|p| q.min_price.map_or(true, |min| p.effective_price_cents() >= min))
        .filter(|p| q.max_price.map_or(true, |max| p.effective_price_cents() <= max))
        .filter(|p| q.featured.map_or(true, |f| p.featured == f))
        .filter(|p| !q.in_stock.unwrap_or(false) || p.stock > 0)
        .collect();

    match q.sort.unwrap_or_default() {
        ProductSort::Newest => items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
        ProductSort::PriceAsc => items.sort_by_key(|p| (p.effective_price_cents(), p.id)),
        ProductSort::PriceDesc => items.sort_by(|a, b| b.effective_price_cents().cmp(&a.effective_price_cents()).then(a.id.cmp(&b.id))),
        ProductSort::Name => items.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
    }

    let (page, limit) = (q.page(), q.limit());
    let total = items.len();
    let items = items.into_iter().skip((page - 1).saturating_mul(limit)).take(limit).collect();
    ProductPage { items, total, page, limit }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SearchResults {
    pub products: Vec<Product>,
    pub blogs: Vec<BlogPost>,
}

pub const SEARCH_LIMIT: usize = 20;

pub fn search(q: &str, products: Vec<Product>, posts: Vec<BlogPost>) -> Result<SearchResults, ApiError> {
    let needle = normalize(q);
    if needle.is_empty() { return Err(ApiError::validation("search query is empty")); }
    let products = products
        .into_iter()
        .filter(|p| p.active && product_matches(p, &needle))
        .take(SEARCH_LIMIT)
        .collect();
    let blogs = posts
        .into_iter()
        .filter(|b| b.published)
        .filter(|b| {
            b.title.to_lowercase().contains(&needle)
                || b.excerpt.to_lowercase().contains(&needle)
                || b.tags.iter().any(|t| t.to_lowercase().contains(&needle))
        })
        .take(SEARCH_LIMIT)
        .collect();
    Ok(SearchResults { products, blogs })
}
