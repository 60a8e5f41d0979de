use actix_web::{web, HttpResponse};

use crate::catalog::{browse, search, ProductPage, ProductQuery, SearchQuery, SearchResults};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::{BlogRepo, CategoryRepo, ProductRepo, RepoError};

use super::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/products").route(web::get().to(list_products)))
        .service(web::resource("/products/{slug}").route(web::get().to(get_product)))
        .service(web::resource("/categories").route(web::get().to(list_categories)))
        .service(web::resource("/categories/{slug}/products").route(web::get().to(category_products)))
        .service(web::resource("/search").route(web::get().to(search_all)))
        .service(web::resource("/blogs").route(web::get().to(list_blogs)))
        .service(web::resource("/blogs/{slug}").route(web::get().to(get_blog)));
}

async fn product_page(data: &AppState, slug: Option<&str>, q: &ProductQuery) -> Result<ProductPage, ApiError> {
    q.validate()?;
    let category_id = match slug {
        None => None,
        Some(slug) => match data.repo.get_category_by_slug(slug).await {
            Ok(c) => Some(c.id),
            Err(RepoError::NotFound) => return Ok(q.empty_page()),
            Err(e) => return Err(e.into()),
        },
    };
    Ok(browse(data.repo.list_products().await?, category_id, q))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "One page of active products", body = ProductPage),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_products(data: web::Data<AppState>, query: web::Query<ProductQuery>) -> Result<HttpResponse, ApiError> {
    let page = product_page(&data, query.category.as_deref(), &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/products/{slug}",
    params(("slug" = String, Path, description = "Product slug")),
    responses((status = 200, description = "Product", body = Product), (status = 404, description = "Unknown or inactive product"))
)]
pub async fn get_product(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let product = data.repo.get_product_by_slug(&path.into_inner()).await?;
    if !product.active {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(get, path = "/api/categories", responses((status = 200, description = "All categories", body = [Category])))]
pub async fn list_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_categories().await?))
}

#[utoipa::path(
    get,
    path = "/api/categories/{slug}/products",
    params(("slug" = String, Path, description = "Category slug"), ProductQuery),
    responses((status = 200, description = "One page of the category's products", body = ProductPage))
)]
pub async fn category_products(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse, ApiError> {
    let slug = path.into_inner();
    let page = product_page(&data, Some(&slug), &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/search",
    params(SearchQuery),
    responses((status = 200, description = "Matching products and posts", body = SearchResults), (status = 400, description = "Blank query"))
)]
pub async fn search_all(data: web::Data<AppState>, query: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner().q.unwrap_or_default();
    if q.trim().is_empty() {
        return Err(ApiError::validation("search query is empty"));
    }
    let results = search(&q, data.repo.list_products().await?, data.repo.list_posts().await?)?;
    Ok(HttpResponse::Ok().json(results))
}

#[utoipa::path(get, path = "/api/blogs", responses((status = 200, description = "Published posts, newest first", body = [BlogPost])))]
pub async fn list_blogs(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut posts = data.repo.list_posts().await?;
    posts.retain(|p| p.published);
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/blogs/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses((status = 200, description = "Published post", body = BlogPost), (status = 404, description = "Unknown or unpublished"))
)]
pub async fn get_blog(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    if !post.published {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(post))
}
