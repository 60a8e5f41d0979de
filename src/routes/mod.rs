use std::sync::Arc;

use actix_web::{web, HttpRequest};

use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::middleware::RateLimit;
use crate::rate_limit::{Bucket, InMemoryRateLimiter, RateLimiterFacade};
use crate::repo::Repo;
use crate::telemetry;

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod shop;
pub mod suppliers;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub tokens: TokenIssuer,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, config: AppConfig) -> Self {
        let tokens = TokenIssuer::new(config.jwt.clone(), config.cookie_secure);
        let rate_limiter = config
            .rate_limit_enabled
            .then(|| RateLimiterFacade::new(InMemoryRateLimiter::new(true), config.rate_limit.clone()));
        Self { repo, tokens, rate_limiter, config: Arc::new(config) }
    }
}

/// Malformed JSON, query strings and path segments share the 400 envelope.
fn bad_request<E: std::fmt::Display>(err: E, _req: &HttpRequest) -> actix_web::Error {
    ApiError::validation(err.to_string()).into()
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(bad_request))
        .app_data(web::QueryConfig::default().error_handler(bad_request))
        .app_data(web::PathConfig::default().error_handler(bad_request))
        .route("/health", web::get().to(telemetry::health))
        .route("/metrics", web::get().to(telemetry::metrics_endpoint))
        .service(
            web::scope("/api")
                .wrap(RateLimit::new(Bucket::Api))
                .configure(auth::config)
                .configure(catalog::config)
                .configure(shop::config)
                .configure(suppliers::config)
                .service(web::scope("/admin").configure(admin::config)),
        );
}
