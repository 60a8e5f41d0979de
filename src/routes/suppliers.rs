use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::middleware::RateLimit;
use crate::models::*;
use crate::rate_limit::Bucket;
use crate::repo::SupplierRepo;

use super::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/suppliers/register")
            .wrap(RateLimit::new(Bucket::Supplier))
            .route(web::post().to(register_supplier)),
    );
}

fn validate(new: &NewSupplier) -> Result<(), ApiError> {
    let required = [
        ("business_name", &new.business_name),
        ("contact_name", &new.contact_name),
        ("email", &new.email),
        ("phone", &new.phone),
    ];
    if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    if !new.email.contains('@') {
        return Err(ApiError::validation("email is invalid"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/suppliers/register",
    request_body = NewSupplier,
    responses(
        (status = 201, description = "Application received", body = Supplier),
        (status = 400, description = "Missing required field"),
        (status = 409, description = "An application for this email is already open"),
        (status = 429, description = "Too many applications")
    )
)]
pub async fn register_supplier(data: web::Data<AppState>, payload: web::Json<NewSupplier>) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    validate(&new)?;
    let supplier = data.repo.create_supplier(new).await?;
    log::info!("supplier application {} from {}", supplier.id, supplier.business_name);
    Ok(HttpResponse::Created().json(supplier))
}
