use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{hash_password, hash_refresh_token, verify_password, Auth, TokenKind, TokenPair, MIN_PASSWORD_LEN, REFRESH_COOKIE};
use crate::error::ApiError;
use crate::middleware::RateLimit;
use crate::models::*;
use crate::rate_limit::Bucket;
use crate::repo::{Repo, RepoError, RoleRepo, TokenRepo, UserRepo};

use super::shop::validate_address;
use super::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(web::resource("/register").wrap(RateLimit::new(Bucket::Auth)).route(web::post().to(register)))
            .service(web::resource("/login").wrap(RateLimit::new(Bucket::Auth)).route(web::post().to(login)))
            .service(web::resource("/refresh").wrap(RateLimit::new(Bucket::Auth)).route(web::post().to(refresh)))
            .service(web::resource("/logout").route(web::post().to(logout)))
            .service(web::resource("/me").route(web::get().to(me)).route(web::put().to(update_me))),
    );
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: PublicUser,
    /// Also set as the `fp_access` cookie; returned for bearer clients.
    pub access_token: String,
    pub expires_in: u64,
}

/// Permissions currently granted to `role`. An unknown role grants nothing.
pub async fn permissions_for(repo: &dyn Repo, role: &str) -> Result<Vec<Permission>, ApiError> {
    match repo.get_role(role).await {
        Ok(r) => Ok(r.permissions),
        Err(RepoError::NotFound) => {
            log::warn!("user holds unknown role '{role}'");
            Ok(vec![])
        }
        Err(e) => Err(e.into()),
    }
}

async fn issue_tokens(data: &AppState, user: &User) -> Result<(TokenPair, RefreshTokenRecord), ApiError> {
    let perms = permissions_for(data.repo.as_ref(), &user.role).await?;
    let pair = data.tokens.issue_pair(user, &perms)?;
    let record = data
        .repo
        .store_refresh_token(user.id, &hash_refresh_token(&pair.refresh), pair.refresh_expires_at)
        .await?;
    Ok((pair, record))
}

fn session_response(data: &AppState, status: StatusCode, user: &User, pair: TokenPair) -> HttpResponse {
    HttpResponse::build(status)
        .cookie(data.tokens.access_cookie(&pair.access))
        .cookie(data.tokens.refresh_cookie(&pair.refresh))
        .json(AuthResponse {
            user: user.into(),
            access_token: pair.access,
            expires_in: data.config.jwt.access_ttl.as_secs(),
        })
}

fn login_failed() -> ApiError {
    metrics::increment_counter!("freshpick_login_failures_total");
    ApiError::Unauthorized
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    let email = req.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(ApiError::validation("email is invalid")),
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    validate_registration(&req)?;
    let role = if data.config.is_bootstrap_admin(&req.email) { ROLE_ADMIN } else { ROLE_CUSTOMER };
    let user = data
        .repo
        .create_user(NewUser {
            name: req.name.trim().to_string(),
            email: req.email,
            password_hash: hash_password(&req.password)?,
            role: role.into(),
        })
        .await?;
    tracing::info!(user_id = user.id, role = %user.role, "user registered");
    let (pair, _) = issue_tokens(&data, &user).await?;
    Ok(session_response(&data, StatusCode::CREATED, &user, pair))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let user = match data.repo.find_user_by_email(&req.email).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return Err(login_failed()),
        Err(e) => return Err(e.into()),
    };
    if verify_password(&req.password, &user.password_hash).is_err() || !user.active {
        return Err(login_failed());
    }
    let (pair, _) = issue_tokens(&data, &user).await?;
    Ok(session_response(&data, StatusCode::OK, &user, pair))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "Token pair rotated", body = AuthResponse),
        (status = 401, description = "Missing, invalid, expired or reused refresh token")
    )
)]
pub async fn refresh(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let Some(cookie) = req.cookie(REFRESH_COOKIE).filter(|c| !c.value().is_empty()) else {
        return Err(ApiError::Unauthorized);
    };
    data.tokens.decode(cookie.value(), TokenKind::Refresh)?;

    let record = match data.repo.find_refresh_token(&hash_refresh_token(cookie.value())).await {
        Ok(r) => r,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    if record.revoked_at.is_some() {
        // a rotated token came back: treat the whole family as stolen
        let revoked = data.repo.revoke_user_tokens(record.user_id).await?;
        tracing::warn!(user_id = record.user_id, revoked, "refresh token reuse detected");
        return Err(ApiError::Unauthorized);
    }
    if record.expires_at <= chrono::Utc::now() {
        return Err(ApiError::Unauthorized);
    }
    let user = match data.repo.get_user(record.user_id).await {
        Ok(u) if u.active => u,
        Ok(_) | Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    let (pair, next) = issue_tokens(&data, &user).await?;
    data.repo.revoke_refresh_token(record.id, Some(next.id)).await?;
    Ok(session_response(&data, StatusCode::OK, &user, pair))
}

#[utoipa::path(post, path = "/api/auth/logout", responses((status = 200, description = "Signed out; cookies cleared")))]
pub async fn logout(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    if let Some(cookie) = req.cookie(REFRESH_COOKIE).filter(|c| !c.value().is_empty()) {
        match data.repo.find_refresh_token(&hash_refresh_token(cookie.value())).await {
            Ok(record) => data.repo.revoke_refresh_token(record.id, None).await?,
            Err(RepoError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    let [access, refresh] = data.tokens.clearing_cookies();
    Ok(HttpResponse::Ok()
        .cookie(access)
        .cookie(refresh)
        .json(serde_json::json!({ "success": true, "message": "signed out" })))
}

async fn current_user(auth: &Auth, data: &AppState) -> Result<User, ApiError> {
    match data.repo.get_user(auth.0.user_id()?).await {
        Ok(u) if u.active => Ok(u),
        Ok(_) | Err(RepoError::NotFound) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses((status = 200, description = "Current user", body = PublicUser), (status = 401, description = "Not signed in"))
)]
pub async fn me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = current_user(&auth, &data).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
}

#[utoipa::path(
    put,
    path = "/api/auth/me",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = PublicUser),
        (status = 400, description = "Blank name or incomplete address"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn update_me(auth: Auth, data: web::Data<AppState>, payload: web::Json<UpdateProfile>) -> Result<HttpResponse, ApiError> {
    let user = current_user(&auth, &data).await?;
    let p = payload.into_inner();
    if p.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::validation("name cannot be blank"));
    }
    if let Some(address) = &p.address {
        validate_address(address)?;
    }
    let upd = UpdateUser { name: p.name, phone: p.phone, address: p.address, ..Default::default() };
    let user = data.repo.update_user(user.id, upd).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}
