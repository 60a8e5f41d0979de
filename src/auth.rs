use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::{ready, Ready};

use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::models::{Id, Permission, User};
use crate::routes::AppState;

pub const ACCESS_COOKIE: &str = "fp_access";
pub const REFRESH_COOKIE: &str = "fp_refresh";
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("password hashing failed")]
    PasswordHash,
    #[error("token rejected: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("wrong token type")]
    WrongTokenKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub perms: Vec<Permission>,
    pub typ: TokenKind,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Id, ApiError> {
        self.sub.parse().map_err(|_| ApiError::Unauthorized)
    }

    pub fn has(&self, perm: Permission) -> bool {
        self.perms.contains(&perm)
    }
}

pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Signs and validates both token kinds.
#[derive(Clone)]
pub struct TokenIssuer {
    cfg: JwtConfig,
    cookie_secure: bool,
}

impl TokenIssuer {
    pub fn new(cfg: JwtConfig, cookie_secure: bool) -> Self {
        Self { cfg, cookie_secure }
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.cfg.access_secret.as_bytes(),
            TokenKind::Refresh => self.cfg.refresh_secret.as_bytes(),
        }
    }

    pub fn sign(&self, user: &User, perms: &[Permission], kind: TokenKind, now: DateTime<Utc>) -> Result<(String, DateTime<Utc>), AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.cfg.access_ttl,
            TokenKind::Refresh => self.cfg.refresh_ttl,
        };
        let exp = now + chrono::Duration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.clone(),
            perms: perms.to_vec(),
            typ: kind,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret(kind)))?;
        Ok((token, exp))
    }

    pub fn issue_pair(&self, user: &User, perms: &[Permission]) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let (access, _) = self.sign(user, perms, TokenKind::Access, now)?;
        let (refresh, refresh_expires_at) = self.sign(user, perms, TokenKind::Refresh, now)?;
        Ok(TokenPair { access, refresh, refresh_expires_at })
    }

    /// Validate a JWT of the given kind and return its claims.
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 5;
        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret(kind)), &validation)?;
        if data.claims.typ != kind {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(data.claims)
    }

    pub fn access_cookie(&self, token: &str) -> Cookie<'static> {
        self.cookie(ACCESS_COOKIE, "/", token.to_string(), self.cfg.access_ttl.as_secs() as i64)
    }

    pub fn refresh_cookie(&self, token: &str) -> Cookie<'static> {
        self.cookie(REFRESH_COOKIE, REFRESH_COOKIE_PATH, token.to_string(), self.cfg.refresh_ttl.as_secs() as i64)
    }

    /// Expired cookies that make the browser drop both tokens.
    pub fn clearing_cookies(&self) -> [Cookie<'static>; 2] {
        [
            self.cookie(ACCESS_COOKIE, "/", String::new(), 0),
            self.cookie(REFRESH_COOKIE, REFRESH_COOKIE_PATH, String::new(), 0),
        ]
    }

    fn cookie(&self, name: &'static str, path: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build(name, value)
            .path(path)
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .max_age(CookieDuration::seconds(max_age_secs))
            .finish()
    }
}

/// Refresh tokens are only ever stored as this digest.
pub fn hash_refresh_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Extractor yielding validated access-token `Claims`, read from the
/// `fp_access` cookie or an `Authorization: Bearer` header.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            log::error!("AppState missing from app data");
            return ready(Err(ApiError::Internal));
        };
        let token = match req.cookie(ACCESS_COOKIE) {
            Some(c) if !c.value().is_empty() => Some(c.value().to_string()),
            _ => BearerAuth::from_request(req, pl).into_inner().ok().map(|b| b.token().to_string()),
        };
        let Some(token) = token else { return ready(Err(ApiError::Unauthorized)) };
        ready(state.tokens.decode(&token, TokenKind::Access).map(Auth).map_err(|e| {
            log::debug!("access token rejected: {e}");
            ApiError::Unauthorized
        }))
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::PasswordHash => ApiError::Internal,
            AuthError::InvalidCredentials | AuthError::Token(_) | AuthError::WrongTokenKind => ApiError::Unauthorized,
        }
    }
}

/// Helper macro for permission-guarding handlers.
#[macro_export]
macro_rules! require_permission {
    ($auth:expr, $perm:expr) => {
        if !$auth.0.has($perm) {
            return Err($crate::error::ApiError::Forbidden.into());
        }
    };
}
