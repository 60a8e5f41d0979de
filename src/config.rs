use std::path::PathBuf;
use std::time::Duration;

use crate::pricing::PricingConfig;
use crate::rate_limit::RateLimitConfig;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{0} must be at least {MIN_SECRET_LEN} characters long")]
    WeakSecret(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub frontend_url: String,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub cookie_secure: bool,
    pub bootstrap_admin_emails: Vec<String>,
    pub pricing: PricingConfig,
    pub low_stock_threshold: i64,
    /// Zero disables the background recurring-order task.
    pub recurring_interval: Duration,
    pub rate_limit_enabled: bool,
    /// Key rate limits on `Forwarded`/`X-Forwarded-For` instead of the peer
    /// address. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let access_secret = get("JWT_SECRET").filter(|s| !s.is_empty()).ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if access_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret("JWT_SECRET"));
        }
        let refresh_secret = match get("JWT_REFRESH_SECRET").filter(|s| !s.is_empty()) {
            Some(s) if s.len() < MIN_SECRET_LEN => return Err(ConfigError::WeakSecret("JWT_REFRESH_SECRET")),
            Some(s) => s,
            None => access_secret.clone(),
        };

        let num = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                None => Ok(default),
                Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name, value: v }),
            }
        };
        let flag = |name: &'static str, default: bool| -> Result<bool, ConfigError> {
            match get(name).map(|v| v.trim().to_ascii_lowercase()) {
                None => Ok(default),
                Some(v) if v == "1" || v == "true" || v == "yes" => Ok(true),
                Some(v) if v == "0" || v == "false" || v == "no" => Ok(false),
                Some(v) => Err(ConfigError::Invalid { name, value: v }),
            }
        };

        let jwt = JwtConfig {
            access_secret,
            refresh_secret,
            access_ttl: Duration::from_secs(num("ACCESS_TOKEN_TTL_SECS", 15 * 60)?),
            refresh_ttl: Duration::from_secs(num("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600)?),
        };
        if jwt.access_ttl.is_zero() {
            return Err(ConfigError::Invalid { name: "ACCESS_TOKEN_TTL_SECS", value: "0".into() });
        }
        if jwt.refresh_ttl <= jwt.access_ttl {
            return Err(ConfigError::Invalid { name: "REFRESH_TOKEN_TTL_SECS", value: jwt.refresh_ttl.as_secs().to_string() });
        }

        let bootstrap_admin_emails = get("BOOTSTRAP_ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            data_dir: get("FRESHPICK_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            database_url: get("DATABASE_URL"),
            jwt,
            cookie_secure: flag("COOKIE_SECURE", false)?,
            bootstrap_admin_emails,
            pricing: PricingConfig {
                delivery_fee_cents: num("DELIVERY_FEE_CENTS", 499)? as i64,
                free_delivery_threshold_cents: num("FREE_DELIVERY_THRESHOLD_CENTS", 5000)? as i64,
            },
            low_stock_threshold: num("LOW_STOCK_THRESHOLD", 5)? as i64,
            recurring_interval: Duration::from_secs(num("RECURRING_INTERVAL_SECS", 3600)?),
            rate_limit_enabled: flag("RL_ENABLED", true)?,
            trust_proxy_headers: flag("TRUST_PROXY_HEADERS", false)?,
            rate_limit: RateLimitConfig::from_lookup(&get)?,
        })
    }

    pub fn is_bootstrap_admin(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.bootstrap_admin_emails.iter().any(|e| *e == email)
    }
}
