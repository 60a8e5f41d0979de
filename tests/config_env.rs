use freshpick::config::{AppConfig, ConfigError};
use freshpick::rate_limit::Bucket;

const SECRET: &str = "env-secret-that-is-long-enough-123456";

fn clear() {
    for k in ["JWT_SECRET", "JWT_REFRESH_SECRET", "RL_CHECKOUT_LIMIT", "RL_CHECKOUT_WINDOW", "LOW_STOCK_THRESHOLD"] {
        std::env::remove_var(k);
    }
}

#[test]
#[serial_test::serial]
fn reads_the_process_environment() {
    clear();
    std::env::set_var("JWT_SECRET", SECRET);
    std::env::set_var("RL_CHECKOUT_LIMIT", "4");
    std::env::set_var("RL_CHECKOUT_WINDOW", "30");
    std::env::set_var("LOW_STOCK_THRESHOLD", "2");

    let cfg = AppConfig::from_env().unwrap();
    let checkout = cfg.rate_limit.rule(Bucket::Checkout);
    assert_eq!(checkout.limit, 4);
    assert_eq!(checkout.window.as_secs(), 30);
    assert_eq!(cfg.low_stock_threshold, 2);
    assert_eq!(cfg.jwt.refresh_secret, SECRET);
    clear();
}

#[test]
#[serial_test::serial]
fn weak_refresh_secret_is_rejected() {
    clear();
    std::env::set_var("JWT_SECRET", SECRET);
    std::env::set_var("JWT_REFRESH_SECRET", "tiny");
    assert_eq!(AppConfig::from_env().unwrap_err(), ConfigError::WeakSecret("JWT_REFRESH_SECRET"));
    clear();
}
