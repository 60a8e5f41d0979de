#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use freshpick::config::AppConfig;
use freshpick::models::*;
use freshpick::repo::inmem::InMemRepo;
use freshpick::repo::{CategoryRepo, ProductRepo, UserRepo};
use freshpick::routes::auth::permissions_for;
use freshpick::AppState;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

/// Test config; the limiter is off unless `extra` turns it back on.
pub fn app_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("JWT_SECRET".into(), SECRET.into());
    vars.insert("RL_ENABLED".into(), "false".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    AppConfig::from_lookup(move |k| vars.get(k).cloned()).expect("test config")
}

pub fn state(extra: &[(&str, &str)]) -> AppState {
    AppState::new(Arc::new(InMemRepo::ephemeral()), app_config(extra))
}

/// Creates an account directly in the store and returns it with an access token.
pub async fn account(state: &AppState, email: &str, role: &str) -> (User, String) {
    let user = state
        .repo
        .create_user(NewUser { name: "Tester".into(), email: email.into(), password_hash: "unused".into(), role: role.into() })
        .await
        .unwrap();
    let perms = permissions_for(state.repo.as_ref(), role).await.unwrap();
    let pair = state.tokens.issue_pair(&user, &perms).unwrap();
    (user, pair.access)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

pub fn address() -> Address {
    Address { line1: "1 Market St".into(), line2: None, city: "Springfield".into(), postal_code: "12345".into() }
}

pub async fn category(state: &AppState, slug: &str) -> Category {
    state
        .repo
        .create_category(NewCategory { name: slug.to_uppercase(), slug: slug.into(), description: String::new(), image_url: None })
        .await
        .unwrap()
}

pub async fn product(state: &AppState, slug: &str, price_cents: i64, stock: i64, category_id: Option<Id>) -> Product {
    state
        .repo
        .create_product(NewProduct {
            name: slug.replace('-', " "),
            slug: slug.into(),
            sku: slug.to_uppercase(),
            description: format!("fresh {slug}"),
            category_id,
            supplier_id: None,
            price_cents,
            sale_price_cents: None,
            unit: "kg".into(),
            stock,
            image_urls: vec![],
            tags: vec![],
            featured: false,
            active: true,
        })
        .await
        .unwrap()
}
