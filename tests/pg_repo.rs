#![cfg(feature = "postgres-store")]

use chrono::{Duration, Utc};
use freshpick::models::*;
use freshpick::repo::pg::PgRepo;
use freshpick::repo::{OrderRepo, ProductRepo, RepoError, RoleRepo, TokenRepo, UserRepo};

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    PgRepo::connect(&url).await.ok()
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

fn new_product(slug: &str, stock: i64) -> NewProduct {
    NewProduct {
        name: slug.into(),
        slug: slug.into(),
        sku: slug.to_uppercase(),
        description: String::new(),
        category_id: None,
        supplier_id: None,
        price_cents: 250,
        sale_price_cents: None,
        unit: "kg".into(),
        stock,
        image_urls: vec![],
        tags: vec![],
        featured: false,
        active: true,
    }
}

#[actix_rt::test]
#[serial_test::serial]
async fn builtin_roles_are_seeded_once() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    // a second migrate must not duplicate anything
    repo.migrate().await.unwrap();
    let roles = repo.list_roles().await.unwrap();
    for name in [ROLE_CUSTOMER, ROLE_SUPPLIER, ROLE_ADMIN] {
        assert_eq!(roles.iter().filter(|r| r.name == name).count(), 1, "{name}");
    }
    assert_eq!(repo.get_role(ROLE_ADMIN).await.unwrap().permissions.len(), Permission::ALL.len());
}

#[actix_rt::test]
#[serial_test::serial]
async fn emails_are_unique_ignoring_case() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let email = format!("{}@shop.test", unique("ada"));
    let user = repo
        .create_user(NewUser { name: "Ada".into(), email: email.to_uppercase(), password_hash: "x".into(), role: ROLE_CUSTOMER.into() })
        .await
        .unwrap();
    assert_eq!(user.email, email);
    let again = NewUser { name: "Ada".into(), email: email.clone(), password_hash: "x".into(), role: ROLE_CUSTOMER.into() };
    assert!(matches!(repo.create_user(again).await, Err(RepoError::Conflict(_))));
    assert_eq!(repo.find_user_by_email(&email).await.unwrap().id, user.id);
    repo.delete_user(user.id).await.unwrap();
}

#[actix_rt::test]
#[serial_test::serial]
async fn reservation_is_all_or_nothing() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let a = repo.create_product(new_product(&unique("a"), 5)).await.unwrap();
    let b = repo.create_product(new_product(&unique("b"), 1)).await.unwrap();

    let too_many = vec![BagItem { product_id: a.id, quantity: 2 }, BagItem { product_id: b.id, quantity: 2 }];
    assert!(matches!(repo.reserve_stock(&too_many).await, Err(RepoError::Conflict(_))));
    assert_eq!(repo.get_product(a.id).await.unwrap().stock, 5);

    let ok = vec![BagItem { product_id: a.id, quantity: 2 }, BagItem { product_id: b.id, quantity: 1 }];
    repo.reserve_stock(&ok).await.unwrap();
    assert_eq!(repo.get_product(a.id).await.unwrap().stock, 3);
    assert_eq!(repo.get_product(b.id).await.unwrap().stock, 0);
    repo.release_stock(&ok).await.unwrap();
    assert_eq!(repo.get_product(b.id).await.unwrap().stock, 1);

    repo.delete_product(a.id).await.unwrap();
    repo.delete_product(b.id).await.unwrap();
}

#[actix_rt::test]
#[serial_test::serial]
async fn orders_and_tokens_round_trip() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let order = repo
        .create_order(NewOrder {
            user_id: 1,
            items: vec![],
            subtotal_cents: 0,
            delivery_fee_cents: 0,
            total_cents: 0,
            shipping_address: Address { line1: "1 Main".into(), line2: None, city: "X".into(), postal_code: "1".into() },
            payment_method: PaymentMethod::Card,
            recurring_order_id: None,
            notes: None,
        })
        .await
        .unwrap();
    assert!(matches!(repo.set_order_status(order.id, OrderStatus::Packed).await, Err(RepoError::Conflict(_))));
    assert_eq!(repo.set_order_status(order.id, OrderStatus::Confirmed).await.unwrap().status, OrderStatus::Confirmed);

    let hash = unique("hash");
    let token = repo.store_refresh_token(order.id, &hash, Utc::now() + Duration::days(1)).await.unwrap();
    assert!(matches!(repo.store_refresh_token(order.id, &hash, Utc::now()).await, Err(RepoError::Conflict(_))));
    repo.revoke_refresh_token(token.id, None).await.unwrap();
    assert!(repo.find_refresh_token(&hash).await.unwrap().revoked_at.is_some());
}
