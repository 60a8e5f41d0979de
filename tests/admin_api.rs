#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use freshpick::config;
use freshpick::models::*;
use freshpick::orders::{place_order, OrderError, PlaceOrder};
use freshpick::pricing::MAX_PRICE_CENTS;
use freshpick::repo::{ProductRepo, RecurringRepo, SupplierRepo, TokenRepo, UserRepo};
use freshpick::routes::auth::permissions_for;
use freshpick::AppState;
use serde_json::{json, Value};

use common::{account, address, bearer, category, product, state};

async fn order_for(state: &AppState, user_id: Id, product_id: Id, quantity: i64) -> Order {
    place_order(
        state.repo.as_ref(),
        &state.config.pricing,
        PlaceOrder {
            user_id,
            items: vec![BagItem { product_id, quantity }],
            shipping_address: address(),
            payment_method: PaymentMethod::Card,
            notes: None,
            recurring_order_id: None,
        },
    )
    .await
    .unwrap()
}

#[actix_web::test]
async fn customers_are_forbidden_and_anonymous_is_unauthorized() {
    let state = state(&[]);
    let (_, customer) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    for uri in ["/api/admin/products", "/api/admin/orders", "/api/admin/customers", "/api/admin/stats", "/api/admin/roles"] {
        let req = test::TestRequest::get().uri(uri).insert_header(bearer(&customer)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403, "{uri}");
        let req = test::TestRequest::get().uri(uri).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401, "{uri}");
    }
}

#[actix_web::test]
async fn product_and_category_management() {
    let state = state(&[]);
    let (_, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/categories")
        .insert_header(bearer(&admin))
        .set_json(json!({ "name": "Dairy", "slug": "dairy" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let cat: Value = test::read_body_json(resp).await;
    let cat_id = cat["id"].as_i64().unwrap();

    let create = |body: Value| {
        test::TestRequest::post().uri("/api/admin/products").insert_header(bearer(&admin)).set_json(body).to_request()
    };
    let resp = test::call_service(
        &app,
        create(json!({ "name": "Milk", "slug": "milk", "sku": "MLK-1", "price_cents": 199, "sale_price_cents": 149, "category_id": cat_id, "stock": 12 })),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let milk: Value = test::read_body_json(resp).await;
    let milk_id = milk["id"].as_i64().unwrap();
    assert_eq!(milk["unit"], "pc");
    assert_eq!(milk["active"], true);

    let bad = [
        json!({ "name": "Cheese", "slug": "cheese", "sku": "CHS", "price_cents": -1 }),
        json!({ "name": " ", "slug": "cheese", "sku": "CHS", "price_cents": 100 }),
        json!({ "name": "Cheese", "slug": "cheese", "sku": "CHS", "price_cents": 100, "category_id": 424242 }),
    ];
    for body in bad {
        assert_eq!(test::call_service(&app, create(body)).await.status(), 400);
    }
    let dup = json!({ "name": "Milk 2", "slug": "milk", "sku": "MLK-2", "price_cents": 100 });
    assert_eq!(test::call_service(&app, create(dup)).await.status(), 409);

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/products/{milk_id}"))
        .insert_header(bearer(&admin))
        .set_json(json!({ "sale_price_cents": null, "active": false }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert!(updated["sale_price_cents"].is_null());
    assert_eq!(updated["active"], false);

    // inactive products still show up for admins
    let req = test::TestRequest::get().uri("/api/admin/products").insert_header(bearer(&admin)).to_request();
    let all: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let stock = |delta: i64| {
        test::TestRequest::post()
            .uri(&format!("/api/admin/products/{milk_id}/stock"))
            .insert_header(bearer(&admin))
            .set_json(json!({ "delta": delta }))
            .to_request()
    };
    let p: Value = test::call_and_read_body_json(&app, stock(5)).await;
    assert_eq!(p["stock"], 17);
    assert_eq!(test::call_service(&app, stock(-100)).await.status(), 409);

    let req = test::TestRequest::delete().uri(&format!("/api/admin/categories/{cat_id}")).insert_header(bearer(&admin)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::delete().uri(&format!("/api/admin/products/{milk_id}")).insert_header(bearer(&admin)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    let req = test::TestRequest::get().uri(&format!("/api/admin/products/{milk_id}")).insert_header(bearer(&admin)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::delete().uri(&format!("/api/admin/categories/{cat_id}")).insert_header(bearer(&admin)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
}

#[actix_web::test]
async fn prices_above_the_cap_are_rejected() {
    let state = state(&[]);
    let (_, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let create = |price: i64, sale: Option<i64>| {
        test::TestRequest::post()
            .uri("/api/admin/products")
            .insert_header(bearer(&admin))
            .set_json(json!({ "name": "Truffle", "slug": format!("truffle-{price}"), "sku": format!("TRF-{price}"), "price_cents": price, "sale_price_cents": sale }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, create(MAX_PRICE_CENTS + 1, None)).await.status(), 400);
    assert_eq!(test::call_service(&app, create(i64::MAX, None)).await.status(), 400);
    assert_eq!(test::call_service(&app, create(500, Some(MAX_PRICE_CENTS + 1))).await.status(), 400);
    let resp = test::call_service(&app, create(MAX_PRICE_CENTS, None)).await;
    assert_eq!(resp.status(), 201);
    let truffle: Value = test::read_body_json(resp).await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/products/{}", truffle["id"]))
        .insert_header(bearer(&admin))
        .set_json(json!({ "price_cents": i64::MAX }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn unpriceable_orders_leave_stock_alone() {
    let state = state(&[]);
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    // written straight to the store, bypassing the admin price cap
    let gold = product(&state, "gold", i64::MAX / 2, 10, None).await;

    let req = PlaceOrder {
        user_id: ada.id,
        items: vec![BagItem { product_id: gold.id, quantity: 3 }],
        shipping_address: address(),
        payment_method: PaymentMethod::Card,
        notes: None,
        recurring_order_id: None,
    };
    let err = place_order(state.repo.as_ref(), &state.config.pricing, req).await.unwrap_err();
    assert!(matches!(err, OrderError::Amount(_)));
    assert_eq!(state.repo.get_product(gold.id).await.unwrap().stock, 10);
}

#[actix_web::test]
async fn order_status_follows_the_lifecycle() {
    let state = state(&[]);
    let (_, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let apple = product(&state, "apple", 300, 10, None).await;
    let first = order_for(&state, ada.id, apple.id, 2).await;
    let second = order_for(&state, ada.id, apple.id, 3).await;
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let set = |id: Id, status: &str| {
        test::TestRequest::put()
            .uri(&format!("/api/admin/orders/{id}/status"))
            .insert_header(bearer(&admin))
            .set_json(json!({ "status": status }))
            .to_request()
    };
    let o: Value = test::call_and_read_body_json(&app, set(first.id, "confirmed")).await;
    assert_eq!(o["status"], "confirmed");
    assert_eq!(test::call_service(&app, set(first.id, "delivered")).await.status(), 409);
    for s in ["packed", "out_for_delivery", "delivered"] {
        assert_eq!(test::call_service(&app, set(first.id, s)).await.status(), 200, "{s}");
    }
    assert_eq!(test::call_service(&app, set(first.id, "cancelled")).await.status(), 409);
    assert_eq!(test::call_service(&app, set(first.id, "shipped")).await.status(), 400);

    assert_eq!(state.repo.get_product(apple.id).await.unwrap().stock, 5);
    assert_eq!(test::call_service(&app, set(second.id, "cancelled")).await.status(), 200);
    assert_eq!(state.repo.get_product(apple.id).await.unwrap().stock, 8);

    let req = test::TestRequest::get().uri("/api/admin/orders?status=cancelled").insert_header(bearer(&admin)).to_request();
    let cancelled: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cancelled.as_array().unwrap().len(), 1);
    assert_eq!(cancelled[0]["id"], second.id);

    let req = test::TestRequest::get().uri(&format!("/api/admin/orders/{}", first.id)).insert_header(bearer(&admin)).to_request();
    let o: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(o["status"], "delivered");
}

#[actix_web::test]
async fn customer_management() {
    let state = state(&[]);
    let (boss, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let (ada, ada_token) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let (bob, _) = account(&state, "bob@shop.test", ROLE_CUSTOMER).await;
    let apple = product(&state, "apple", 300, 10, None).await;
    order_for(&state, ada.id, apple.id, 1).await;
    state.repo.store_refresh_token(ada.id, "ada-refresh", Utc::now() + Duration::days(1)).await.unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/admin/customers?role=customer").insert_header(bearer(&admin)).to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert!(list[0].get("password_hash").is_none());

    let req = test::TestRequest::get().uri(&format!("/api/admin/customers/{}", ada.id)).insert_header(bearer(&admin)).to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["customer"]["email"], "ada@shop.test");
    assert_eq!(detail["orders"].as_array().unwrap().len(), 1);

    let update = |id: Id, body: Value| {
        test::TestRequest::put()
            .uri(&format!("/api/admin/customers/{id}"))
            .insert_header(bearer(&admin))
            .set_json(body)
            .to_request()
    };
    let u: Value = test::call_and_read_body_json(&app, update(ada.id, json!({ "active": false }))).await;
    assert_eq!(u["active"], false);
    assert!(state.repo.find_refresh_token("ada-refresh").await.unwrap().revoked_at.is_some());
    let req = test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&ada_token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
    let req = test::TestRequest::post()
        .uri("/api/checkout")
        .insert_header(bearer(&ada_token))
        .set_json(json!({ "shipping_address": address() }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    assert_eq!(test::call_service(&app, update(boss.id, json!({ "active": false }))).await.status(), 409);
    // renaming yourself is fine
    assert_eq!(test::call_service(&app, update(boss.id, json!({ "name": "The Boss" }))).await.status(), 200);

    let delete = |id: Id| {
        test::TestRequest::delete().uri(&format!("/api/admin/customers/{id}")).insert_header(bearer(&admin)).to_request()
    };
    assert_eq!(test::call_service(&app, delete(boss.id)).await.status(), 409);
    assert_eq!(test::call_service(&app, delete(bob.id)).await.status(), 204);
    assert_eq!(test::call_service(&app, delete(bob.id)).await.status(), 404);
}

#[actix_web::test]
async fn custom_roles_grant_exactly_their_permissions() {
    let state = state(&[]);
    let (_, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let (ed, _) = account(&state, "ed@shop.test", ROLE_CUSTOMER).await;
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/roles")
        .insert_header(bearer(&admin))
        .set_json(json!({ "name": "editor", "description": "Writes the blog", "permissions": ["manage_blog"] }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let assign = |role: &str| {
        test::TestRequest::put()
            .uri(&format!("/api/admin/customers/{}/role", ed.id))
            .insert_header(bearer(&admin))
            .set_json(json!({ "role": role }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, assign("ghost")).await.status(), 404);
    let u: Value = test::call_and_read_body_json(&app, assign("editor")).await;
    assert_eq!(u["role"], "editor");

    // a fresh token picks up the new role
    let ed = state.repo.get_user(ed.id).await.unwrap();
    let perms = permissions_for(state.repo.as_ref(), &ed.role).await.unwrap();
    let editor = state.tokens.issue_pair(&ed, &perms).unwrap().access;

    let req = test::TestRequest::post()
        .uri("/api/admin/blogs")
        .insert_header(bearer(&editor))
        .set_json(json!({ "title": "Spring greens", "slug": "spring-greens", "body": "Eat them.", "author": "Ed", "published": true }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post: Value = test::read_body_json(resp).await;
    assert!(post["published_at"].is_string());
    let req = test::TestRequest::get().uri("/api/admin/products").insert_header(bearer(&editor)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::delete().uri("/api/admin/roles/editor").insert_header(bearer(&admin)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);
    let req = test::TestRequest::delete().uri("/api/admin/roles/customer").insert_header(bearer(&admin)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);
    let req = test::TestRequest::put()
        .uri("/api/admin/roles/admin")
        .insert_header(bearer(&admin))
        .set_json(json!({ "permissions": ["view_dashboard"] }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::get().uri("/api/admin/roles").insert_header(bearer(&admin)).to_request();
    let roles: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(roles.as_array().unwrap().len(), 4);
}

#[actix_web::test]
async fn approving_a_supplier_promotes_the_matching_account() {
    let state = state(&[]);
    let (_, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let (sam, _) = account(&state, "sam@farm.test", ROLE_CUSTOMER).await;
    let supplier = state
        .repo
        .create_supplier(NewSupplier {
            business_name: "Green Acres".into(),
            contact_name: "Sam".into(),
            email: "Sam@Farm.test".into(),
            phone: "555-0101".into(),
            address: None,
            product_categories: vec![],
            message: None,
        })
        .await
        .unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let review = |status: &str| {
        test::TestRequest::put()
            .uri(&format!("/api/admin/suppliers/{}/status", supplier.id))
            .insert_header(bearer(&admin))
            .set_json(json!({ "status": status }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, review("pending")).await.status(), 400);
    let s: Value = test::call_and_read_body_json(&app, review("approved")).await;
    assert_eq!(s["status"], "approved");
    assert!(s["reviewed_at"].is_string());
    assert_eq!(state.repo.get_user(sam.id).await.unwrap().role, ROLE_SUPPLIER);

    let req = test::TestRequest::get().uri("/api/admin/suppliers?status=pending").insert_header(bearer(&admin)).to_request();
    let pending: Value = test::call_and_read_body_json(&app, req).await;
    assert!(pending.as_array().unwrap().is_empty());

    // products can now reference the supplier
    let req = test::TestRequest::post()
        .uri("/api/admin/products")
        .insert_header(bearer(&admin))
        .set_json(json!({ "name": "Kale", "slug": "kale", "sku": "KAL", "price_cents": 250, "supplier_id": supplier.id }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_web::test]
async fn dashboard_stats_summarise_the_store() {
    let state = state(&[("LOW_STOCK_THRESHOLD", "5")]);
    let (_, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let fruit = category(&state, "fruit").await;
    let apple = product(&state, "apple", 1000, 20, Some(fruit.id)).await;
    product(&state, "fig", 500, 3, Some(fruit.id)).await;
    let kept = order_for(&state, ada.id, apple.id, 6).await;
    let dropped = order_for(&state, ada.id, apple.id, 1).await;
    freshpick::orders::change_status(state.repo.as_ref(), dropped.id, OrderStatus::Cancelled).await.unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/admin/stats").insert_header(bearer(&admin)).to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["product_count"], 2);
    assert_eq!(stats["active_product_count"], 2);
    assert_eq!(stats["low_stock"].as_array().unwrap().len(), 1);
    assert_eq!(stats["low_stock"][0]["slug"], "fig");
    assert_eq!(stats["order_count"], 2);
    assert_eq!(stats["revenue_cents"], kept.total_cents);
    assert_eq!(stats["customer_count"], 1);
    let by_status = stats["orders_by_status"].as_array().unwrap();
    assert_eq!(by_status.len(), 6);
    let cancelled = by_status.iter().find(|s| s["status"] == "cancelled").unwrap();
    assert_eq!(cancelled["count"], 1);
}

#[actix_web::test]
async fn admins_can_run_due_subscriptions() {
    let state = state(&[]);
    let (_, admin) = account(&state, "boss@shop.test", ROLE_ADMIN).await;
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let milk = product(&state, "milk", 150, 10, None).await;
    state
        .repo
        .create_recurring(NewRecurringOrder {
            user_id: ada.id,
            items: vec![BagItem { product_id: milk.id, quantity: 2 }],
            frequency: Frequency::Weekly,
            shipping_address: address(),
            payment_method: PaymentMethod::CashOnDelivery,
            next_run_at: Utc::now() - Duration::hours(1),
        })
        .await
        .unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let run = || test::TestRequest::post().uri("/api/admin/recurring/run").insert_header(bearer(&admin)).to_request();
    let report: Value = test::call_and_read_body_json(&app, run()).await;
    assert_eq!(report["processed"], 1);
    assert_eq!(report["created"].as_array().unwrap().len(), 1);
    assert!(report["failed"].as_array().unwrap().is_empty());

    // not due again until next week
    let report: Value = test::call_and_read_body_json(&app, run()).await;
    assert_eq!(report["processed"], 0);

    let req = test::TestRequest::get().uri("/api/admin/recurring").insert_header(bearer(&admin)).to_request();
    let all: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all[0]["failure_count"], 0);
    assert!(all[0]["last_order_id"].is_number());
}
