#![cfg(feature = "inmem-store")]

mod common;

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::{test, web, App};
use freshpick::auth::{ACCESS_COOKIE, REFRESH_COOKIE};
use freshpick::config;
use freshpick::models::UpdateUser;
use freshpick::repo::UserRepo;
use serde_json::{json, Value};

use common::{bearer, state};

fn cookie_value<B>(resp: &ServiceResponse<B>, name: &str) -> Option<String> {
    resp.response().cookies().find(|c| c.name() == name).map(|c| c.value().to_string())
}

fn register_req(email: &str) -> actix_web::test::TestRequest {
    test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "name": "Ada", "email": email, "password": "password123" }))
}

fn refresh_req(token: &str) -> actix_web::test::TestRequest {
    test::TestRequest::post().uri("/api/auth/refresh").cookie(Cookie::new(REFRESH_COOKIE, token.to_string()))
}

#[actix_web::test]
async fn register_signs_in_with_cookies_and_bearer() {
    let state = state(&[]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let resp = test::call_service(&app, register_req("Ada@Shop.test").to_request()).await;
    assert_eq!(resp.status(), 201);
    let access = cookie_value(&resp, ACCESS_COOKIE).expect("access cookie");
    assert!(cookie_value(&resp, REFRESH_COOKIE).is_some());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["email"], "ada@shop.test");
    assert_eq!(body["user"]["role"], "customer");
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["expires_in"], 900);

    let req = test::TestRequest::get().uri("/api/auth/me").cookie(Cookie::new(ACCESS_COOKIE, access)).to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["name"], "Ada");

    let token = body["access_token"].as_str().unwrap();
    let req = test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get().uri("/api/auth/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn registration_is_validated() {
    let state = state(&[]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    assert_eq!(test::call_service(&app, register_req("ada@shop.test").to_request()).await.status(), 201);
    // same address in another case
    assert_eq!(test::call_service(&app, register_req("ADA@shop.test").to_request()).await.status(), 409);

    let bad = [
        json!({ "name": "Ada", "email": "not-an-email", "password": "password123" }),
        json!({ "name": "Ada", "email": "b@shop.test", "password": "short" }),
        json!({ "name": "  ", "email": "c@shop.test", "password": "password123" }),
    ];
    for payload in bad {
        let req = test::TestRequest::post().uri("/api/auth/register").set_json(payload).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    // malformed JSON gets the same error envelope
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn login_rejects_bad_credentials_and_inactive_accounts() {
    let state = state(&[]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;
    let resp = test::call_service(&app, register_req("ada@shop.test").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let id = body["user"]["id"].as_i64().unwrap();

    let login = |email: &str, password: &str| {
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": email, "password": password }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, login("ada@shop.test", "wrong-password")).await.status(), 401);
    assert_eq!(test::call_service(&app, login("nobody@shop.test", "password123")).await.status(), 401);
    assert_eq!(test::call_service(&app, login("ada@shop.test", "password123")).await.status(), 200);

    state.repo.update_user(id, UpdateUser { active: Some(false), ..Default::default() }).await.unwrap();
    assert_eq!(test::call_service(&app, login("ada@shop.test", "password123")).await.status(), 401);
}

#[actix_web::test]
async fn refresh_rotates_and_reuse_revokes_the_family() {
    let state = state(&[]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let resp = test::call_service(&app, register_req("ada@shop.test").to_request()).await;
    let first = cookie_value(&resp, REFRESH_COOKIE).unwrap();

    let resp = test::call_service(&app, refresh_req(&first).to_request()).await;
    assert_eq!(resp.status(), 200);
    let second = cookie_value(&resp, REFRESH_COOKIE).unwrap();
    assert_ne!(first, second);
    assert!(cookie_value(&resp, ACCESS_COOKIE).is_some());

    // replaying the rotated token is treated as theft
    assert_eq!(test::call_service(&app, refresh_req(&first).to_request()).await.status(), 401);
    // and takes the current token down with it
    assert_eq!(test::call_service(&app, refresh_req(&second).to_request()).await.status(), 401);

    let req = test::TestRequest::post().uri("/api/auth/refresh").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
    assert_eq!(test::call_service(&app, refresh_req("garbage").to_request()).await.status(), 401);
}

#[actix_web::test]
async fn access_token_cannot_be_used_to_refresh_and_vice_versa() {
    let state = state(&[]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;
    let resp = test::call_service(&app, register_req("ada@shop.test").to_request()).await;
    let access = cookie_value(&resp, ACCESS_COOKIE).unwrap();
    let refresh = cookie_value(&resp, REFRESH_COOKIE).unwrap();

    assert_eq!(test::call_service(&app, refresh_req(&access).to_request()).await.status(), 401);
    let req = test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&refresh)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn logout_clears_cookies_and_revokes_the_refresh_token() {
    let state = state(&[]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;
    let resp = test::call_service(&app, register_req("ada@shop.test").to_request()).await;
    let refresh = cookie_value(&resp, REFRESH_COOKIE).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/auth/logout")
        .cookie(Cookie::new(REFRESH_COOKIE, refresh.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(cookie_value(&resp, ACCESS_COOKIE).as_deref(), Some(""));
    assert_eq!(cookie_value(&resp, REFRESH_COOKIE).as_deref(), Some(""));

    assert_eq!(test::call_service(&app, refresh_req(&refresh).to_request()).await.status(), 401);

    // logging out without a session is harmless
    let req = test::TestRequest::post().uri("/api/auth/logout").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn bootstrap_admin_gets_dashboard_access() {
    let state = state(&[("BOOTSTRAP_ADMIN_EMAILS", "boss@shop.test")]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let body: Value = test::call_and_read_body_json(&app, register_req("Boss@shop.test").to_request()).await;
    assert_eq!(body["user"]["role"], "admin");
    let token = body["access_token"].as_str().unwrap();
    let req = test::TestRequest::get().uri("/api/admin/stats").insert_header(bearer(token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let body: Value = test::call_and_read_body_json(&app, register_req("shopper@shop.test").to_request()).await;
    let token = body["access_token"].as_str().unwrap();
    let req = test::TestRequest::get().uri("/api/admin/stats").insert_header(bearer(token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
async fn demoted_bootstrap_admin_stays_demoted_after_login() {
    let state = state(&[("BOOTSTRAP_ADMIN_EMAILS", "boss@shop.test,ops@shop.test")]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let boss: Value = test::call_and_read_body_json(&app, register_req("boss@shop.test").to_request()).await;
    let ops: Value = test::call_and_read_body_json(&app, register_req("ops@shop.test").to_request()).await;
    assert_eq!(boss["user"]["role"], "admin");

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/customers/{}/role", boss["user"]["id"]))
        .insert_header(bearer(ops["access_token"].as_str().unwrap()))
        .set_json(json!({ "role": "customer" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "boss@shop.test", "password": "password123" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["role"], "customer");
    let req = test::TestRequest::get()
        .uri("/api/admin/stats")
        .insert_header(bearer(body["access_token"].as_str().unwrap()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
async fn profile_update_saves_address() {
    let state = state(&[]);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;
    let body: Value = test::call_and_read_body_json(&app, register_req("ada@shop.test").to_request()).await;
    let token = body["access_token"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri("/api/auth/me")
        .insert_header(bearer(&token))
        .set_json(json!({ "phone": "555-0100", "address": common::address() }))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["phone"], "555-0100");
    assert_eq!(me["address"]["city"], "Springfield");
    assert_eq!(me["name"], "Ada");

    let req = test::TestRequest::put()
        .uri("/api/auth/me")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": " " }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let mut incomplete = json!(common::address());
    incomplete["city"] = json!("  ");
    let req = test::TestRequest::put()
        .uri("/api/auth/me")
        .insert_header(bearer(&token))
        .set_json(json!({ "address": incomplete }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
    let req = test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&token)).to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["address"]["city"], "Springfield");
}
