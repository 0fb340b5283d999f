//! API integration tests
//!
//! The router runs in-process on the memory backend; requests go through
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use bibliotheca_server::{
    api,
    config::AppConfig,
    models::member::{CreateMember, Role},
    repository::Repository,
    services::{
        clock::SystemClock,
        payments::{PaymentConfirmation, PaymentGateway},
    },
    AppError, AppResult, AppState,
};

const ADMIN_EMAIL: &str = "admin@example.org";
const ADMIN_PASSWORD: &str = "admin-password";

/// Provider double: `pay_ok*` is captured in INR, `pay_pending*` is not captured
struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn fetch_payment(&self, payment_id: &str) -> AppResult<PaymentConfirmation> {
        if payment_id.starts_with("pay_ok") {
            Ok(PaymentConfirmation {
                id: payment_id.to_string(),
                amount: Decimal::new(15000, 2),
                currency: "INR".into(),
                captured: true,
                email: None,
            })
        } else if payment_id.starts_with("pay_pending") {
            Ok(PaymentConfirmation {
                id: payment_id.to_string(),
                amount: Decimal::new(15000, 2),
                currency: "INR".into(),
                captured: false,
                email: None,
            })
        } else {
            Err(AppError::ExternalService("provider down".into()))
        }
    }
}

async fn app() -> Router {
    let state = AppState::new(
        AppConfig::default(),
        Repository::in_memory(),
        Arc::new(SystemClock),
        Arc::new(StubGateway),
    );

    state
        .services
        .members
        .create_member(CreateMember {
            username: "admin".into(),
            email: ADMIN_EMAIL.into(),
            password: Some(ADMIN_PASSWORD.into()),
            role: Some(Role::Admin),
            image_url: None,
        })
        .await
        .expect("seed admin");

    api::router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("build request");

    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().expect("No token in response").to_string()
}

/// Register a member and return (id, token)
async fn register(app: &Router, name: &str) -> (i64, String) {
    let email = format!("{}@example.org", name);
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "username": name, "email": email, "password": "long-enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    let id = body["id"].as_i64().expect("member id");
    (id, login(app, &email, "long-enough").await)
}

async fn create_book(app: &Router, admin: &str, title: &str, copies: i32) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/books",
        Some(admin),
        Some(json!({ "title": title, "author": "Someone", "total_copies": copies })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create book failed: {}", body);
    body["id"].as_i64().expect("book id")
}

#[tokio::test]
async fn test_health_check() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = app().await;
    let (id, token) = register(&app, "ada").await;

    let (status, body) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_i64(), Some(id));
    assert_eq!(body["role"], "user");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let app = app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = app().await;
    register(&app, "twice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "username": "twice", "email": "TWICE@example.org", "password": "long-enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_catalog_is_public_but_writes_need_admin() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, user) = register(&app, "reader").await;

    create_book(&app, &admin, "Middlemarch", 2).await;
    create_book(&app, &admin, "Persuasion", 1).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/books?search=MARCH&sort=title&order=asc",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["title"], "Middlemarch");
    assert_eq!(body["items"][0]["available_copies"], 2);

    let new_book = json!({ "title": "Emma", "author": "Austen", "total_copies": 1 });
    let (status, _) = send(&app, Method::POST, "/api/v1/books", None, Some(new_book.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, Method::POST, "/api/v1/books", Some(&user), Some(new_book)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/api/v1/books?sort=colour", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_loan_flow() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (first_id, first) = register(&app, "first").await;
    let (_, second) = register(&app, "second").await;
    let book = create_book(&app, &admin, "Only One", 1).await;

    let (status, loan) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&first),
        Some(json!({ "book_id": book })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "pending");
    assert_eq!(loan["member_id"].as_i64(), Some(first_id));
    let loan_id = loan["id"].as_i64().unwrap();

    // members cannot decide on loans
    let approve = format!("/api/v1/loans/{}/approve", loan_id);
    let (status, _) = send(&app, Method::POST, &approve, Some(&first), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, pending) = send(&app, Method::GET, "/api/v1/loans/pending", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["total"], 1);
    assert_eq!(pending["items"][0]["book_title"], "Only One");

    let (status, approved) = send(&app, Method::POST, &approve, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (_, shelf) = send(&app, Method::GET, &format!("/api/v1/books/{}", book), None, None).await;
    assert_eq!(shelf["available_copies"], 0);

    let (_, other) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&second),
        Some(json!({ "book_id": book })),
    )
    .await;
    let other_approve = format!("/api/v1/loans/{}/approve", other["id"].as_i64().unwrap());
    let (status, body) = send(&app, Method::POST, &other_approve, Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "BookNotAvailable");

    let ret = format!("/api/v1/loans/{}/return", loan_id);
    let (status, returned) = send(&app, Method::POST, &ret, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "returned");

    let (_, shelf) = send(&app, Method::GET, &format!("/api/v1/books/{}", book), None, None).await;
    assert_eq!(shelf["available_copies"], 1);

    let history = format!("/api/v1/members/{}/loans", first_id);
    let (status, loans) = send(&app, Method::GET, &history, Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loans.as_array().map(Vec::len), Some(1));

    let (status, _) = send(&app, Method::GET, &history, Some(&second), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_loan_status_patch_follows_the_lifecycle() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, user) = register(&app, "patched").await;
    let book = create_book(&app, &admin, "Patched", 1).await;

    let (_, loan) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&user),
        Some(json!({ "book_id": book })),
    )
    .await;
    let uri = format!("/api/v1/loans/{}", loan["id"].as_i64().unwrap());

    let (status, _) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&user),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&admin),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&admin),
        Some(json!({ "status": "pending" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, shelf) = send(&app, Method::GET, &format!("/api/v1/books/{}", book), None, None).await;
    assert_eq!(shelf["available_copies"], 0);
}

#[tokio::test]
async fn test_book_with_open_loans_cannot_be_deleted() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, user) = register(&app, "holder").await;
    let book = create_book(&app, &admin, "Kept", 1).await;

    send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&user),
        Some(json!({ "book_id": book })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/books/{}", book),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "HasOpenLoans");
}

#[tokio::test]
async fn test_wallet_top_up() {
    let app = app().await;
    let (_, token) = register(&app, "payer").await;

    let (status, body) = send(&app, Method::GET, "/api/v1/wallet", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "0");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/wallet/top-up",
        Some(&token),
        Some(json!({ "payment_id": "pay_ok_1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "150.00");

    // the same payment is credited only once
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/wallet/top-up",
        Some(&token),
        Some(json!({ "payment_id": "pay_ok_1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (_, body) = send(&app, Method::GET, "/api/v1/wallet", Some(&token), None).await;
    assert_eq!(body["balance"], "150.00");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/wallet/top-up",
        Some(&token),
        Some(json!({ "payment_id": "pay_pending_1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/wallet/top-up",
        Some(&token),
        Some(json!({ "payment_id": "pay_unknown" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "UpstreamFailure");
}

#[tokio::test]
async fn test_wallet_follows_the_member_not_the_email() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (first_id, first) = register(&app, "renamed").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/wallet/top-up",
        Some(&first),
        Some(json!({ "payment_id": "pay_ok_rename" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/members/{}", first_id),
        Some(&admin),
        Some(json!({ "email": "moved@example.org" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // someone else takes over the old address
    let (second_id, second) = register(&app, "renamed").await;
    assert_ne!(second_id, first_id);

    let (status, body) = send(&app, Method::GET, "/api/v1/wallet", Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member_id"], first_id);
    assert_eq!(body["email"], "moved@example.org");
    assert_eq!(body["balance"], "150.00");

    let (_, body) = send(&app, Method::GET, "/api/v1/wallet", Some(&second), None).await;
    assert_eq!(body["member_id"], second_id);
    assert_eq!(body["balance"], "0");
}

#[tokio::test]
async fn test_stats_dashboard() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, user) = register(&app, "counter").await;
    let book = create_book(&app, &admin, "Counted", 2).await;
    send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&user),
        Some(json!({ "book_id": book })),
    )
    .await;

    let (status, _) = send(&app, Method::GET, "/api/v1/stats", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, "/api/v1/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "books": 1, "members": 2, "loans": 1, "pending": 1 })
    );
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/loans/{id}/approve"].is_object());
    assert!(body["components"]["securitySchemes"]["bearer_auth"].is_object());
}
