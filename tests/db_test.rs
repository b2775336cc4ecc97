use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use bookinghse::{
    auth::{AuthIdentity, TokenVerifier},
    build_router,
    config::AppConfig,
    error::{AppError, Result},
    state::AppState,
};

/// Accepts any token that is a user id.
struct TokenIsUserId;

#[async_trait]
impl TokenVerifier for TokenIsUserId {
    async fn verify(&self, token: &str) -> Result<AuthIdentity> {
        let id = token
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthorized("unknown token".into()))?;
        Ok(AuthIdentity {
            id,
            email: Some(format!("{id}@example.it")),
        })
    }
}

fn app(pool: PgPool) -> Router {
    let mut config = AppConfig::default();
    config.supabase.url = "http://127.0.0.1:9".to_string();
    config.supabase.anon_key = "anon".to_string();

    let state = AppState::from_config(config, pool)
        .unwrap()
        .with_auth(Arc::new(TokenIsUserId));
    build_router(state)
}

async fn call(pool: &PgPool, method: Method, uri: &str, user: Uuid, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {user}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = app(pool.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn insert_user(pool: &PgPool, user_type: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, user_type, full_name) VALUES ($1, $2, $3, 'Test')")
        .bind(id)
        .bind(format!("{id}@example.it"))
        .bind(user_type)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn insert_provider(pool: &PgPool) -> Uuid {
    let id = insert_user(pool, "provider").await;
    sqlx::query("INSERT INTO provider_profiles (user_id, business_name) VALUES ($1, 'Sicurezza Srl')")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn insert_service(pool: &PgPool, provider: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO services (id, provider_id, title, category, pricing_unit, base_price, location_type)
         VALUES ($1, $2, 'Corso antincendio', 'antincendio', 'fixed', 350, 'on_site')",
    )
    .bind(id)
    .bind(provider)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn insert_booking(pool: &PgPool, client: Uuid, provider: Uuid, service: Uuid, status: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO bookings (id, client_id, provider_id, service_id, status, scheduled_date, total_amount)
         VALUES ($1, $2, $3, $4, $5, CURRENT_DATE + 7, 350)",
    )
    .bind(id)
    .bind(client)
    .bind(provider)
    .bind(service)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn count(pool: &PgPool, query: &str, id: Uuid) -> i64 {
    sqlx::query_scalar(query).bind(id).fetch_one(pool).await.unwrap()
}

#[sqlx::test]
async fn sync_creates_user_and_profile_once(pool: PgPool) {
    let id = Uuid::new_v4();
    let body = json!({ "user_type": "provider", "full_name": "Anna Bianchi" });

    let (status, user) = call(&pool, Method::POST, "/api/users/sync", id, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["user_type"], "provider");
    assert_eq!(user["email"], format!("{id}@example.it"));

    // Repeating the sync is harmless.
    let (status, _) = call(&pool, Method::POST, "/api/users/sync", id, Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let profiles = count(&pool, "SELECT COUNT(*) FROM provider_profiles WHERE user_id = $1", id).await;
    assert_eq!(profiles, 1);
}

#[sqlx::test]
async fn sync_refuses_self_assigned_admin(pool: PgPool) {
    let id = Uuid::new_v4();
    let (status, _) = call(&pool, Method::POST, "/api/users/sync", id, Some(json!({ "user_type": "admin" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM users WHERE id = $1", id).await, 0);
}

#[sqlx::test]
async fn missing_profile_is_created_on_first_read(pool: PgPool) {
    let client = insert_user(&pool, "client").await;
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM client_profiles WHERE user_id = $1", client).await, 0);

    let (status, body) = call(&pool, Method::GET, "/api/profiles/me", client, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile_type"], "client");
    assert_eq!(body["profile"]["user_id"], client.to_string());

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM client_profiles WHERE user_id = $1", client).await, 1);
}

#[sqlx::test]
async fn booked_services_are_deactivated_instead_of_deleted(pool: PgPool) {
    let provider = insert_provider(&pool).await;
    let client = insert_user(&pool, "client").await;
    let booked = insert_service(&pool, provider).await;
    let unused = insert_service(&pool, provider).await;
    insert_booking(&pool, client, provider, booked, "pending").await;

    let (status, body) = call(&pool, Method::DELETE, &format!("/api/services/{booked}"), provider, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], false);
    assert_eq!(body["deactivated"], true);

    let active: bool = sqlx::query_scalar("SELECT is_active FROM services WHERE id = $1")
        .bind(booked)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(!active);

    let (status, body) = call(&pool, Method::DELETE, &format!("/api/services/{unused}"), provider, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM services WHERE id = $1", unused).await, 0);
}

#[sqlx::test]
async fn only_the_owner_deletes_a_service(pool: PgPool) {
    let owner = insert_provider(&pool).await;
    let other = insert_provider(&pool).await;
    let service = insert_service(&pool, owner).await;

    let (status, _) = call(&pool, Method::DELETE, &format!("/api/services/{service}"), other, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM services WHERE id = $1", service).await, 1);
}

#[sqlx::test]
async fn second_review_of_a_booking_conflicts(pool: PgPool) {
    let provider = insert_provider(&pool).await;
    let client = insert_user(&pool, "client").await;
    let service = insert_service(&pool, provider).await;
    let booking = insert_booking(&pool, client, provider, service, "completed").await;
    let review = json!({ "booking_id": booking, "rating": 5, "comment": "Docente molto preparato" });

    let (status, body) = call(&pool, Method::POST, "/api/reviews", client, Some(review.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], 5);

    let (status, body) = call(&pool, Method::POST, "/api/reviews", client, Some(review)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM reviews WHERE booking_id = $1", booking).await, 1);
    // The provider hears about the first review only.
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM notifications WHERE user_id = $1", provider).await, 1);
}

#[sqlx::test]
async fn unfinished_bookings_cannot_be_reviewed(pool: PgPool) {
    let provider = insert_provider(&pool).await;
    let client = insert_user(&pool, "client").await;
    let service = insert_service(&pool, provider).await;
    let booking = insert_booking(&pool, client, provider, service, "confirmed").await;

    let (status, _) = call(
        &pool,
        Method::POST,
        "/api/reviews",
        client,
        Some(json!({ "booking_id": booking, "rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test]
async fn status_changes_notify_the_counterpart(pool: PgPool) {
    let provider = insert_provider(&pool).await;
    let client = insert_user(&pool, "client").await;
    let service = insert_service(&pool, provider).await;
    let booking = insert_booking(&pool, client, provider, service, "pending").await;

    let uri = format!("/api/bookings/{booking}/status");
    let (status, body) = call(&pool, Method::PATCH, &uri, provider, Some(json!({ "status": "confirmed" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let notified = "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND booking_id IS NOT NULL";
    assert_eq!(count(&pool, notified, client).await, 1);
    assert_eq!(count(&pool, notified, provider).await, 0);

    let (status, body) = call(&pool, Method::GET, "/api/notifications/unread-count", client, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unread"], 1);
}

#[sqlx::test]
async fn clients_cannot_confirm_their_own_bookings(pool: PgPool) {
    let provider = insert_provider(&pool).await;
    let client = insert_user(&pool, "client").await;
    let service = insert_service(&pool, provider).await;
    let booking = insert_booking(&pool, client, provider, service, "pending").await;

    let uri = format!("/api/bookings/{booking}/status");
    let (status, _) = call(&pool, Method::PATCH, &uri, client, Some(json!({ "status": "confirmed" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let current: String = sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
        .bind(booking)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(current, "pending");
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM notifications WHERE user_id = $1", provider).await, 0);
}
