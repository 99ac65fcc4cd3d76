// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, Response};
use chrono::Utc;
use std::sync::Arc;
use zotpool::config::Config;
use zotpool::db::{Database, FirestoreDb};
use zotpool::routes::create_router;
use zotpool::services::Mailer;
use zotpool::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Shared state over the in-memory store.
#[allow(dead_code)]
pub fn test_state(config: Config) -> Arc<AppState> {
    Arc::new(
        AppState::new(config, Database::memory(), Mailer::log_only())
            .expect("Failed to build test state"),
    )
}

/// Create a test app over the in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = test_state(config);
    (create_router(state.clone()), state)
}

/// Sign `email` in through a fresh link and return the session token.
#[allow(dead_code)]
pub async fn sign_in(state: &AppState, email: &str) -> String {
    let link = state
        .sign_in
        .issue_link(email, Utc::now())
        .expect("issue link");
    state
        .sign_in
        .complete_sign_in(&link.token, Utc::now())
        .await
        .expect("complete sign-in")
        .session_token
}

/// Mark a signed-in user as onboarded with `role`.
#[allow(dead_code)]
pub async fn onboard(state: &AppState, email: &str, role: zotpool::models::UserRole) {
    let mut user = state
        .db
        .get_user_by_email(email)
        .await
        .unwrap()
        .expect("user exists");
    user.onboarded = true;
    user.role = Some(role);
    state.db.save_user(&user).await.unwrap();
}

/// Build a JSON request carrying a Bearer session.
#[allow(dead_code)]
pub fn json_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Collect a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}
