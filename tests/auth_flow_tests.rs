// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Magic-link sign-in flow tests.
//!
//! These tests verify that:
//! 1. Only institution addresses can request a link
//! 2. Redeeming a link sets the session cookie and redirects by onboarding state
//! 3. Links are single-use, and tampered links are rejected
//! 4. Logout clears the session cookie

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use chrono::Utc;
use tower::ServiceExt;

mod common;

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect location")
        .to_str()
        .unwrap()
        .to_string()
}

fn session_from(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("zotpool_session="))
        .map(|v| v.to_string())
}

fn verify_request(token: &str) -> Request<Body> {
    Request::builder()
        .uri(format!(
            "/auth/verify?token={}",
            urlencoding::encode(token)
        ))
        .body(Body::empty())
        .unwrap()
}

fn email_request(email: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "email": email }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_request_link_rejects_other_domains() {
    let (app, _) = common::create_test_app();

    let response = app.oneshot(email_request("b@gmail.com")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_domain");
}

#[tokio::test]
async fn test_request_link_rejects_lookalike_domains() {
    let (app, _) = common::create_test_app();

    for email in ["a@uci.edu.evil.com", "a@notuci.edu", "not-an-email"] {
        let response = app.clone().oneshot(email_request(email)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", email);
    }
}

#[tokio::test]
async fn test_request_link_accepts_institution_email() {
    let (app, _) = common::create_test_app();

    let response = app.oneshot(email_request("  A@UCI.edu ")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["status"], "link_sent");
    assert_eq!(body["email"], "a@uci.edu");
    assert!(body["expires_at"].is_string());
}

#[tokio::test]
async fn test_verify_sets_cookie_and_redirects_to_onboarding() {
    let (app, state) = common::create_test_app();
    let link = state.sign_in.issue_link("a@uci.edu", Utc::now()).unwrap();

    let response = app.clone().oneshot(verify_request(&link.token)).await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "http://localhost:5173/onboarding");

    let cookie = session_from(&response).expect("session cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(!cookie.contains("Secure"));

    // The cookie alone authenticates API calls
    let pair = cookie.split(';').next().unwrap().to_string();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, pair)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = common::body_json(response).await;
    assert_eq!(me["email"], "a@uci.edu");
    assert_eq!(me["email_verified"], true);
    assert_eq!(me["onboarded"], false);
}

#[tokio::test]
async fn test_onboarded_user_redirects_to_dashboard() {
    let (app, state) = common::create_test_app();
    common::sign_in(&state, "a@uci.edu").await;
    common::onboard(&state, "a@uci.edu", zotpool::models::UserRole::Driver).await;

    let link = state.sign_in.issue_link("a@uci.edu", Utc::now()).unwrap();
    let response = app.oneshot(verify_request(&link.token)).await.unwrap();
    assert_eq!(location(&response), "http://localhost:5173/dashboard");
}

#[tokio::test]
async fn test_link_is_single_use() {
    let (app, state) = common::create_test_app();
    let link = state.sign_in.issue_link("a@uci.edu", Utc::now()).unwrap();

    let first = app.clone().oneshot(verify_request(&link.token)).await.unwrap();
    assert!(session_from(&first).is_some());

    let second = app.oneshot(verify_request(&link.token)).await.unwrap();
    assert_eq!(
        location(&second),
        "http://localhost:5173/auth/error?error=link_expired"
    );
    assert!(session_from(&second).is_none());
}

#[tokio::test]
async fn test_expired_link_is_rejected() {
    let (app, state) = common::create_test_app();
    let issued = Utc::now() - chrono::Duration::hours(25);
    let link = state.sign_in.issue_link("a@uci.edu", issued).unwrap();

    let response = app.oneshot(verify_request(&link.token)).await.unwrap();
    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/error?error=link_expired"
    );
}

#[tokio::test]
async fn test_tampered_link_is_rejected() {
    let (app, _) = common::create_test_app();

    for token in ["", "garbage", "YUB1Y2kuZWR1fDB8MDB8MDA"] {
        let response = app.clone().oneshot(verify_request(token)).await.unwrap();
        assert_eq!(
            location(&response),
            "http://localhost:5173/auth/error?error=invalid_token",
            "token {:?}",
            token
        );
    }
}

#[tokio::test]
async fn test_same_email_maps_to_same_user() {
    let (_, state) = common::create_test_app();

    let first = state.sign_in.issue_link("a@uci.edu", Utc::now()).unwrap();
    let second = state.sign_in.issue_link("A@uci.edu", Utc::now()).unwrap();
    let a = state
        .sign_in
        .complete_sign_in(&first.token, Utc::now())
        .await
        .unwrap();
    let b = state
        .sign_in
        .complete_sign_in(&second.token, Utc::now())
        .await
        .unwrap();

    assert!(a.created);
    assert!(!b.created);
    assert_eq!(a.user.id, b.user.id);
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(header::COOKIE, "zotpool_session=whatever")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_from(&response).expect("removal cookie");
    assert!(cookie.contains("Max-Age=0"));
    assert!(cookie.contains("Path=/"));
}
