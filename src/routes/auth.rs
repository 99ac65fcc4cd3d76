// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Magic-link sign-in routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::middleware::auth::{clear_session_cookie, session_cookie};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/email", post(request_link))
        .route("/auth/verify", get(verify_link))
        .route("/auth/logout", post(logout))
}

#[derive(Deserialize)]
pub struct SignInRequest {
    email: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub status: String,
    pub email: String,
    pub expires_at: String,
}

/// Email a sign-in link to an institution address.
async fn request_link(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignInRequest>,
) -> Result<Json<SignInResponse>> {
    let link = state.sign_in.request_link(&body.email).await?;

    Ok(Json(SignInResponse {
        status: "link_sent".to_string(),
        email: link.email,
        expires_at: format_utc_rfc3339(link.expires_at),
    }))
}

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(default)]
    token: String,
}

/// Redeem a sign-in link, set the session cookie and send the browser on.
async fn verify_link(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<VerifyParams>,
) -> (CookieJar, Redirect) {
    let frontend_url = state.config.frontend_url.trim_end_matches('/');

    match state.sign_in.complete_sign_in(&params.token, Utc::now()).await {
        Ok(signed_in) => {
            let next = if signed_in.user.onboarded {
                "dashboard"
            } else {
                "onboarding"
            };
            let jar = jar.add(session_cookie(
                signed_in.session_token,
                &state.config.frontend_url,
            ));
            (jar, Redirect::to(&format!("{}/{}", frontend_url, next)))
        }
        Err(e) => {
            tracing::info!(error = %e, "Sign-in link rejected");
            let redirect = format!("{}/auth/error?error={}", frontend_url, e.code());
            (jar, Redirect::to(&redirect))
        }
    }
}

/// Clear the session cookie.
async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    (
        jar.add(clear_session_cookie()),
        Json(serde_json::json!({ "status": "signed_out" })),
    )
}
