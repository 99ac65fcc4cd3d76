// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for the signed-in user: session, profile and vehicles.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::onboarding::{clean, validate_phone, validate_zip_code};
use crate::models::{GenderPreference, NewVehicle, User, UserRole, Vehicle};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/vehicles", get(list_vehicles).post(add_vehicle))
}

/// Load the signed-in user's record.
pub(crate) async fn current_user(state: &AppState, auth: &AuthUser) -> Result<User> {
    state
        .db
        .get_user(&auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", auth.user_id)))
}

// ─── Session ─────────────────────────────────────────────────

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<User>> {
    Ok(Json(current_user(&state, &auth).await?))
}

// ─── Profile ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub vehicles: Vec<Vehicle>,
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>> {
    let user = current_user(&state, &auth).await?;
    let vehicles = state.db.vehicles_for_owner(&user.id).await?;
    Ok(Json(ProfileResponse { user, vehicles }))
}

/// Partial profile edit. Absent fields are kept; blank strings clear.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub gender: Option<String>,
    #[validate(length(max = 30))]
    pub pronouns: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(custom(function = "validate_optional_zip"))]
    pub zip_code: Option<String>,
    #[validate(length(max = 100))]
    pub major: Option<String>,
    #[validate(length(max = 30))]
    pub year: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[validate(length(max = 50))]
    pub instagram: Option<String>,
    #[validate(length(max = 50))]
    pub discord: Option<String>,
    #[validate(length(max = 200))]
    pub linkedin: Option<String>,
    #[validate(custom(function = "validate_optional_phone"))]
    pub phone: Option<String>,
    pub role: Option<UserRole>,
    pub gender_preference: Option<GenderPreference>,
}

fn validate_optional_zip(zip: &str) -> std::result::Result<(), validator::ValidationError> {
    if zip.trim().is_empty() {
        return Ok(());
    }
    validate_zip_code(zip.trim())
}

fn validate_optional_phone(phone: &str) -> std::result::Result<(), validator::ValidationError> {
    if phone.trim().is_empty() {
        return Ok(());
    }
    validate_phone(phone.trim())
}

impl ProfileUpdate {
    fn apply_to(self, user: &mut User) -> Result<()> {
        if let Some(name) = self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("name: is required".to_string()));
            }
            user.name = name.to_string();
        }

        let fields = [
            (self.gender, &mut user.gender),
            (self.pronouns, &mut user.pronouns),
            (self.city, &mut user.city),
            (self.zip_code, &mut user.zip_code),
            (self.major, &mut user.major),
            (self.year, &mut user.year),
            (self.bio, &mut user.bio),
            (self.instagram, &mut user.instagram),
            (self.discord, &mut user.discord),
            (self.linkedin, &mut user.linkedin),
            (self.phone, &mut user.phone),
        ];
        for (update, field) in fields {
            if update.is_some() {
                *field = clean(&update);
            }
        }

        if let Some(role) = self.role {
            user.role = Some(role);
        }
        if let Some(preference) = self.gender_preference {
            user.gender_preference = preference;
        }
        Ok(())
    }
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>> {
    update.validate()?;

    let mut user = current_user(&state, &auth).await?;
    update.apply_to(&mut user)?;
    user.updated_at = Utc::now();
    state.db.save_user(&user).await?;

    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(Json(user))
}

// ─── Vehicles ────────────────────────────────────────────────

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Vehicle>>> {
    Ok(Json(state.db.vehicles_for_owner(&auth.user_id).await?))
}

async fn add_vehicle(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<NewVehicle>,
) -> Result<(StatusCode, Json<Vehicle>)> {
    request.validate()?;
    let user = current_user(&state, &auth).await?;

    let vehicle = request.into_vehicle(&user.id, Utc::now());
    state.db.add_vehicle(&vehicle).await?;

    tracing::info!(user_id = %user.id, vehicle_id = %vehicle.id, "Vehicle registered");
    Ok((StatusCode::CREATED, Json(vehicle)))
}
