// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride routes: posting, search, seat requests and route previews.

use crate::db::SeatOp;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::ride::DefaultDestination;
use crate::models::{Coordinates, NewRide, Ride, RideType, User, Vehicle};
use crate::routes::api::current_user;
use crate::services::search::{self, SearchParams};
use crate::services::{PreviewRequest, RideMatch, RoutePreview, SearchCriteria};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rides", get(search_rides).post(create_ride))
        .route("/api/rides/mine", get(my_rides))
        .route("/api/rides/{id}", get(get_ride))
        .route("/api/rides/{id}/route", get(ride_route))
        .route("/api/rides/{id}/passengers", post(request_seat))
        .route(
            "/api/rides/{id}/passengers/{user_id}/confirm",
            post(confirm_passenger),
        )
        .route("/api/route-preview", get(route_preview))
}

async fn load_ride(state: &AppState, ride_id: &str) -> Result<Ride> {
    state
        .db
        .get_ride(ride_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ride {} not found", ride_id)))
}

async fn describe(state: &AppState, ride: Ride) -> Result<RideMatch> {
    let owner = state.db.get_user(&ride.owner_id).await?;
    Ok(RideMatch::describe(
        ride,
        owner.as_ref(),
        Utc::now(),
        state.config.campus.timezone,
    ))
}

// ─── Search ──────────────────────────────────────────────────

async fn search_rides(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<RideMatch>>> {
    let criteria = SearchCriteria::try_from(params)?;
    let viewer = state.db.get_user(&auth.user_id).await?;

    let rides = state.db.open_rides().await?;
    let mut owner_ids: Vec<String> = rides.iter().map(|r| r.owner_id.clone()).collect();
    owner_ids.sort();
    owner_ids.dedup();
    let owners: HashMap<String, User> = state
        .db
        .users_by_ids(&owner_ids)
        .await?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    let matches = search::search(
        &criteria,
        &rides,
        &owners,
        viewer.as_ref(),
        Utc::now(),
        state.config.campus.timezone,
    );

    tracing::debug!(
        user_id = %auth.user_id,
        open = rides.len(),
        returned = matches.len(),
        "Ride search"
    );
    Ok(Json(matches))
}

// ─── Posting ─────────────────────────────────────────────────

async fn create_ride(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<NewRide>,
) -> Result<(StatusCode, Json<RideMatch>)> {
    let user = current_user(&state, &auth).await?;
    if !user.onboarded {
        return Err(AppError::OnboardingRequired);
    }

    let vehicle = match request.ride_type {
        RideType::Driver => choose_vehicle(&state, &user, request.vehicle_id.as_deref()).await?,
        RideType::Passenger => None,
    };

    let campus = DefaultDestination {
        name: &state.config.campus.name,
        coordinates: state.config.campus.coordinates,
    };
    let now = Utc::now();
    let ride = request.into_ride(
        &user.id,
        vehicle.as_ref(),
        campus,
        state.config.campus.timezone,
        now,
    )?;
    state.db.create_ride(&ride).await?;

    tracing::info!(
        user_id = %user.id,
        ride_id = %ride.id,
        ride_type = ?ride.ride_type,
        "Ride posted"
    );

    let view = RideMatch::describe(ride, Some(&user), now, state.config.campus.timezone);
    Ok((StatusCode::CREATED, Json(view)))
}

/// The requested vehicle (must be owned) or the user's first one.
async fn choose_vehicle(
    state: &AppState,
    user: &User,
    vehicle_id: Option<&str>,
) -> Result<Option<Vehicle>> {
    match vehicle_id {
        Some(id) => {
            let vehicle = state
                .db
                .get_vehicle(id)
                .await?
                .filter(|v| v.owner_id == user.id)
                .ok_or_else(|| AppError::NotFound(format!("Vehicle {} not found", id)))?;
            Ok(Some(vehicle))
        }
        None => Ok(state.db.vehicles_for_owner(&user.id).await?.into_iter().next()),
    }
}

async fn my_rides(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<RideMatch>>> {
    let user = current_user(&state, &auth).await?;
    let now = Utc::now();
    let tz = state.config.campus.timezone;

    let rides = state
        .db
        .rides_for_owner(&user.id)
        .await?
        .into_iter()
        .map(|ride| RideMatch::describe(ride, Some(&user), now, tz))
        .collect();
    Ok(Json(rides))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RideMatch>> {
    let ride = load_ride(&state, &id).await?;
    Ok(Json(describe(&state, ride).await?))
}

// ─── Seats ───────────────────────────────────────────────────

async fn request_seat(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<RideMatch>> {
    let user = current_user(&state, &auth).await?;
    if !user.onboarded {
        return Err(AppError::OnboardingRequired);
    }

    let ride = state
        .db
        .update_seats(&id, &user.id, SeatOp::Request, Utc::now())
        .await?;
    tracing::info!(ride_id = %ride.id, user_id = %user.id, "Seat requested");

    Ok(Json(describe(&state, ride).await?))
}

async fn confirm_passenger(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path((id, passenger_id)): Path<(String, String)>,
) -> Result<Json<RideMatch>> {
    // Non-owners get the same answer as for a missing ride.
    let ride = load_ride(&state, &id).await?;
    if ride.owner_id != auth.user_id {
        return Err(AppError::NotFound(format!("Ride {} not found", id)));
    }

    let ride = state
        .db
        .update_seats(&id, &passenger_id, SeatOp::Confirm, Utc::now())
        .await?;
    tracing::info!(
        ride_id = %ride.id,
        passenger_id = %passenger_id,
        available = ?ride.available_seats(),
        "Passenger confirmed"
    );

    Ok(Json(describe(&state, ride).await?))
}

// ─── Route previews ──────────────────────────────────────────

async fn ride_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RoutePreview>> {
    let ride = load_ride(&state, &id).await?;
    let preview = state.directions.preview(&PreviewRequest::from(&ride)).await;
    Ok(Json(preview))
}

/// Query string of `GET /api/route-preview`.
#[derive(Debug, Default, Deserialize)]
pub struct PreviewParams {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub origin_lat: Option<f64>,
    #[serde(default)]
    pub origin_lng: Option<f64>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub destination_lat: Option<f64>,
    #[serde(default)]
    pub destination_lng: Option<f64>,
}

impl TryFrom<PreviewParams> for PreviewRequest {
    type Error = AppError;

    fn try_from(params: PreviewParams) -> Result<Self> {
        if params.origin.trim().is_empty() && params.origin_lat.is_none() {
            return Err(AppError::BadRequest("origin is required".to_string()));
        }
        Ok(PreviewRequest {
            origin: params.origin,
            origin_coordinates: coordinates(params.origin_lat, params.origin_lng, "origin")?,
            destination: params.destination,
            destination_coordinates: coordinates(
                params.destination_lat,
                params.destination_lng,
                "destination",
            )?,
        })
    }
}

fn coordinates(lat: Option<f64>, lng: Option<f64>, field: &str) -> Result<Option<Coordinates>> {
    match (lat, lng) {
        (Some(lat), Some(lng))
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) =>
        {
            Ok(Some(Coordinates { lng, lat }))
        }
        (None, None) => Ok(None),
        _ => Err(AppError::BadRequest(format!(
            "{}_lat and {}_lng must be given together as valid coordinates",
            field, field
        ))),
    }
}

async fn route_preview(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<RoutePreview>> {
    let request = PreviewRequest::try_from(params)?;
    Ok(Json(state.directions.preview(&request).await))
}
