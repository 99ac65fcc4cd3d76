// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! FIRESTORE_EMULATOR_HOST to point at it; otherwise they are skipped.

use chrono::Utc;
use zotpool::db::SeatOp;
use zotpool::error::AppError;
use zotpool::models::{NewVehicle, Ride, RideStatus};

mod common;
use common::test_db;

/// Unique suffix for test isolation.
fn unique() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn offer(owner_id: &str, seats: u32) -> Ride {
    let mut ride: Ride = serde_json::from_value(serde_json::json!({
        "id": format!("ride-{}", unique()),
        "owner_id": owner_id,
        "ride_type": "driver",
        "origin": { "address": "Irvine Spectrum" },
        "destination": { "address": "UCI Main Campus" },
        "schedule": {
            "days": ["Mon", "Wed", "Fri"],
            "time_start": "08:00",
            "time_end": "17:00",
            "is_recurring": true
        },
        "status": "pending",
        "created_at": Utc::now()
    }))
    .unwrap();
    ride.details.seats = Some(seats);
    ride
}

// ═══════════════════════════════════════════════════════════════════════════
// USER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_get_or_create_user_is_idempotent() {
    require_emulator!();

    let db = test_db().await;
    let email = format!("{}@uci.edu", unique());

    assert!(db.get_user_by_email(&email).await.unwrap().is_none());

    let (first, created) = db.get_or_create_user(&email, Utc::now()).await.unwrap();
    assert!(created);
    let (second, created) = db.get_or_create_user(&email, Utc::now()).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);

    let by_id = db.get_user(&first.id).await.unwrap().unwrap();
    assert_eq!(by_id.email, email);
}

#[tokio::test]
async fn test_concurrent_user_creation_yields_one_user() {
    require_emulator!();

    let db = test_db().await;
    let email = format!("{}@uci.edu", unique());

    let (a, b) = tokio::join!(
        db.get_or_create_user(&email, Utc::now()),
        db.get_or_create_user(&email, Utc::now())
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.0.id, b.0.id);
    assert!(a.1 ^ b.1, "exactly one call creates the user");
}

#[tokio::test]
async fn test_nonce_consumed_once() {
    require_emulator!();

    let db = test_db().await;
    let nonce = unique();

    let expires_at = Utc::now() + chrono::Duration::hours(1);

    assert!(db.consume_nonce(&nonce, expires_at, Utc::now()).await.unwrap());
    assert!(!db.consume_nonce(&nonce, expires_at, Utc::now()).await.unwrap());
}

// ═══════════════════════════════════════════════════════════════════════════
// VEHICLE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_duplicate_plate_conflicts() {
    require_emulator!();

    let db = test_db().await;
    let plate = unique()[..7].to_uppercase();
    let new_vehicle = || NewVehicle {
        make: "Toyota".to_string(),
        model: "Prius".to_string(),
        year: 2021,
        color: "White".to_string(),
        license_plate: plate.clone(),
        capacity: Some(3),
    };

    let first = new_vehicle().into_vehicle("owner-1", Utc::now());
    db.add_vehicle(&first).await.unwrap();

    let second = new_vehicle().into_vehicle("owner-2", Utc::now());
    assert!(matches!(
        db.add_vehicle(&second).await,
        Err(AppError::Conflict(_))
    ));

    let owned = db.vehicles_for_owner("owner-1").await.unwrap();
    assert!(owned.iter().any(|v| v.id == first.id));
    assert!(db.get_vehicle(&second.id).await.unwrap().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// RIDE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_ride_round_trip_and_open_listing() {
    require_emulator!();

    let db = test_db().await;
    let owner = format!("owner-{}", unique());
    let ride = offer(&owner, 3);
    db.create_ride(&ride).await.unwrap();

    let stored = db.get_ride(&ride.id).await.unwrap().unwrap();
    assert_eq!(stored, ride);

    let open = db.open_rides().await.unwrap();
    assert!(open.iter().any(|r| r.id == ride.id));
    assert!(open.iter().all(|r| r.status == RideStatus::Pending));

    let mine = db.rides_for_owner(&owner).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn test_concurrent_confirmations_respect_capacity() {
    require_emulator!();

    let db = test_db().await;
    let ride = offer(&format!("owner-{}", unique()), 1);
    db.create_ride(&ride).await.unwrap();

    let riders: Vec<String> = (0..3).map(|i| format!("rider-{}-{}", i, unique())).collect();
    for rider in &riders {
        db.update_seats(&ride.id, rider, SeatOp::Request, Utc::now())
            .await
            .unwrap();
    }

    let results = futures_util::future::join_all(
        riders
            .iter()
            .map(|rider| db.update_seats(&ride.id, rider, SeatOp::Confirm, Utc::now())),
    )
    .await;

    // Losers see "full", or a contention failure from the emulator
    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(confirmed, 1);

    let stored = db.get_ride(&ride.id).await.unwrap().unwrap();
    assert_eq!(stored.confirmed_count(), 1);
}
