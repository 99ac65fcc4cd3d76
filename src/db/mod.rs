// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: Firestore in production, an in-memory store otherwise.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::config::{Config, StorageBackend};
use crate::error::AppError;
use crate::models::{Ride, SeatError, User, Vehicle};
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Email -> user ID index (document ID is the URL-encoded email)
    pub const USER_EMAILS: &str = "user_emails";
    pub const VEHICLES: &str = "vehicles";
    /// Normalized plate -> vehicle ID index
    pub const VEHICLE_PLATES: &str = "vehicle_plates";
    pub const RIDES: &str = "rides";
    /// Consumed sign-in link nonces
    pub const SIGN_IN_NONCES: &str = "sign_in_nonces";
}

/// Read-modify-write operations on a ride's passenger list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatOp {
    Request,
    Confirm,
}

impl SeatOp {
    pub fn apply(self, ride: &mut Ride, user_id: &str, now: DateTime<Utc>) -> Result<(), SeatError> {
        match self {
            SeatOp::Request => ride.request_seat(user_id, now),
            SeatOp::Confirm => ride.confirm_passenger(user_id, now),
        }
    }
}

/// Storage handle shared by all handlers.
#[derive(Clone)]
pub enum Database {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

impl Database {
    /// Connect to the backend selected in configuration.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        match config.storage_backend {
            StorageBackend::Firestore => Ok(Database::Firestore(
                FirestoreDb::new(&config.gcp_project_id).await?,
            )),
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Ok(Database::Memory(MemoryDb::new()))
            }
        }
    }

    pub fn memory() -> Self {
        Database::Memory(MemoryDb::new())
    }

    // ─── Users ───────────────────────────────────────────────────

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        match self {
            Database::Firestore(db) => db.get_user(user_id).await,
            Database::Memory(db) => Ok(db.get_user(user_id)),
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        match self {
            Database::Firestore(db) => db.get_user_by_email(email).await,
            Database::Memory(db) => Ok(db.get_user_by_email(email)),
        }
    }

    /// Exactly one user per email, even under concurrent calls.
    /// The flag is true when this call created the record.
    pub async fn get_or_create_user(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, bool), AppError> {
        match self {
            Database::Firestore(db) => db.get_or_create_user(email, now).await,
            Database::Memory(db) => Ok(db.get_or_create_user(email, now)),
        }
    }

    pub async fn save_user(&self, user: &User) -> Result<(), AppError> {
        match self {
            Database::Firestore(db) => db.save_user(user).await,
            Database::Memory(db) => {
                db.save_user(user);
                Ok(())
            }
        }
    }

    pub async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, AppError> {
        match self {
            Database::Firestore(db) => db.users_by_ids(ids).await,
            Database::Memory(db) => Ok(db.users_by_ids(ids)),
        }
    }

    // ─── Vehicles ────────────────────────────────────────────────

    /// Fails with `Conflict` when the plate is already registered.
    pub async fn add_vehicle(&self, vehicle: &Vehicle) -> Result<(), AppError> {
        match self {
            Database::Firestore(db) => db.add_vehicle(vehicle).await,
            Database::Memory(db) => db.add_vehicle(vehicle),
        }
    }

    pub async fn get_vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>, AppError> {
        match self {
            Database::Firestore(db) => db.get_vehicle(vehicle_id).await,
            Database::Memory(db) => Ok(db.get_vehicle(vehicle_id)),
        }
    }

    /// Owner's vehicles, oldest first.
    pub async fn vehicles_for_owner(&self, owner_id: &str) -> Result<Vec<Vehicle>, AppError> {
        let mut vehicles = match self {
            Database::Firestore(db) => db.vehicles_for_owner(owner_id).await?,
            Database::Memory(db) => db.vehicles_for_owner(owner_id),
        };
        vehicles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(vehicles)
    }

    // ─── Rides ───────────────────────────────────────────────────

    pub async fn create_ride(&self, ride: &Ride) -> Result<(), AppError> {
        match self {
            Database::Firestore(db) => db.create_ride(ride).await,
            Database::Memory(db) => {
                db.create_ride(ride);
                Ok(())
            }
        }
    }

    pub async fn get_ride(&self, ride_id: &str) -> Result<Option<Ride>, AppError> {
        match self {
            Database::Firestore(db) => db.get_ride(ride_id).await,
            Database::Memory(db) => Ok(db.get_ride(ride_id)),
        }
    }

    /// Rides with status `pending`, in no particular order.
    pub async fn open_rides(&self) -> Result<Vec<Ride>, AppError> {
        match self {
            Database::Firestore(db) => db.open_rides().await,
            Database::Memory(db) => Ok(db.open_rides()),
        }
    }

    /// Owner's rides, newest first.
    pub async fn rides_for_owner(&self, owner_id: &str) -> Result<Vec<Ride>, AppError> {
        let mut rides = match self {
            Database::Firestore(db) => db.rides_for_owner(owner_id).await?,
            Database::Memory(db) => db.rides_for_owner(owner_id),
        };
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rides)
    }

    /// Atomically apply `op` for `user_id` and return the updated ride.
    pub async fn update_seats(
        &self,
        ride_id: &str,
        user_id: &str,
        op: SeatOp,
        now: DateTime<Utc>,
    ) -> Result<Ride, AppError> {
        match self {
            Database::Firestore(db) => db.update_seats(ride_id, user_id, op, now).await,
            Database::Memory(db) => db.update_seats(ride_id, user_id, op, now),
        }
    }

    // ─── Sign-in nonces ──────────────────────────────────────────

    /// Record a link nonce as used; false if it already was.
    ///
    /// The record only needs to outlive the link, so it is kept until `expires_at`.
    pub async fn consume_nonce(
        &self,
        nonce: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self {
            Database::Firestore(db) => db.consume_nonce(nonce, expires_at, now).await,
            Database::Memory(db) => Ok(db.consume_nonce(nonce, expires_at, now)),
        }
    }
}
