// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store used for local development and tests.
//!
//! Each uniqueness or read-modify-write operation holds a `DashMap` entry or
//! `get_mut` guard for its whole critical section, which gives the same
//! guarantees as the Firestore backend's create-only writes and transactions.

use crate::db::SeatOp;
use crate::error::AppError;
use crate::models::{Ride, RideStatus, User, Vehicle};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryDb {
    users: Arc<DashMap<String, User>>,
    /// email -> user id
    user_emails: Arc<DashMap<String, String>>,
    vehicles: Arc<DashMap<String, Vehicle>>,
    /// normalized plate -> vehicle id
    vehicle_plates: Arc<DashMap<String, String>>,
    rides: Arc<DashMap<String, Ride>>,
    /// consumed sign-in nonces -> link expiry
    sign_in_nonces: Arc<DashMap<String, DateTime<Utc>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| u.clone())
    }

    pub fn get_user_by_email(&self, email: &str) -> Option<User> {
        let user_id = self.user_emails.get(email)?.clone();
        self.get_user(&user_id)
    }

    pub fn get_or_create_user(&self, email: &str, now: DateTime<Utc>) -> (User, bool) {
        match self.user_emails.entry(email.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(mut user) = self.users.get_mut(entry.get()) {
                    if !user.email_verified {
                        user.email_verified = true;
                        user.updated_at = now;
                    }
                    return (user.clone(), false);
                }
                // Index points at a missing record; start over with a fresh user.
                let user = User::new_verified(email, now);
                self.users.insert(user.id.clone(), user.clone());
                entry.insert(user.id.clone());
                (user, true)
            }
            Entry::Vacant(entry) => {
                let user = User::new_verified(email, now);
                self.users.insert(user.id.clone(), user.clone());
                entry.insert(user.id.clone());
                (user, true)
            }
        }
    }

    pub fn save_user(&self, user: &User) {
        self.users.insert(user.id.clone(), user.clone());
    }

    pub fn users_by_ids(&self, ids: &[String]) -> Vec<User> {
        ids.iter().filter_map(|id| self.get_user(id)).collect()
    }

    pub fn add_vehicle(&self, vehicle: &Vehicle) -> Result<(), AppError> {
        match self.vehicle_plates.entry(vehicle.license_plate.clone()) {
            Entry::Occupied(_) => Err(plate_conflict(&vehicle.license_plate)),
            Entry::Vacant(entry) => {
                self.vehicles.insert(vehicle.id.clone(), vehicle.clone());
                entry.insert(vehicle.id.clone());
                Ok(())
            }
        }
    }

    pub fn get_vehicle(&self, vehicle_id: &str) -> Option<Vehicle> {
        self.vehicles.get(vehicle_id).map(|v| v.clone())
    }

    pub fn vehicles_for_owner(&self, owner_id: &str) -> Vec<Vehicle> {
        self.vehicles
            .iter()
            .filter(|v| v.owner_id == owner_id)
            .map(|v| v.clone())
            .collect()
    }

    pub fn create_ride(&self, ride: &Ride) {
        self.rides.insert(ride.id.clone(), ride.clone());
    }

    pub fn get_ride(&self, ride_id: &str) -> Option<Ride> {
        self.rides.get(ride_id).map(|r| r.clone())
    }

    pub fn open_rides(&self) -> Vec<Ride> {
        self.rides
            .iter()
            .filter(|r| r.status == RideStatus::Pending)
            .map(|r| r.clone())
            .collect()
    }

    pub fn rides_for_owner(&self, owner_id: &str) -> Vec<Ride> {
        self.rides
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.clone())
            .collect()
    }

    pub fn update_seats(
        &self,
        ride_id: &str,
        user_id: &str,
        op: SeatOp,
        now: DateTime<Utc>,
    ) -> Result<Ride, AppError> {
        let mut ride = self
            .rides
            .get_mut(ride_id)
            .ok_or_else(|| AppError::NotFound(format!("Ride {}", ride_id)))?;
        // Apply to a copy so a refused operation leaves the stored ride untouched.
        let mut updated = ride.clone();
        op.apply(&mut updated, user_id, now)?;
        *ride = updated.clone();
        Ok(updated)
    }

    /// Expired links are rejected before their nonce is checked, so their
    /// entries can be dropped.
    pub fn consume_nonce(
        &self,
        nonce: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self.sign_in_nonces.retain(|_, link_expiry| *link_expiry > now);
        match self.sign_in_nonces.entry(nonce.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        }
    }
}

pub(crate) fn plate_conflict(plate: &str) -> AppError {
    AppError::Conflict(format!(
        "A vehicle with license plate {} is already registered",
        plate
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ride::tests::{driver_ride, monday_morning};
    use std::sync::Barrier;

    #[test]
    fn test_get_or_create_user_is_idempotent() {
        let db = MemoryDb::new();
        let (first, created) = db.get_or_create_user("a@uci.edu", Utc::now());
        assert!(created);
        let (second, created) = db.get_or_create_user("a@uci.edu", Utc::now());
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(db.get_user_by_email("a@uci.edu"), Some(first));
    }

    #[test]
    fn test_concurrent_user_creation_yields_one_record() {
        let db = MemoryDb::new();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    db.get_or_create_user("race@uci.edu", Utc::now()).0.id
                })
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(db.users.len(), 1);
    }

    #[test]
    fn test_nonce_is_single_use() {
        let db = MemoryDb::new();
        let expires_at = Utc::now() + chrono::Duration::hours(1);
        assert!(db.consume_nonce("abc", expires_at, Utc::now()));
        assert!(!db.consume_nonce("abc", expires_at, Utc::now()));
    }

    #[test]
    fn test_expired_nonces_are_pruned() {
        let db = MemoryDb::new();
        let now = Utc::now();
        assert!(db.consume_nonce("old", now + chrono::Duration::minutes(5), now));
        assert!(db.consume_nonce("new", now + chrono::Duration::hours(2), now));

        let later = now + chrono::Duration::hours(1);
        assert!(db.consume_nonce("newer", later + chrono::Duration::hours(2), later));

        assert!(!db.sign_in_nonces.contains_key("old"));
        assert!(db.sign_in_nonces.contains_key("new"));
        assert_eq!(db.sign_in_nonces.len(), 2);
    }

    #[test]
    fn test_concurrent_confirmations_respect_capacity() {
        let db = MemoryDb::new();
        let mut ride = driver_ride("r1", 2);
        for i in 0..6 {
            ride.request_seat(&format!("p{}", i), monday_morning()).unwrap();
        }
        db.create_ride(&ride);

        let barrier = Arc::new(Barrier::new(6));
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let db = db.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    db.update_seats("r1", &format!("p{}", i), SeatOp::Confirm, Utc::now())
                        .is_ok()
                })
            })
            .collect();
        let confirmed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(confirmed, 2);
        let stored = db.get_ride("r1").unwrap();
        assert_eq!(stored.confirmed_count(), 2);
        assert_eq!(stored.available_seats(), Some(0));
    }
}
