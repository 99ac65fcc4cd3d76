// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users, plus the `user_emails` index that makes email unique
//! - Vehicles, plus the `vehicle_plates` index that makes plates unique
//! - Rides, with transactional seat requests and confirmations
//! - Consumed sign-in link nonces
//!
//! Uniqueness is enforced with create-only inserts: Firestore rejects the
//! second create of a document ID with a conflict.

use crate::db::{collections, memory::plate_conflict, SeatOp};
use crate::error::AppError;
use crate::models::{Ride, User, Vehicle};
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Maps an index key to the document it protects.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    target_id: String,
    created_at: DateTime<Utc>,
}

/// A spent sign-in link nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NonceEntry {
    used_at: DateTime<Utc>,
    /// TTL field
    #[serde(with = "firestore::serialize_as_timestamp")]
    expires_at: DateTime<Utc>,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

fn db_err(e: FirestoreError) -> AppError {
    AppError::Database(e.to_string())
}

fn is_conflict(e: &FirestoreError) -> bool {
    matches!(e, FirestoreError::DataConflictError(_))
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Emulator connection with a dummy bearer token.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ6b3Rwb29sIn0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(db_err)
    }

    async fn set_doc<T>(&self, collection: &str, id: &str, value: &T) -> Result<(), AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Send + Sync,
    {
        let _: T = self
            .client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(value)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Create-only write. `Ok(false)` when the document already exists.
    async fn create_doc<T>(&self, collection: &str, id: &str, value: &T) -> Result<bool, AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Send + Sync,
    {
        let result: Result<T, FirestoreError> = self
            .client
            .fluent()
            .insert()
            .into(collection)
            .document_id(id)
            .object(value)
            .execute()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) if is_conflict(&e) => Ok(false),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(db_err)
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, user_id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let index: Option<IndexEntry> = self
            .get_doc(collections::USER_EMAILS, &urlencoding::encode(email))
            .await?;
        match index {
            Some(entry) => self.get_user(&entry.target_id).await,
            None => Ok(None),
        }
    }

    /// Load the user for `email`, creating it on first sign-in.
    ///
    /// The user document is written before the email index, so a concurrent
    /// caller that loses the index race always finds the winner's record.
    pub async fn get_or_create_user(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, bool), AppError> {
        if let Some(mut user) = self.get_user_by_email(email).await? {
            if !user.email_verified {
                user.email_verified = true;
                user.updated_at = now;
                self.save_user(&user).await?;
            }
            return Ok((user, false));
        }

        let user = User::new_verified(email, now);
        self.save_user(&user).await?;

        let index = IndexEntry {
            target_id: user.id.clone(),
            created_at: now,
        };
        if self
            .create_doc(collections::USER_EMAILS, &urlencoding::encode(email), &index)
            .await?
        {
            tracing::info!(user_id = %user.id, "Created user");
            return Ok((user, true));
        }

        tracing::debug!(user_id = %user.id, "Lost user creation race, discarding record");
        self.delete_doc(collections::USERS, &user.id).await?;
        let existing = self.get_user_by_email(email).await?.ok_or_else(|| {
            AppError::Database(format!("User index for {} points at a missing user", email))
        })?;
        Ok((existing, false))
    }

    pub async fn save_user(&self, user: &User) -> Result<(), AppError> {
        self.set_doc(collections::USERS, &user.id, user).await
    }

    /// Fetch several users concurrently; missing IDs are skipped.
    pub async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, AppError> {
        let results: Vec<Result<Option<User>, AppError>> = stream::iter(ids.iter().cloned())
            .map(|id| async move { self.get_user(&id).await })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect()
            .await;

        let mut users = Vec::with_capacity(results.len());
        for result in results {
            if let Some(user) = result? {
                users.push(user);
            }
        }
        Ok(users)
    }

    // ─── Vehicle Operations ──────────────────────────────────────

    /// Register a vehicle; the plate index is claimed first.
    pub async fn add_vehicle(&self, vehicle: &Vehicle) -> Result<(), AppError> {
        let index = IndexEntry {
            target_id: vehicle.id.clone(),
            created_at: vehicle.created_at,
        };
        if !self
            .create_doc(collections::VEHICLE_PLATES, &vehicle.license_plate, &index)
            .await?
        {
            return Err(plate_conflict(&vehicle.license_plate));
        }
        self.set_doc(collections::VEHICLES, &vehicle.id, vehicle).await
    }

    pub async fn get_vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>, AppError> {
        self.get_doc(collections::VEHICLES, vehicle_id).await
    }

    pub async fn vehicles_for_owner(&self, owner_id: &str) -> Result<Vec<Vehicle>, AppError> {
        let owner_id = owner_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::VEHICLES)
            .filter(move |q| q.for_all([q.field("owner_id").eq(owner_id.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    // ─── Ride Operations ─────────────────────────────────────────

    pub async fn create_ride(&self, ride: &Ride) -> Result<(), AppError> {
        self.set_doc(collections::RIDES, &ride.id, ride).await
    }

    pub async fn get_ride(&self, ride_id: &str) -> Result<Option<Ride>, AppError> {
        self.get_doc(collections::RIDES, ride_id).await
    }

    /// All rides still accepting riders.
    pub async fn open_rides(&self) -> Result<Vec<Ride>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::RIDES)
            .filter(|q| q.for_all([q.field("status").eq("pending")]))
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    pub async fn rides_for_owner(&self, owner_id: &str) -> Result<Vec<Ride>, AppError> {
        let owner_id = owner_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::RIDES)
            .filter(move |q| q.for_all([q.field("owner_id").eq(owner_id.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    /// Apply a seat operation inside a transaction.
    ///
    /// The ride is read within the transaction, so a concurrent confirmation
    /// forces a retry against fresh data and the seat check is re-run.
    pub async fn update_seats(
        &self,
        ride_id: &str,
        user_id: &str,
        op: SeatOp,
        now: DateTime<Utc>,
    ) -> Result<Ride, AppError> {
        let ride_id = ride_id.to_string();
        let user_id = user_id.to_string();

        let outcome = self
            .client
            .run_transaction(|db, transaction| {
                let ride_id = ride_id.clone();
                let user_id = user_id.clone();
                Box::pin(async move {
                    let ride: Option<Ride> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::RIDES)
                        .obj()
                        .one(&ride_id)
                        .await?;

                    let Some(mut ride) = ride else {
                        return Ok(Err(AppError::NotFound(format!("Ride {}", ride_id))));
                    };
                    if let Err(e) = op.apply(&mut ride, &user_id, now) {
                        return Ok(Err(AppError::from(e)));
                    }

                    db.fluent()
                        .update()
                        .in_col(collections::RIDES)
                        .document_id(&ride_id)
                        .object(&ride)
                        .add_to_transaction(transaction)?;

                    Ok(Ok(ride))
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Seat transaction failed: {}", e)))?;

        let ride = outcome?;
        tracing::info!(ride_id = %ride.id, user_id = %user_id, ?op, "Seat update committed");
        Ok(ride)
    }

    // ─── Sign-in Link Nonces ─────────────────────────────────────

    /// Mark a link nonce as used. `Ok(false)` if it was used before.
    ///
    /// `expires_at` is stored as a timestamp so a Firestore TTL policy on
    /// that field can delete spent nonces.
    pub async fn consume_nonce(
        &self,
        nonce: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let entry = NonceEntry {
            used_at: now,
            expires_at,
        };
        self.create_doc(collections::SIGN_IN_NONCES, nonce, &entry)
            .await
    }
}
