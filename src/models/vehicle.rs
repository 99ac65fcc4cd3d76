// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Vehicle model for storage and API.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Seats assumed when a registration omits capacity.
pub const DEFAULT_CAPACITY: u32 = 4;

/// A vehicle registered by a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Opaque vehicle ID (also used as document ID)
    pub id: String,
    /// User ID of the owner
    pub owner_id: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    /// Normalized plate (trimmed, upper-case); unique across all vehicles
    pub license_plate: String,
    /// Passenger seats available to riders
    pub capacity: u32,
    pub created_at: DateTime<Utc>,
}

/// Vehicle registration request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewVehicle {
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub make: String,
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub model: String,
    #[validate(custom(function = "validate_model_year"))]
    pub year: i32,
    #[validate(length(min = 1, max = 30, message = "is required"))]
    pub color: String,
    #[validate(custom(function = "validate_license_plate"))]
    pub license_plate: String,
    #[validate(range(min = 1, max = 8, message = "must be between 1 and 8"))]
    pub capacity: Option<u32>,
}

impl NewVehicle {
    /// Build the stored vehicle for `owner_id`.
    pub fn into_vehicle(self, owner_id: &str, now: DateTime<Utc>) -> Vehicle {
        Vehicle {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            make: self.make.trim().to_string(),
            model: self.model.trim().to_string(),
            year: self.year,
            color: self.color.trim().to_string(),
            license_plate: normalize_plate(&self.license_plate),
            capacity: self.capacity.unwrap_or(DEFAULT_CAPACITY),
            created_at: now,
        }
    }
}

/// Canonical form of a license plate used for uniqueness checks.
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn validate_license_plate(plate: &str) -> Result<(), ValidationError> {
    let normalized = normalize_plate(plate);
    let valid = (2..=8).contains(&normalized.len())
        && normalized.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("license_plate")
            .with_message("must be 2-8 letters or digits".into()))
    }
}

fn validate_model_year(year: i32) -> Result<(), ValidationError> {
    let max_year = Utc::now().year() + 1;
    if (1950..=max_year).contains(&year) {
        Ok(())
    } else {
        Err(ValidationError::new("year").with_message("is out of range".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn civic() -> NewVehicle {
        NewVehicle {
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            year: 2018,
            color: "Blue".to_string(),
            license_plate: " 8abc 123 ".to_string(),
            capacity: None,
        }
    }

    #[test]
    fn test_plate_is_normalized() {
        let vehicle = civic().into_vehicle("user-1", Utc::now());
        assert_eq!(vehicle.license_plate, "8ABC123");
        assert_eq!(vehicle.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_validation_rejects_bad_fields() {
        assert!(civic().validate().is_ok());

        let mut bad = civic();
        bad.license_plate = "!!".to_string();
        bad.capacity = Some(0);
        bad.year = 1900;
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("license_plate"));
        assert!(fields.contains_key("capacity"));
        assert!(fields.contains_key("year"));
    }
}
