// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a user participates in the carpool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Driver,
    Passenger,
    Both,
}

impl UserRole {
    pub fn can_drive(self) -> bool {
        matches!(self, UserRole::Driver | UserRole::Both)
    }

    pub fn can_ride(self) -> bool {
        matches!(self, UserRole::Passenger | UserRole::Both)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserRole::Driver => "driver",
            UserRole::Passenger => "passenger",
            UserRole::Both => "both",
        };
        f.write_str(s)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driver" => Ok(UserRole::Driver),
            "passenger" => Ok(UserRole::Passenger),
            "both" => Ok(UserRole::Both),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Who a user is willing to share a car with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderPreference {
    #[default]
    Any,
    Same,
}

/// User profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque user ID (also used as document ID)
    pub id: String,
    /// Display name
    pub name: String,
    /// Institutional email address (lower-cased)
    pub email: String,
    /// Set once the user completes a sign-in link
    #[serde(default)]
    pub email_verified: bool,
    /// Set once the onboarding wizard finishes
    #[serde(default)]
    pub onboarded: bool,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub pronouns: Option<String>,
    /// Home city or area the user commutes from
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    /// Academic year (Freshman, Sophomore, ..., Grad)
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub discord: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gender_preference: GenderPreference,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a freshly verified, not yet onboarded user for `email`.
    ///
    /// The display name defaults to the email's local part with `.` and `_`
    /// replaced by spaces.
    pub fn new_verified(email: &str, now: DateTime<Utc>) -> Self {
        let local_part = email.split('@').next().unwrap_or_default();
        let name = local_part.replace(['.', '_'], " ").trim().to_string();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email: email.to_string(),
            email_verified: true,
            onboarded: false,
            role: None,
            gender: None,
            pronouns: None,
            city: None,
            zip_code: None,
            major: None,
            year: None,
            bio: None,
            instagram: None,
            discord: None,
            linkedin: None,
            phone: None,
            gender_preference: GenderPreference::Any,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether two users share a stated gender (unknown never matches).
    pub fn same_gender_as(&self, other: &User) -> bool {
        match (self.gender.as_deref(), other.gender.as_deref()) {
            (Some(a), Some(b)) => !a.trim().is_empty() && a.eq_ignore_ascii_case(b.trim()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_verified_derives_name_from_email() {
        let user = User::new_verified("peter_anteater.jr@uci.edu", Utc::now());
        assert_eq!(user.name, "peter anteater jr");
        assert!(user.email_verified);
        assert!(!user.onboarded);
        assert_eq!(user.role, None);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Driver".parse::<UserRole>(), Ok(UserRole::Driver));
        assert_eq!(" both ".parse::<UserRole>(), Ok(UserRole::Both));
        assert!("pilot".parse::<UserRole>().is_err());
        assert!(UserRole::Both.can_drive() && UserRole::Both.can_ride());
    }

    #[test]
    fn test_same_gender_requires_both_known() {
        let mut a = User::new_verified("a@uci.edu", Utc::now());
        let mut b = User::new_verified("b@uci.edu", Utc::now());
        assert!(!a.same_gender_as(&b));

        a.gender = Some("Female".to_string());
        b.gender = Some("female".to_string());
        assert!(a.same_gender_as(&b));
    }
}
