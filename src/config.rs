// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets (JWT and sign-in link keys, SMTP password, Mapbox token) are read
//! once at startup and kept in memory.

use crate::models::Coordinates;
use chrono_tz::Tz;
use std::env;
use std::time::Duration;

/// Default institution email domain.
pub const DEFAULT_INSTITUTION_DOMAIN: &str = "uci.edu";
/// Default campus display name (also the default ride destination).
pub const DEFAULT_CAMPUS_NAME: &str = "UCI Main Campus";
/// UCI main campus coordinates.
pub const DEFAULT_CAMPUS_COORDS: Coordinates = Coordinates {
    lng: -117.8443,
    lat: 33.6405,
};
/// Campus time zone, DST included.
const DEFAULT_CAMPUS_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;
const DEFAULT_SIGN_IN_LINK_TTL_HOURS: i64 = 24;
const DEFAULT_EXTERNAL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAPBOX_BASE_URL: &str = "https://api.mapbox.com";

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

/// Campus the carpool platform serves.
#[derive(Debug, Clone)]
pub struct Campus {
    pub name: String,
    pub coordinates: Coordinates,
    /// Time zone used for calendar-day boundaries and recurring schedules.
    pub timezone: Tz,
}

/// SMTP settings for sign-in emails.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Sender address (e.g. `noreply@zotpool.app`)
    pub from: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for sign-in redirects
    pub frontend_url: String,
    /// Public URL of this API (sign-in links point here)
    pub api_url: String,
    /// GCP project ID (Firestore backend)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Persistence backend
    pub storage_backend: StorageBackend,
    /// Email domain allowed to sign in (without `@`)
    pub institution_domain: String,
    /// Campus location and time zone
    pub campus: Campus,
    /// How long a sign-in link stays valid
    pub sign_in_link_ttl_hours: i64,
    /// Mapbox API base URL
    pub mapbox_base_url: String,
    /// Timeout applied to every external HTTP call
    pub external_timeout: Duration,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for sign-in links (raw bytes)
    pub sign_in_link_key: Vec<u8>,
    /// Mapbox access token (route previews degrade without it)
    pub mapbox_token: Option<String>,
    /// SMTP settings (links are only logged without them)
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StorageBackend::Firestore,
            "memory" => StorageBackend::Memory,
            _ => return Err(ConfigError::Invalid("STORAGE_BACKEND")),
        };

        let campus = Campus {
            name: env::var("CAMPUS_NAME").unwrap_or_else(|_| DEFAULT_CAMPUS_NAME.to_string()),
            coordinates: Coordinates {
                lng: parse_or("CAMPUS_LNG", DEFAULT_CAMPUS_COORDS.lng)?,
                lat: parse_or("CAMPUS_LAT", DEFAULT_CAMPUS_COORDS.lat)?,
            },
            timezone: parse_or("CAMPUS_TIMEZONE", DEFAULT_CAMPUS_TIMEZONE)?,
        };

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host: host.trim().to_string(),
                port: parse_or("SMTP_PORT", 587)?,
                user: env::var("SMTP_USER").map_err(|_| ConfigError::Missing("SMTP_USER"))?,
                pass: env::var("SMTP_PASS")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("SMTP_PASS"))?,
                from: env::var("SMTP_FROM")
                    .or_else(|_| env::var("SMTP_USER"))
                    .map_err(|_| ConfigError::Missing("SMTP_FROM"))?,
            }),
            _ => None,
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            storage_backend,
            institution_domain: env::var("INSTITUTION_DOMAIN")
                .map(|d| d.trim().trim_start_matches('@').to_ascii_lowercase())
                .unwrap_or_else(|_| DEFAULT_INSTITUTION_DOMAIN.to_string()),
            campus,
            sign_in_link_ttl_hours: parse_or(
                "SIGN_IN_LINK_TTL_HOURS",
                DEFAULT_SIGN_IN_LINK_TTL_HOURS,
            )?,
            mapbox_base_url: env::var("MAPBOX_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MAPBOX_BASE_URL.to_string()),
            external_timeout: Duration::from_millis(parse_or(
                "EXTERNAL_TIMEOUT_MS",
                DEFAULT_EXTERNAL_TIMEOUT_MS,
            )?),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            sign_in_link_key: env::var("SIGN_IN_LINK_KEY")
                .map_err(|_| ConfigError::Missing("SIGN_IN_LINK_KEY"))?
                .into_bytes(),
            mapbox_token: env::var("MAPBOX_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            smtp,
        })
    }

    /// Config for tests: in-memory storage, no SMTP, no Mapbox token.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            institution_domain: DEFAULT_INSTITUTION_DOMAIN.to_string(),
            campus: Campus {
                name: DEFAULT_CAMPUS_NAME.to_string(),
                coordinates: DEFAULT_CAMPUS_COORDS,
                timezone: DEFAULT_CAMPUS_TIMEZONE,
            },
            sign_in_link_ttl_hours: DEFAULT_SIGN_IN_LINK_TTL_HOURS,
            mapbox_base_url: DEFAULT_MAPBOX_BASE_URL.to_string(),
            external_timeout: Duration::from_millis(500),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            sign_in_link_key: b"test_link_key_32_bytes_minimum!".to_vec(),
            mapbox_token: None,
            smtp: None,
        }
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid(name))
        }
        _ => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
