// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route previews backed by the Mapbox geocoding and directions APIs.
//!
//! Handles:
//! - Campus synonyms (no geocoding needed for the default destination)
//! - Forward geocoding biased toward campus
//! - Driving directions with GeoJSON geometry and an encoded polyline
//!
//! External failures never reach the caller of `preview`: they are logged
//! and the preview loses its path (and, for the origin, its marker).

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Coordinates, Ride};
use serde::{Deserialize, Serialize};

const METERS_PER_MILE: f64 = 1609.344;
const POLYLINE_PRECISION: u32 = 5;
const CAMPUS_SYNONYMS: [&str; 4] = [
    "uci",
    "uc irvine",
    "uci main campus",
    "university of california, irvine",
];

/// Mapbox HTTP client.
#[derive(Clone)]
pub struct MapboxClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    features: Vec<GeocodingFeature>,
}

#[derive(Debug, Deserialize)]
struct GeocodingFeature {
    /// `[lng, lat]`
    center: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
    geometry: geojson::Geometry,
}

impl MapboxClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.external_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.mapbox_base_url.trim_end_matches('/').to_string(),
            token: config.mapbox_token.clone(),
        })
    }

    fn token(&self) -> Result<&str, AppError> {
        self.token
            .as_deref()
            .ok_or_else(|| AppError::ExternalService("Mapbox token not configured".to_string()))
    }

    /// Best match for `query`, biased toward `proximity`.
    pub async fn geocode(
        &self,
        query: &str,
        proximity: Coordinates,
    ) -> Result<Coordinates, AppError> {
        let url = format!(
            "{}/geocoding/v5/mapbox.places/{}.json",
            self.base_url,
            urlencoding::encode(query)
        );
        let proximity = format!("{},{}", proximity.lng, proximity.lat);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("access_token", self.token()?),
                ("country", "US"),
                ("limit", "1"),
                ("proximity", proximity.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("geocoding request failed: {}", e)))?;

        let body: GeocodingResponse = check_response_json(response, "geocoding").await?;
        let [lng, lat] = body
            .features
            .first()
            .map(|f| f.center)
            .ok_or_else(|| AppError::ExternalService(format!("no geocoding result for '{}'", query)))?;
        Ok(Coordinates { lng, lat })
    }

    /// Driving route between two points.
    pub async fn directions(
        &self,
        from: Coordinates,
        to: Coordinates,
    ) -> Result<RouteSummary, AppError> {
        let url = format!(
            "{}/directions/v5/mapbox/driving/{},{};{},{}",
            self.base_url, from.lng, from.lat, to.lng, to.lat
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("access_token", self.token()?),
                ("geometries", "geojson"),
                ("overview", "full"),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("directions request failed: {}", e)))?;

        let body: DirectionsResponse = check_response_json(response, "directions").await?;
        if body.code != "Ok" {
            return Err(AppError::ExternalService(format!(
                "directions returned code {}",
                body.code
            )));
        }
        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ExternalService("directions returned no route".to_string()))?;

        RouteSummary::from_route(route)
    }
}

async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    api: &str,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::ExternalService(format!(
            "{} HTTP {}: {}",
            api, status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::ExternalService(format!("{} JSON parse error: {}", api, e)))
}

/// Distance, duration and path of a driving route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    /// Miles, one decimal
    pub distance_miles: f64,
    /// Whole minutes
    pub duration_minutes: u32,
    pub geometry: geojson::Geometry,
    /// Encoded polyline, precision 5
    pub polyline: String,
}

impl RouteSummary {
    fn from_route(route: DirectionsRoute) -> Result<Self, AppError> {
        let geojson::Value::LineString(points) = &route.geometry.value else {
            return Err(AppError::ExternalService(
                "directions geometry is not a LineString".to_string(),
            ));
        };
        let line: geo::LineString<f64> = points
            .iter()
            .filter(|p| p.len() >= 2)
            .map(|p| (p[0], p[1]))
            .collect::<Vec<_>>()
            .into();
        let polyline = polyline::encode_coordinates(line, POLYLINE_PRECISION)
            .map_err(|e| AppError::ExternalService(format!("polyline encoding failed: {}", e)))?;

        Ok(Self {
            distance_miles: (route.distance / METERS_PER_MILE * 10.0).round() / 10.0,
            duration_minutes: (route.duration / 60.0).round().max(0.0) as u32,
            geometry: route.geometry,
            polyline,
        })
    }
}

/// A labelled map pin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub label: String,
    pub coordinates: Coordinates,
}

/// What a map needs to draw a ride. `route` is absent when degraded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePreview {
    pub origin: Option<Marker>,
    pub destination: Option<Marker>,
    pub route: Option<RouteSummary>,
}

/// Endpoints of a preview request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewRequest {
    pub origin: String,
    #[serde(default)]
    pub origin_coordinates: Option<Coordinates>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub destination_coordinates: Option<Coordinates>,
}

impl From<&Ride> for PreviewRequest {
    fn from(ride: &Ride) -> Self {
        Self {
            origin: ride.origin.address.clone(),
            origin_coordinates: ride.origin.coordinates,
            destination: Some(ride.destination.address.clone()),
            destination_coordinates: ride.destination.coordinates,
        }
    }
}

/// Whether `text` names the campus (or is blank).
pub fn is_campus(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    text.is_empty()
        || CAMPUS_SYNONYMS.contains(&text.as_str())
        || text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == "uci")
}

/// Route previews with graceful degradation.
#[derive(Clone)]
pub struct DirectionsService {
    client: MapboxClient,
    campus_name: String,
    campus: Coordinates,
}

impl DirectionsService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        if config.mapbox_token.is_none() {
            tracing::warn!("MAPBOX_TOKEN not set; route previews will have no path");
        }
        Ok(Self {
            client: MapboxClient::new(config)?,
            campus_name: config.campus.name.clone(),
            campus: config.campus.coordinates,
        })
    }

    /// Resolve both ends and fetch a route. Never fails.
    pub async fn preview(&self, request: &PreviewRequest) -> RoutePreview {
        let destination = self.resolve_destination(request).await;
        let origin = self.resolve_origin(request).await;

        let route = match (&origin, &destination) {
            (Some(from), Some(to)) => {
                match self.client.directions(from.coordinates, to.coordinates).await {
                    Ok(route) => Some(route),
                    Err(e) => {
                        tracing::warn!(error = %e, "Directions failed; preview has no path");
                        None
                    }
                }
            }
            _ => None,
        };

        RoutePreview {
            origin,
            destination,
            route,
        }
    }

    async fn resolve_destination(&self, request: &PreviewRequest) -> Option<Marker> {
        let text = request.destination.as_deref().unwrap_or("").trim();

        if let Some(coordinates) = request.destination_coordinates {
            let label = if text.is_empty() { self.campus_name.as_str() } else { text };
            return Some(Marker {
                label: label.to_string(),
                coordinates,
            });
        }
        if is_campus(text) {
            return Some(self.campus_marker());
        }

        match self.client.geocode(text, self.campus).await {
            Ok(coordinates) => Some(Marker {
                label: text.to_string(),
                coordinates,
            }),
            Err(e) => {
                tracing::warn!(error = %e, destination = %text, "Destination geocoding failed; using campus");
                Some(self.campus_marker())
            }
        }
    }

    async fn resolve_origin(&self, request: &PreviewRequest) -> Option<Marker> {
        let text = request.origin.trim();

        if let Some(coordinates) = request.origin_coordinates {
            return Some(Marker {
                label: text.to_string(),
                coordinates,
            });
        }
        if text.is_empty() {
            return None;
        }

        match self.client.geocode(text, self.campus).await {
            Ok(coordinates) => Some(Marker {
                label: text.to_string(),
                coordinates,
            }),
            Err(e) => {
                tracing::warn!(error = %e, origin = %text, "Origin geocoding failed");
                None
            }
        }
    }

    fn campus_marker(&self) -> Marker {
        Marker {
            label: self.campus_name.clone(),
            coordinates: self.campus,
        }
    }
}
