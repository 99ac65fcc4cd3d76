// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride search: filtering, ordering, seat counts and compatibility scores.
//!
//! Everything here is pure. Callers load the open rides and their owners
//! from storage and pass them in along with the current time, so a search
//! with unchanged data and the same `now` always yields the same list.

use crate::error::AppError;
use crate::models::{Coordinates, GenderPreference, Ride, RideType, User, UserRole};
use crate::time_utils;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_MAX_DETOUR_KM: f64 = 16.0;

const SCHEDULE_WEIGHT: f64 = 0.40;
const ROUTE_WEIGHT: f64 = 0.35;
const PERSONAL_WEIGHT: f64 = 0.25;
/// Minutes outside the requested window at which time fit reaches zero.
const TIME_FIT_GRACE_MINUTES: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleFilter {
    #[default]
    Any,
    Driver,
    Passenger,
}

impl RoleFilter {
    fn admits(self, ride_type: RideType) -> bool {
        match self {
            RoleFilter::Any => true,
            RoleFilter::Driver => ride_type == RideType::Driver,
            RoleFilter::Passenger => ride_type == RideType::Passenger,
        }
    }
}

/// Parsed search filters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub role: RoleFilter,
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Campus-local calendar day
    pub date: Option<NaiveDate>,
    pub time_from: Option<NaiveTime>,
    pub time_to: Option<NaiveTime>,
    pub days: Vec<Weekday>,
    pub near: Option<Coordinates>,
    pub max_detour_km: f64,
    pub limit: usize,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            role: RoleFilter::Any,
            origin: None,
            destination: None,
            date: None,
            time_from: None,
            time_to: None,
            days: Vec::new(),
            near: None,
            max_detour_km: DEFAULT_MAX_DETOUR_KM,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Raw query string of `GET /api/rides`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub role: Option<RoleFilter>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time_from: Option<String>,
    #[serde(default)]
    pub time_to: Option<String>,
    /// Comma-separated weekday names
    #[serde(default)]
    pub days: Option<String>,
    #[serde(default)]
    pub near_lat: Option<f64>,
    #[serde(default)]
    pub near_lng: Option<f64>,
    #[serde(default)]
    pub max_detour_km: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl TryFrom<SearchParams> for SearchCriteria {
    type Error = AppError;

    fn try_from(params: SearchParams) -> Result<Self, Self::Error> {
        let non_empty = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };

        let date = non_empty(params.date)
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| AppError::BadRequest(format!("invalid date '{}'", raw)))
            })
            .transpose()?;

        let parse_time = |raw: Option<String>, field: &str| {
            non_empty(raw)
                .map(|raw| {
                    time_utils::parse_time_of_day(&raw)
                        .ok_or_else(|| AppError::BadRequest(format!("invalid {} '{}'", field, raw)))
                })
                .transpose()
        };
        let time_from = parse_time(params.time_from, "time_from")?;
        let time_to = parse_time(params.time_to, "time_to")?;

        let days = match non_empty(params.days) {
            Some(raw) => raw
                .split(',')
                .filter(|d| !d.trim().is_empty())
                .map(|d| {
                    time_utils::parse_weekday(d)
                        .ok_or_else(|| AppError::BadRequest(format!("invalid day '{}'", d.trim())))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let near = match (params.near_lat, params.near_lng) {
            (Some(lat), Some(lng))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) =>
            {
                Some(Coordinates { lng, lat })
            }
            (None, None) => None,
            _ => {
                return Err(AppError::BadRequest(
                    "near_lat and near_lng must be given together as valid coordinates".to_string(),
                ))
            }
        };

        let max_detour_km = match params.max_detour_km {
            Some(km) if km.is_finite() && km > 0.0 => km,
            Some(_) => {
                return Err(AppError::BadRequest(
                    "max_detour_km must be positive".to_string(),
                ))
            }
            None => DEFAULT_MAX_DETOUR_KM,
        };

        Ok(Self {
            role: params.role.unwrap_or_default(),
            origin: non_empty(params.origin),
            destination: non_empty(params.destination),
            date,
            time_from,
            time_to,
            days,
            near,
            max_detour_km,
            limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        })
    }
}

/// Public view of a ride's poster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub major: Option<String>,
    pub year: Option<String>,
    pub role: Option<UserRole>,
}

impl From<&User> for OwnerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            major: user.major.clone(),
            year: user.year.clone(),
            role: user.role,
        }
    }
}

/// Score in `[0, 1]` with the factors that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Compatibility {
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal: Option<f64>,
}

/// A ride as returned by search and ride lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideMatch {
    #[serde(flatten)]
    pub ride: Ride,
    pub owner: Option<OwnerSummary>,
    pub next_departure: Option<DateTime<Utc>>,
    pub total_seats: Option<u32>,
    pub available_seats: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<Compatibility>,
}

impl RideMatch {
    /// Derived view of a single ride, without a score.
    pub fn describe(ride: Ride, owner: Option<&User>, now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            next_departure: ride.next_departure(now, tz),
            total_seats: ride.total_seats(),
            available_seats: ride.available_seats(),
            owner: owner.map(OwnerSummary::from),
            compatibility: None,
            ride,
        }
    }
}

/// Departure that qualifies `ride` for `criteria`, or `None` if it is filtered out.
pub fn qualifying_departure(
    criteria: &SearchCriteria,
    ride: &Ride,
    now: DateTime<Utc>,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    if ride.status != crate::models::RideStatus::Pending || !criteria.role.admits(ride.ride_type) {
        return None;
    }
    if !contains_ci(&ride.origin.address, criteria.origin.as_deref())
        || !contains_ci(&ride.destination.address, criteria.destination.as_deref())
    {
        return None;
    }

    let departure = match criteria.date {
        Some(date) => ride.departure_on(date, tz),
        None => ride.next_departure(now, tz),
    }
    .filter(|departure| *departure > now)?;

    if !criteria.days.is_empty() {
        let runs = ride_days(ride, departure, tz);
        if !runs.iter().any(|d| criteria.days.contains(d)) {
            return None;
        }
    }
    Some(departure)
}

/// Run a search over `rides`.
///
/// `owners` maps user IDs to records; `viewer` is the searching user, used
/// for the personal compatibility factor.
pub fn search(
    criteria: &SearchCriteria,
    rides: &[Ride],
    owners: &HashMap<String, User>,
    viewer: Option<&User>,
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<RideMatch> {
    let mut hits: Vec<(DateTime<Utc>, &Ride)> = rides
        .iter()
        .filter_map(|ride| qualifying_departure(criteria, ride, now, tz).map(|d| (d, ride)))
        .collect();

    hits.sort_by(|(da, a), (db, b)| {
        da.cmp(db)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(criteria.limit);

    hits.into_iter()
        .map(|(departure, ride)| {
            let owner = owners.get(&ride.owner_id);
            RideMatch {
                ride: ride.clone(),
                owner: owner.map(OwnerSummary::from),
                next_departure: Some(departure),
                total_seats: ride.total_seats(),
                available_seats: ride.available_seats(),
                compatibility: score(criteria, ride, departure, viewer, owner, tz),
            }
        })
        .collect()
}

/// Weighted compatibility over the factors that have inputs.
pub fn score(
    criteria: &SearchCriteria,
    ride: &Ride,
    departure: DateTime<Utc>,
    viewer: Option<&User>,
    owner: Option<&User>,
    tz: Tz,
) -> Option<Compatibility> {
    let schedule = schedule_factor(criteria, ride, departure, tz);
    let route = route_factor(criteria, ride);
    let personal = viewer.map(|viewer| personal_factor(ride, viewer, owner));

    let weighted = [
        (schedule, SCHEDULE_WEIGHT),
        (route, ROUTE_WEIGHT),
        (personal, PERSONAL_WEIGHT),
    ];
    let (sum, weight) = weighted
        .iter()
        .filter_map(|(value, w)| value.map(|v| (v * w, *w)))
        .fold((0.0, 0.0), |(s, t), (v, w)| (s + v, t + w));

    if weight == 0.0 {
        return None;
    }

    Some(Compatibility {
        score: round2(sum / weight),
        schedule: schedule.map(round2),
        route: route.map(round2),
        personal: personal.map(round2),
    })
}

fn schedule_factor(
    criteria: &SearchCriteria,
    ride: &Ride,
    departure: DateTime<Utc>,
    tz: Tz,
) -> Option<f64> {
    let day_share = (!criteria.days.is_empty()).then(|| {
        let runs = ride_days(ride, departure, tz);
        let covered = criteria.days.iter().filter(|d| runs.contains(d)).count();
        covered as f64 / criteria.days.len() as f64
    });

    let time_fit = (criteria.time_from.is_some() || criteria.time_to.is_some()).then(|| {
        let local = departure.with_timezone(&tz).time();
        let early_by = criteria
            .time_from
            .map(|from| (from - local).num_minutes().max(0))
            .unwrap_or(0);
        let late_by = criteria
            .time_to
            .map(|to| (local - to).num_minutes().max(0))
            .unwrap_or(0);
        let outside = early_by.max(late_by) as f64;
        (1.0 - outside / TIME_FIT_GRACE_MINUTES).max(0.0)
    });

    match (day_share, time_fit) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (a, b) => a.or(b),
    }
}

fn route_factor(criteria: &SearchCriteria, ride: &Ride) -> Option<f64> {
    let near = criteria.near?;
    let origin = ride.origin.coordinates?;
    let km = haversine_km(near, origin);
    Some((1.0 - km / criteria.max_detour_km).clamp(0.0, 1.0))
}

fn personal_factor(ride: &Ride, viewer: &User, owner: Option<&User>) -> f64 {
    let complement = match (ride.ride_type, viewer.role) {
        (RideType::Driver, Some(role)) if role.can_ride() => 1.0,
        (RideType::Passenger, Some(role)) if role.can_drive() => 1.0,
        _ => 0.5,
    };
    let gender_ok = match ride.details.gender_preference {
        GenderPreference::Any => true,
        GenderPreference::Same => owner.is_some_and(|owner| owner.same_gender_as(viewer)),
    };
    if gender_ok {
        complement
    } else {
        0.0
    }
}

/// Weekdays a ride runs on: its schedule, or the day of a one-off departure.
fn ride_days(ride: &Ride, departure: DateTime<Utc>, tz: Tz) -> Vec<Weekday> {
    if ride.schedule.is_recurring {
        ride.schedule.days.clone()
    } else {
        vec![time_utils::local_date(departure, tz).weekday()]
    }
}

pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    Haversine.distance(Point::new(a.lng, a.lat), Point::new(b.lng, b.lat)) / 1000.0
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
