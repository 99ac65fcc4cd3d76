// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ride (post) model: driver offers and passenger requests.

use crate::error::AppError;
use crate::models::user::GenderPreference;
use crate::models::vehicle::Vehicle;
use crate::time_utils::{self, hhmm};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct Coordinates {
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
}

/// Free-text location with optional resolved coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// Whether a post offers seats or asks for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideType {
    Driver,
    Passenger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// How a driver shares trip costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostType {
    Free,
    SplitGas,
    SplitGasParking,
    Negotiable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerStatus {
    Pending,
    Confirmed,
    Declined,
}

/// A passenger's seat request on a driver ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidePassenger {
    pub user_id: String,
    pub status: PassengerStatus,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Weekly commute schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Days the commute runs, Monday first, no duplicates
    pub days: Vec<Weekday>,
    /// Departure time (campus-local)
    #[serde(with = "hhmm")]
    pub time_start: NaiveTime,
    /// Return time (campus-local)
    #[serde(with = "hhmm")]
    pub time_end: NaiveTime,
    pub is_recurring: bool,
}

impl Schedule {
    pub fn runs_on(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }

    /// Departure on a given campus-local date, if the schedule runs that day.
    pub fn occurrence_on(&self, date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
        if !self.runs_on(date.weekday()) {
            return None;
        }
        time_utils::local_to_utc(date, self.time_start, tz)
    }

    /// First departure strictly after `now`.
    pub fn next_occurrence(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let today = time_utils::local_date(now, tz);
        (0..=7)
            .filter_map(|offset| self.occurrence_on(today + Duration::days(offset), tz))
            .find(|departure| *departure > now)
    }
}

/// Role-specific details of a post.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RideDetails {
    /// Vehicle used for a driver offer
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub car_type: Option<String>,
    /// Seats offered (driver offers only)
    #[serde(default)]
    pub seats: Option<u32>,
    /// 1 (messy) to 5 (spotless)
    #[serde(default)]
    pub cleanliness: Option<u8>,
    #[serde(default)]
    pub cost_type: Option<CostType>,
    #[serde(default)]
    pub gender_preference: GenderPreference,
    #[serde(default)]
    pub years_driving: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A commute listing stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    /// Opaque ride ID (also used as document ID)
    pub id: String,
    /// User ID of the poster
    pub owner_id: String,
    pub ride_type: RideType,
    pub origin: Place,
    pub destination: Place,
    pub schedule: Schedule,
    /// Departure of a one-off ride; recurring rides derive it from the schedule
    #[serde(default)]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: RideDetails,
    pub status: RideStatus,
    #[serde(default)]
    pub passengers: Vec<RidePassenger>,
    pub created_at: DateTime<Utc>,
}

/// Why a seat request or confirmation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeatError {
    #[error("Only driver offers accept seat requests")]
    NotDriverRide,
    #[error("You cannot request a seat on your own ride")]
    OwnRide,
    #[error("Ride is no longer open")]
    NotPending,
    #[error("Seat already requested")]
    DuplicateRequest,
    #[error("No seat request from this user")]
    NoSuchRequest,
    #[error("Passenger already confirmed")]
    AlreadyConfirmed,
    #[error("Ride is full")]
    Full,
}

impl From<SeatError> for AppError {
    fn from(err: SeatError) -> Self {
        match err {
            SeatError::NoSuchRequest => AppError::NotFound(err.to_string()),
            SeatError::DuplicateRequest | SeatError::AlreadyConfirmed | SeatError::Full => {
                AppError::Conflict(err.to_string())
            }
            SeatError::NotDriverRide | SeatError::OwnRide | SeatError::NotPending => {
                AppError::Validation(err.to_string())
            }
        }
    }
}

impl Ride {
    /// Seats offered; `None` for passenger requests.
    pub fn total_seats(&self) -> Option<u32> {
        match self.ride_type {
            RideType::Driver => Some(self.details.seats.unwrap_or(0)),
            RideType::Passenger => None,
        }
    }

    pub fn confirmed_count(&self) -> u32 {
        self.passengers
            .iter()
            .filter(|p| p.status == PassengerStatus::Confirmed)
            .count() as u32
    }

    /// Seats still open: total minus confirmed, clamped to `[0, total]`.
    pub fn available_seats(&self) -> Option<u32> {
        self.total_seats()
            .map(|total| total.saturating_sub(self.confirmed_count()))
    }

    /// Next departure strictly after `now`.
    pub fn next_departure(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        if self.schedule.is_recurring {
            self.schedule.next_occurrence(now, tz)
        } else {
            self.departure_time.filter(|departure| *departure > now)
        }
    }

    /// Departure within the campus-local calendar day `date`.
    pub fn departure_on(&self, date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
        if self.schedule.is_recurring {
            self.schedule.occurrence_on(date, tz)
        } else {
            let (start, end) = time_utils::local_day_bounds(date, tz)?;
            self.departure_time
                .filter(|departure| *departure >= start && *departure < end)
        }
    }

    pub fn passenger(&self, user_id: &str) -> Option<&RidePassenger> {
        self.passengers.iter().find(|p| p.user_id == user_id)
    }

    /// Record a pending seat request from `user_id`.
    pub fn request_seat(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<(), SeatError> {
        if self.ride_type != RideType::Driver {
            return Err(SeatError::NotDriverRide);
        }
        if self.owner_id == user_id {
            return Err(SeatError::OwnRide);
        }
        if self.status != RideStatus::Pending {
            return Err(SeatError::NotPending);
        }
        if self.passenger(user_id).is_some() {
            return Err(SeatError::DuplicateRequest);
        }
        self.passengers.push(RidePassenger {
            user_id: user_id.to_string(),
            status: PassengerStatus::Pending,
            requested_at: now,
            updated_at: now,
        });
        Ok(())
    }

    /// Confirm a pending request, only while `confirmed < total seats`.
    ///
    /// Storage backends call this inside their atomic section so concurrent
    /// confirmations cannot overbook the ride.
    pub fn confirm_passenger(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<(), SeatError> {
        if self.status != RideStatus::Pending {
            return Err(SeatError::NotPending);
        }
        let has_room = self.available_seats().unwrap_or(0) > 0;
        let passenger = self
            .passengers
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(SeatError::NoSuchRequest)?;

        if passenger.status == PassengerStatus::Confirmed {
            return Err(SeatError::AlreadyConfirmed);
        }
        if !has_room {
            return Err(SeatError::Full);
        }
        passenger.status = PassengerStatus::Confirmed;
        passenger.updated_at = now;
        Ok(())
    }
}

/// Ride creation request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRide {
    pub ride_type: RideType,
    #[validate(length(min = 1, max = 200, message = "is required"))]
    pub origin: String,
    #[validate(nested)]
    #[serde(default)]
    pub origin_coordinates: Option<Coordinates>,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub destination: Option<String>,
    #[validate(nested)]
    #[serde(default)]
    pub destination_coordinates: Option<Coordinates>,
    #[serde(default)]
    pub days: Vec<Weekday>,
    #[serde(with = "hhmm")]
    pub time_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub time_end: NaiveTime,
    #[serde(default = "default_recurring")]
    pub is_recurring: bool,
    #[serde(default)]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub car_type: Option<String>,
    #[serde(default)]
    pub seats: Option<u32>,
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    #[serde(default)]
    pub cleanliness: Option<u8>,
    #[serde(default)]
    pub cost_type: Option<CostType>,
    #[serde(default)]
    pub gender_preference: GenderPreference,
    #[validate(range(max = 80))]
    #[serde(default)]
    pub years_driving: Option<u32>,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_recurring() -> bool {
    true
}

/// Where a new ride goes when the poster leaves the destination blank.
#[derive(Debug, Clone)]
pub struct DefaultDestination<'a> {
    pub name: &'a str,
    pub coordinates: Coordinates,
}

impl NewRide {
    /// Validate cross-field rules and build the stored ride.
    ///
    /// `vehicle` must be the poster's vehicle for driver offers.
    pub fn into_ride(
        self,
        owner_id: &str,
        vehicle: Option<&Vehicle>,
        campus: DefaultDestination<'_>,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<Ride, AppError> {
        self.validate()?;

        if self.time_end <= self.time_start {
            return Err(AppError::Validation(
                "time_end: must be after time_start".to_string(),
            ));
        }

        let mut days = self.days.clone();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();

        let schedule = Schedule {
            days,
            time_start: self.time_start,
            time_end: self.time_end,
            is_recurring: self.is_recurring,
        };

        if schedule.is_recurring && schedule.days.is_empty() {
            return Err(AppError::Validation(
                "days: pick at least one day for a recurring ride".to_string(),
            ));
        }

        let departure_time = if schedule.is_recurring {
            None
        } else {
            let departure = match self.departure_time {
                Some(explicit) => explicit,
                None => schedule.next_occurrence(now, tz).ok_or_else(|| {
                    AppError::Validation(
                        "departure_time: required when no schedule days are given".to_string(),
                    )
                })?,
            };
            if departure <= now {
                return Err(AppError::Validation(
                    "departure_time: must be in the future".to_string(),
                ));
            }
            Some(departure)
        };

        let details = match self.ride_type {
            RideType::Driver => {
                let vehicle = vehicle.ok_or_else(|| {
                    AppError::Validation(
                        "You need to add a vehicle to your profile before offering rides"
                            .to_string(),
                    )
                })?;
                let seats = self.seats.ok_or_else(|| {
                    AppError::Validation("seats: required for driver offers".to_string())
                })?;
                if seats == 0 || seats > vehicle.capacity {
                    return Err(AppError::Validation(format!(
                        "seats: must be between 1 and {}",
                        vehicle.capacity
                    )));
                }
                RideDetails {
                    vehicle_id: Some(vehicle.id.clone()),
                    car_type: self
                        .car_type
                        .or_else(|| Some(format!("{} {}", vehicle.make, vehicle.model))),
                    seats: Some(seats),
                    cleanliness: self.cleanliness,
                    cost_type: self.cost_type,
                    gender_preference: self.gender_preference,
                    years_driving: self.years_driving,
                    notes: self.notes,
                }
            }
            RideType::Passenger => RideDetails {
                gender_preference: self.gender_preference,
                notes: self.notes,
                ..RideDetails::default()
            },
        };

        let destination = match self.destination.map(|d| d.trim().to_string()) {
            Some(address) if !address.is_empty() => Place {
                address,
                coordinates: self.destination_coordinates,
            },
            _ => Place {
                address: campus.name.to_string(),
                coordinates: Some(self.destination_coordinates.unwrap_or(campus.coordinates)),
            },
        };

        Ok(Ride {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            ride_type: self.ride_type,
            origin: Place {
                address: self.origin.trim().to_string(),
                coordinates: self.origin_coordinates,
            },
            destination,
            schedule,
            departure_time,
            details,
            status: RideStatus::Pending,
            passengers: Vec::new(),
            created_at: now,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn pacific() -> Tz {
        chrono_tz::America::Los_Angeles
    }

    /// Monday 2026-03-02 06:00 campus time.
    pub(crate) fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()
    }

    pub(crate) fn driver_ride(id: &str, seats: u32) -> Ride {
        Ride {
            id: id.to_string(),
            owner_id: "driver-1".to_string(),
            ride_type: RideType::Driver,
            origin: Place {
                address: "Irvine Spectrum".to_string(),
                coordinates: None,
            },
            destination: Place {
                address: "UCI Main Campus".to_string(),
                coordinates: None,
            },
            schedule: Schedule {
                days: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
                time_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                time_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                is_recurring: true,
            },
            departure_time: None,
            details: RideDetails {
                seats: Some(seats),
                ..RideDetails::default()
            },
            status: RideStatus::Pending,
            passengers: Vec::new(),
            created_at: monday_morning(),
        }
    }

    fn vehicle(capacity: u32) -> Vehicle {
        Vehicle {
            id: "veh-1".to_string(),
            owner_id: "driver-1".to_string(),
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            year: 2018,
            color: "Blue".to_string(),
            license_plate: "8ABC123".to_string(),
            capacity,
            created_at: monday_morning(),
        }
    }

    fn campus() -> DefaultDestination<'static> {
        DefaultDestination {
            name: "UCI Main Campus",
            coordinates: Coordinates {
                lng: -117.8443,
                lat: 33.6405,
            },
        }
    }

    fn new_driver_ride() -> NewRide {
        serde_json::from_value(serde_json::json!({
            "ride_type": "driver",
            "origin": "Irvine Spectrum",
            "days": ["Mon", "Wed", "Fri"],
            "time_start": "08:00",
            "time_end": "17:00",
            "seats": 3
        }))
        .unwrap()
    }

    #[test]
    fn test_next_occurrence_same_day_and_rollover() {
        let ride = driver_ride("r1", 3);
        let tz = pacific();

        // 06:00 Monday -> 08:00 Monday (16:00 UTC)
        let next = ride.next_departure(monday_morning(), tz).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap());

        // 09:00 Monday -> 08:00 Wednesday
        let later = Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap();
        let next = ride.next_departure(later, tz).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 4, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_in_daylight_time() {
        let ride = driver_ride("r1", 3);

        // Monday 2026-06-01 06:00 PDT -> 08:00 PDT (15:00 UTC)
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 13, 0, 0).unwrap();
        let next = ride.next_departure(now, pacific()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap());

        // Friday before the clocks change -> Monday after, on daylight time
        let friday_evening = Utc.with_ymd_and_hms(2026, 3, 7, 2, 0, 0).unwrap();
        let next = ride.next_departure(friday_evening, pacific()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 9, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_departure_on_respects_weekdays() {
        let ride = driver_ride("r1", 3);
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let wednesday = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();

        assert!(ride.departure_on(tuesday, pacific()).is_none());
        assert!(ride.departure_on(wednesday, pacific()).is_some());
    }

    #[test]
    fn test_available_seats_never_negative_or_above_total() {
        let mut ride = driver_ride("r1", 2);
        assert_eq!(ride.available_seats(), Some(2));

        for user in ["p1", "p2", "p3"] {
            ride.request_seat(user, monday_morning()).unwrap();
        }
        ride.confirm_passenger("p1", monday_morning()).unwrap();
        ride.confirm_passenger("p2", monday_morning()).unwrap();
        assert_eq!(ride.available_seats(), Some(0));

        assert_eq!(
            ride.confirm_passenger("p3", monday_morning()),
            Err(SeatError::Full)
        );
        assert_eq!(ride.confirmed_count(), 2);

        // Stored data that somehow exceeds the seat count still clamps at zero.
        ride.passengers[2].status = PassengerStatus::Confirmed;
        assert_eq!(ride.available_seats(), Some(0));
    }

    #[test]
    fn test_seat_request_rules() {
        let mut ride = driver_ride("r1", 2);
        assert_eq!(
            ride.request_seat("driver-1", monday_morning()),
            Err(SeatError::OwnRide)
        );
        ride.request_seat("p1", monday_morning()).unwrap();
        assert_eq!(
            ride.request_seat("p1", monday_morning()),
            Err(SeatError::DuplicateRequest)
        );
        assert_eq!(
            ride.confirm_passenger("ghost", monday_morning()),
            Err(SeatError::NoSuchRequest)
        );

        ride.ride_type = RideType::Passenger;
        assert_eq!(
            ride.request_seat("p2", monday_morning()),
            Err(SeatError::NotDriverRide)
        );
        assert_eq!(ride.available_seats(), None);
    }

    #[test]
    fn test_into_ride_requires_vehicle_for_driver() {
        let err = new_driver_ride()
            .into_ride("driver-1", None, campus(), pacific(), monday_morning())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let vehicle = vehicle(4);
        let ride = new_driver_ride()
            .into_ride("driver-1", Some(&vehicle), campus(), pacific(), monday_morning())
            .unwrap();
        assert_eq!(ride.total_seats(), Some(3));
        assert_eq!(ride.destination.address, "UCI Main Campus");
        assert_eq!(ride.details.vehicle_id.as_deref(), Some("veh-1"));
        assert_eq!(ride.details.car_type.as_deref(), Some("Honda Civic"));
    }

    #[test]
    fn test_into_ride_rejects_seats_over_capacity() {
        let vehicle = vehicle(2);
        let err = new_driver_ride()
            .into_ride("driver-1", Some(&vehicle), campus(), pacific(), monday_morning())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("seats")));
    }

    #[test]
    fn test_into_ride_one_off_uses_next_occurrence() {
        let mut request = new_driver_ride();
        request.is_recurring = false;
        request.days = vec![Weekday::Tue];

        let vehicle = vehicle(4);
        let ride = request
            .into_ride("driver-1", Some(&vehicle), campus(), pacific(), monday_morning())
            .unwrap();
        assert_eq!(
            ride.departure_time,
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 16, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_into_ride_rejects_inverted_times_and_empty_days() {
        let vehicle = vehicle(4);

        let mut inverted = new_driver_ride();
        inverted.time_end = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
        assert!(inverted
            .into_ride("driver-1", Some(&vehicle), campus(), pacific(), monday_morning())
            .is_err());

        let mut no_days = new_driver_ride();
        no_days.days.clear();
        assert!(no_days
            .into_ride("driver-1", Some(&vehicle), campus(), pacific(), monday_morning())
            .is_err());
    }
}
