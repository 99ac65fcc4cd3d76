// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod onboarding;
pub mod ride;
pub mod user;
pub mod vehicle;

pub use onboarding::{OnboardingStep, OnboardingWizard, StepInput, Transition};
pub use ride::{
    Coordinates, CostType, NewRide, PassengerStatus, Place, Ride, RideDetails, RidePassenger,
    RideStatus, RideType, Schedule, SeatError,
};
pub use user::{GenderPreference, User, UserRole};
pub use vehicle::{NewVehicle, Vehicle};
