// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Zotpool: carpool matchmaking for a single university campus
//!
//! This crate provides the backend API: institution-only magic-link
//! sign-in, the onboarding wizard, vehicles, ride posts, ride search with
//! compatibility scores, seat booking and route previews.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{DirectionsService, Mailer, SignInService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub sign_in: SignInService,
    pub directions: DirectionsService,
}

impl AppState {
    /// Wire services over an existing store.
    pub fn new(config: Config, db: Database, mailer: Mailer) -> error::Result<Self> {
        let sign_in = SignInService::new(&config, db.clone(), mailer);
        let directions = DirectionsService::new(&config)?;
        Ok(Self {
            config,
            db,
            sign_in,
            directions,
        })
    }
}
