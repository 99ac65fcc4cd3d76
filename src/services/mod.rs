// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod directions;
pub mod mailer;
pub mod search;
pub mod sign_in;

pub use directions::{DirectionsService, MapboxClient, PreviewRequest, RoutePreview};
pub use mailer::Mailer;
pub use search::{RideMatch, SearchCriteria};
pub use sign_in::SignInService;
