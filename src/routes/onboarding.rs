// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding wizard routes.
//!
//! The wizard state travels with each request; the server validates the
//! submitted step, moves the wizard and persists the profile on completion.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{OnboardingWizard, StepInput, Transition, User};
use crate::routes::api::current_user;
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/onboarding", get(start).post(advance))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardAction {
    Next,
    Back,
}

#[derive(Debug, Deserialize)]
pub struct WizardRequest {
    pub wizard: OnboardingWizard,
    /// Fields for the wizard's current step, if changed
    #[serde(default)]
    pub input: Option<StepInput>,
    pub action: WizardAction,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WizardResponse {
    InProgress { wizard: OnboardingWizard },
    Completed { user: User },
}

async fn start(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<OnboardingWizard>> {
    let user = current_user(&state, &auth).await?;
    ensure_not_onboarded(&user)?;
    Ok(Json(OnboardingWizard::start(&user)))
}

async fn advance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<WizardRequest>,
) -> Result<Json<WizardResponse>> {
    let mut user = current_user(&state, &auth).await?;
    ensure_not_onboarded(&user)?;

    let mut wizard = request.wizard;
    if let Some(input) = request.input {
        wizard.update(input)?;
    }

    match request.action {
        WizardAction::Back => {
            wizard.back();
            Ok(Json(WizardResponse::InProgress { wizard }))
        }
        WizardAction::Next => match wizard.next()? {
            Transition::Advanced => {
                tracing::debug!(user_id = %user.id, step = %wizard.step, "Onboarding advanced");
                Ok(Json(WizardResponse::InProgress { wizard }))
            }
            Transition::Completed(profile) => {
                profile.apply_to(&mut user, Utc::now());
                state.db.save_user(&user).await?;
                tracing::info!(user_id = %user.id, role = ?user.role, "Onboarding completed");
                Ok(Json(WizardResponse::Completed { user }))
            }
        },
    }
}

fn ensure_not_onboarded(user: &User) -> Result<()> {
    if user.onboarded {
        return Err(AppError::Conflict("onboarding already completed".to_string()));
    }
    Ok(())
}
