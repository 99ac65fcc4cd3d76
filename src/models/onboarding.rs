// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding wizard: a linear, client-held state machine.
//!
//! The wizard is serialized to the client between requests. Every submitted
//! wizard is re-validated, so a client cannot skip a step by editing the
//! `step` field: `finish` checks the whole form, not only the last step.

use crate::error::AppError;
use crate::models::user::{User, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Wizard steps in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Identity,
    Commute,
    Academic,
    Social,
    Role,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 5] = [
        OnboardingStep::Identity,
        OnboardingStep::Commute,
        OnboardingStep::Academic,
        OnboardingStep::Social,
        OnboardingStep::Role,
    ];

    pub fn is_last(self) -> bool {
        self == OnboardingStep::Role
    }

    fn following(self) -> Option<Self> {
        Self::ALL.get(self as usize + 1).copied()
    }

    fn preceding(self) -> Option<Self> {
        (self as usize).checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OnboardingStep::Identity => "identity",
            OnboardingStep::Commute => "commute",
            OnboardingStep::Academic => "academic",
            OnboardingStep::Social => "social",
            OnboardingStep::Role => "role",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct IdentityInput {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub name: String,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub gender: Option<String>,
    #[validate(length(max = 30))]
    #[serde(default)]
    pub pronouns: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct CommuteInput {
    #[validate(length(max = 100))]
    #[serde(default)]
    pub city: Option<String>,
    #[validate(custom(function = "validate_zip_code"))]
    #[serde(default)]
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct AcademicInput {
    #[validate(length(max = 100))]
    #[serde(default)]
    pub major: Option<String>,
    #[validate(length(max = 30))]
    #[serde(default)]
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct SocialInput {
    #[validate(length(max = 50))]
    #[serde(default)]
    pub instagram: Option<String>,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub discord: Option<String>,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub linkedin: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct RoleInput {
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Fields submitted for one step, tagged with the step they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepInput {
    Identity(IdentityInput),
    Commute(CommuteInput),
    Academic(AcademicInput),
    Social(SocialInput),
    Role(RoleInput),
}

impl StepInput {
    pub fn step(&self) -> OnboardingStep {
        match self {
            StepInput::Identity(_) => OnboardingStep::Identity,
            StepInput::Commute(_) => OnboardingStep::Commute,
            StepInput::Academic(_) => OnboardingStep::Academic,
            StepInput::Social(_) => OnboardingStep::Social,
            StepInput::Role(_) => OnboardingStep::Role,
        }
    }

    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            StepInput::Identity(input) => input.validate(),
            StepInput::Commute(input) => input.validate(),
            StepInput::Academic(input) => input.validate(),
            StepInput::Social(input) => input.validate(),
            StepInput::Role(input) => input.validate(),
        }
    }
}

/// Everything collected so far; a superset of the profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OnboardingForm {
    #[serde(default)]
    pub identity: IdentityInput,
    #[serde(default)]
    pub commute: CommuteInput,
    #[serde(default)]
    pub academic: AcademicInput,
    #[serde(default)]
    pub social: SocialInput,
    #[serde(default)]
    pub role: RoleInput,
}

impl OnboardingForm {
    fn input_for(&self, step: OnboardingStep) -> StepInput {
        match step {
            OnboardingStep::Identity => StepInput::Identity(self.identity.clone()),
            OnboardingStep::Commute => StepInput::Commute(self.commute.clone()),
            OnboardingStep::Academic => StepInput::Academic(self.academic.clone()),
            OnboardingStep::Social => StepInput::Social(self.social.clone()),
            OnboardingStep::Role => StepInput::Role(self.role.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OnboardingError {
    #[error("Input for step '{got}' submitted while on step '{expected}'")]
    WrongStep {
        expected: OnboardingStep,
        got: OnboardingStep,
    },
    #[error("{step}: {message}")]
    Invalid {
        step: OnboardingStep,
        message: String,
    },
    #[error("Choose how you want to participate before finishing")]
    RoleRequired,
    #[error("Onboarding can only be finished from the last step")]
    NotLastStep,
}

impl From<OnboardingError> for AppError {
    fn from(err: OnboardingError) -> Self {
        match err {
            OnboardingError::WrongStep { .. } | OnboardingError::NotLastStep => {
                AppError::BadRequest(err.to_string())
            }
            OnboardingError::Invalid { .. } | OnboardingError::RoleRequired => {
                AppError::Validation(err.to_string())
            }
        }
    }
}

/// Result of `next`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Moved to the following step.
    Advanced,
    /// The last step was submitted; the profile is ready to persist.
    Completed(CompletedProfile),
}

/// Wizard state: current step plus accumulated form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingWizard {
    pub step: OnboardingStep,
    #[serde(default)]
    pub form: OnboardingForm,
}

impl OnboardingWizard {
    /// Fresh wizard with the display name prefilled.
    pub fn start(user: &User) -> Self {
        let mut form = OnboardingForm::default();
        form.identity.name = user.name.clone();
        form.identity.gender = user.gender.clone();
        form.identity.pronouns = user.pronouns.clone();
        Self {
            step: OnboardingStep::Identity,
            form,
        }
    }

    /// Store the current step's fields.
    pub fn update(&mut self, input: StepInput) -> Result<(), OnboardingError> {
        if input.step() != self.step {
            return Err(OnboardingError::WrongStep {
                expected: self.step,
                got: input.step(),
            });
        }
        let input = normalize(input);
        check(&input)?;

        match input {
            StepInput::Identity(v) => self.form.identity = v,
            StepInput::Commute(v) => self.form.commute = v,
            StepInput::Academic(v) => self.form.academic = v,
            StepInput::Social(v) => self.form.social = v,
            StepInput::Role(v) => self.form.role = v,
        }
        Ok(())
    }

    /// Validate the current step and advance; on the last step, finish.
    pub fn next(&mut self) -> Result<Transition, OnboardingError> {
        check(&self.form.input_for(self.step))?;
        match self.step.following() {
            Some(step) => {
                self.step = step;
                Ok(Transition::Advanced)
            }
            None => self.finish().map(Transition::Completed),
        }
    }

    /// Go back one step. Returns false on the first step.
    pub fn back(&mut self) -> bool {
        match self.step.preceding() {
            Some(step) => {
                self.step = step;
                true
            }
            None => false,
        }
    }

    /// Produce the full profile. Leaves the wizard untouched on error.
    pub fn finish(&self) -> Result<CompletedProfile, OnboardingError> {
        if !self.step.is_last() {
            return Err(OnboardingError::NotLastStep);
        }
        let role = self.form.role.role.ok_or(OnboardingError::RoleRequired)?;
        for step in OnboardingStep::ALL {
            check(&normalize(self.form.input_for(step)))?;
        }

        let form = &self.form;
        Ok(CompletedProfile {
            name: form.identity.name.trim().to_string(),
            gender: clean(&form.identity.gender),
            pronouns: clean(&form.identity.pronouns),
            city: clean(&form.commute.city),
            zip_code: clean(&form.commute.zip_code),
            major: clean(&form.academic.major),
            year: clean(&form.academic.year),
            instagram: clean(&form.social.instagram),
            discord: clean(&form.social.discord),
            linkedin: clean(&form.social.linkedin),
            phone: clean(&form.social.phone),
            role,
        })
    }
}

/// Every field collected by the wizard, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedProfile {
    pub name: String,
    pub gender: Option<String>,
    pub pronouns: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub major: Option<String>,
    pub year: Option<String>,
    pub instagram: Option<String>,
    pub discord: Option<String>,
    pub linkedin: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
}

impl CompletedProfile {
    /// Copy the profile onto `user` and mark onboarding complete.
    pub fn apply_to(self, user: &mut User, now: DateTime<Utc>) {
        user.name = self.name;
        user.gender = self.gender;
        user.pronouns = self.pronouns;
        user.city = self.city;
        user.zip_code = self.zip_code;
        user.major = self.major;
        user.year = self.year;
        user.instagram = self.instagram;
        user.discord = self.discord;
        user.linkedin = self.linkedin;
        user.phone = self.phone;
        user.role = Some(self.role);
        user.onboarded = true;
        user.updated_at = now;
    }
}

fn check(input: &StepInput) -> Result<(), OnboardingError> {
    input.validate().map_err(|errors| OnboardingError::Invalid {
        step: input.step(),
        message: crate::error::describe_validation_errors(&errors),
    })
}

/// Trim text fields and turn blanks into `None`.
fn normalize(input: StepInput) -> StepInput {
    match input {
        StepInput::Identity(v) => StepInput::Identity(IdentityInput {
            name: v.name.trim().to_string(),
            gender: clean(&v.gender),
            pronouns: clean(&v.pronouns),
        }),
        StepInput::Commute(v) => StepInput::Commute(CommuteInput {
            city: clean(&v.city),
            zip_code: clean(&v.zip_code),
        }),
        StepInput::Academic(v) => StepInput::Academic(AcademicInput {
            major: clean(&v.major),
            year: clean(&v.year),
        }),
        StepInput::Social(v) => StepInput::Social(SocialInput {
            instagram: clean(&v.instagram),
            discord: clean(&v.discord),
            linkedin: clean(&v.linkedin),
            phone: clean(&v.phone),
        }),
        role @ StepInput::Role(_) => role,
    }
}

pub(crate) fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn validate_zip_code(zip: &str) -> Result<(), ValidationError> {
    if zip.len() == 5 && zip.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("zip_code").with_message("must be 5 digits".into()))
    }
}

pub(crate) fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
    if allowed && (7..=20).contains(&phone.len()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone").with_message("is not a valid phone number".into()))
    }
}
