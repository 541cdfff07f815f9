// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding step schemas and the profile patch payload.
//!
//! A patch is merged over the stored profile first; the merged record is then
//! validated against the schema of the step the driver is trying to reach.

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::LazyLock;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::FieldError;
use crate::models::{DriverProfile, FINAL_STEP};
use crate::phone;

const PROVINCES: [&str; 13] = [
    "AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT",
];

const OLDEST_VEHICLE_YEAR: i32 = 1980;

static POSTAL_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[ABCEGHJ-NPRSTVXY]\d[ABCEGHJ-NPRSTV-Z][ -]?\d[ABCEGHJ-NPRSTV-Z]\d$")
        .expect("postal code regex is valid")
});

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if phone::is_canadian_phone(value) {
        Ok(())
    } else {
        Err(error("phone", "must be a Canadian phone number, e.g. 416-555-1234"))
    }
}

fn validate_province(value: &str) -> Result<(), ValidationError> {
    if PROVINCES.contains(&value.trim().to_ascii_uppercase().as_str()) {
        Ok(())
    } else {
        Err(error("province", "must be a two-letter Canadian province code"))
    }
}

fn validate_postal_code(value: &str) -> Result<(), ValidationError> {
    if POSTAL_CODE.is_match(value.trim()) {
        Ok(())
    } else {
        Err(error("postal_code", "must be a Canadian postal code, e.g. M5V 2T6"))
    }
}

fn validate_vehicle_year(value: &str) -> Result<(), ValidationError> {
    let latest = Utc::now().year() + 1;
    match value.trim().parse::<i32>() {
        Ok(year) if value.trim().len() == 4 && (OLDEST_VEHICLE_YEAR..=latest).contains(&year) => {
            Ok(())
        }
        _ => Err(error("vehicle_year", "must be a four-digit model year")),
    }
}

fn validate_must_be_true(value: &bool) -> Result<(), ValidationError> {
    if *value {
        Ok(())
    } else {
        Err(error("must_be_true", "must be confirmed"))
    }
}

// ─── Patch ───────────────────────────────────────────────────

/// Body of `PATCH /api/profile`.
///
/// Lifecycle fields (approval, verification, sync) are deliberately absent:
/// they only change through their own transitions.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    /// Step the driver is trying to reach. Absent for plain edits.
    #[validate(range(min = 2, max = 5, message = "must be between 2 and 5"))]
    pub onboarding_step: Option<u8>,

    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub payment_email: Option<String>,
    pub etransfer_auto_deposit_confirmed: Option<bool>,

    #[validate(length(max = 200))]
    pub address_line1: Option<String>,
    #[validate(length(max = 200))]
    pub address_line2: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(custom(function = "validate_province"))]
    pub province: Option<String>,
    #[validate(custom(function = "validate_postal_code"))]
    pub postal_code: Option<String>,
    #[validate(length(max = 512))]
    pub place_id: Option<String>,

    #[validate(length(max = 50))]
    pub vehicle_make: Option<String>,
    #[validate(length(max = 50))]
    pub vehicle_model: Option<String>,
    #[validate(custom(function = "validate_vehicle_year"))]
    pub vehicle_year: Option<String>,
    #[validate(length(max = 30))]
    pub vehicle_color: Option<String>,
    #[validate(length(max = 12))]
    pub license_plate: Option<String>,
    #[validate(length(max = 2048))]
    pub vehicle_photo_url: Option<String>,
    #[validate(length(max = 2048))]
    pub license_photo_url: Option<String>,

    pub agreement_signed: Option<bool>,
}

/// Replace `target` when the patch carries a value. Blank strings clear it.
fn merge(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        let v = v.trim();
        *target = (!v.is_empty()).then(|| v.to_string());
    }
}

impl ProfilePatch {
    /// Check the format of every field the patch carries.
    pub fn validate_formats(&self) -> Result<(), Vec<FieldError>> {
        self.validate().map_err(|e| field_errors(&e))
    }

    /// Copy the carried fields onto `profile`. Lifecycle fields other than
    /// `agreementSigned` are left alone.
    pub fn merge_into(&self, profile: &mut DriverProfile) {
        merge(&mut profile.first_name, &self.first_name);
        merge(&mut profile.last_name, &self.last_name);
        merge(&mut profile.email, &self.email);
        merge(&mut profile.phone, &self.phone);
        if let Some(dashed) = profile.phone.as_deref().and_then(phone::to_dashed) {
            profile.phone = Some(dashed);
        }
        merge(&mut profile.payment_email, &self.payment_email);
        if let Some(confirmed) = self.etransfer_auto_deposit_confirmed {
            profile.etransfer_auto_deposit_confirmed = confirmed;
        }

        merge(&mut profile.address_line1, &self.address_line1);
        merge(&mut profile.address_line2, &self.address_line2);
        merge(&mut profile.city, &self.city);
        merge(&mut profile.province, &self.province.as_ref().map(|p| p.to_ascii_uppercase()));
        merge(&mut profile.postal_code, &self.postal_code.as_ref().map(|p| p.to_ascii_uppercase()));
        merge(&mut profile.place_id, &self.place_id);

        merge(&mut profile.vehicle_make, &self.vehicle_make);
        merge(&mut profile.vehicle_model, &self.vehicle_model);
        merge(&mut profile.vehicle_year, &self.vehicle_year);
        merge(&mut profile.vehicle_color, &self.vehicle_color);
        merge(&mut profile.license_plate, &self.license_plate);
        merge(&mut profile.vehicle_photo_url, &self.vehicle_photo_url);
        merge(&mut profile.license_photo_url, &self.license_photo_url);

        // Signing is one-way; an unsigned value never clears a recorded signature.
        if self.agreement_signed == Some(true) {
            profile.agreement_signed = true;
        }
    }
}

// ─── Step schemas ────────────────────────────────────────────

/// Step 2: personal and payment details.
#[derive(Debug, Validate)]
struct PersonalInfoStep {
    #[validate(length(min = 1, message = "is required"))]
    first_name: String,
    #[validate(length(min = 1, message = "is required"))]
    last_name: String,
    #[validate(email(message = "must be a valid email address"))]
    email: String,
    #[validate(custom(function = "validate_phone"))]
    phone: String,
    #[validate(email(message = "must be a valid email address"))]
    payment_email: String,
    #[validate(custom(function = "validate_must_be_true"))]
    etransfer_auto_deposit_confirmed: bool,
}

/// Step 3: home address.
#[derive(Debug, Validate)]
struct AddressStep {
    #[validate(length(min = 1, message = "is required"))]
    address_line1: String,
    #[validate(length(min = 1, message = "is required"))]
    city: String,
    #[validate(custom(function = "validate_province"))]
    province: String,
    #[validate(custom(function = "validate_postal_code"))]
    postal_code: String,
    #[validate(length(min = 1, message = "is required"))]
    place_id: String,
}

/// Step 4: vehicle details and photos.
#[derive(Debug, Validate)]
struct VehicleStep {
    #[validate(length(min = 1, message = "is required"))]
    vehicle_make: String,
    #[validate(length(min = 1, message = "is required"))]
    vehicle_model: String,
    #[validate(custom(function = "validate_vehicle_year"))]
    vehicle_year: String,
    #[validate(length(min = 1, message = "is required"))]
    vehicle_color: String,
    #[validate(length(min = 1, message = "is required"))]
    license_plate: String,
    #[validate(length(min = 1, message = "is required"))]
    vehicle_photo_url: String,
    #[validate(length(min = 1, message = "is required"))]
    license_photo_url: String,
}

/// Step 5: signed driver agreement.
#[derive(Debug, Validate)]
struct AgreementStep {
    #[validate(custom(function = "validate_must_be_true"))]
    agreement_signed: bool,
}

fn field(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Validate `profile` (already merged with the patch) against the schema of
/// `step`. Only the target step is checked; earlier steps are not assumed.
pub fn validate_step(step: u8, profile: &DriverProfile) -> Result<(), Vec<FieldError>> {
    let result = match step {
        2 => PersonalInfoStep {
            first_name: field(&profile.first_name),
            last_name: field(&profile.last_name),
            email: field(&profile.email),
            phone: field(&profile.phone),
            payment_email: field(&profile.payment_email),
            etransfer_auto_deposit_confirmed: profile.etransfer_auto_deposit_confirmed,
        }
        .validate(),
        3 => AddressStep {
            address_line1: field(&profile.address_line1),
            city: field(&profile.city),
            province: field(&profile.province),
            postal_code: field(&profile.postal_code),
            place_id: field(&profile.place_id),
        }
        .validate(),
        4 => VehicleStep {
            vehicle_make: field(&profile.vehicle_make),
            vehicle_model: field(&profile.vehicle_model),
            vehicle_year: field(&profile.vehicle_year),
            vehicle_color: field(&profile.vehicle_color),
            license_plate: field(&profile.license_plate),
            vehicle_photo_url: field(&profile.vehicle_photo_url),
            license_photo_url: field(&profile.license_photo_url),
        }
        .validate(),
        FINAL_STEP => AgreementStep {
            agreement_signed: profile.agreement_signed,
        }
        .validate(),
        _ => {
            return Err(vec![FieldError::new(
                "onboardingStep",
                "must be between 2 and 5",
            )])
        }
    };

    result.map_err(|e| field_errors(&e))
}

/// Flatten validator output into one error per field, camelCased, sorted.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .map(|(name, errs)| {
            let message = errs
                .first()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("is invalid ({})", e.code))
                })
                .unwrap_or_else(|| "is invalid".to_string());
            FieldError::new(&to_camel_case(name), &message)
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn to_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
