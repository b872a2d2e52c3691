use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use crate::models::{age_on, FamilyMemberData, PatientError};

pub const MIN_AGE: i32 = 0;
pub const MAX_AGE: i32 = 120;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(EMAIL_PATTERN)
                .map_err(|e| warn!("Email pattern failed to compile: {}", e))
                .ok()
        })
        .as_ref()
}

/// Without a compiled pattern no address is accepted.
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_some_and(|regex| regex.is_match(email.trim()))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Every problem with `data`, in field order. Empty means valid.
pub fn family_member_errors(data: &FamilyMemberData, today: NaiveDate) -> Vec<String> {
    let mut errors = Vec::new();

    if data.name.trim().is_empty() {
        errors.push("name is required".to_string());
    }
    if data.relationship.trim().is_empty() {
        errors.push("relationship is required".to_string());
    }
    match data.details.date_of_birth {
        None => errors.push("date_of_birth is required".to_string()),
        Some(dob) => {
            let age = age_on(dob, today);
            if !(MIN_AGE..=MAX_AGE).contains(&age) {
                errors.push(format!(
                    "age must be between {} and {} years (got {})",
                    MIN_AGE, MAX_AGE, age
                ));
            }
        }
    }
    if is_blank(data.details.gender.as_deref()) {
        errors.push("gender is required".to_string());
    }
    if let Some(email) = data.details.email.as_deref().filter(|e| !e.trim().is_empty()) {
        if !is_valid_email(email) {
            errors.push(format!("email '{}' is not valid", email));
        }
    }

    errors
}

pub fn validate_family_member_data(data: &FamilyMemberData, today: NaiveDate) -> Result<(), PatientError> {
    let errors = family_member_errors(data, today);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PatientError::Validation(errors.join("; ")))
    }
}

pub fn validate_patient_name(name: &str) -> Result<(), PatientError> {
    if name.trim().is_empty() {
        return Err(PatientError::Validation("name is required".to_string()));
    }
    Ok(())
}

pub fn validate_optional_email(email: Option<&str>) -> Result<(), PatientError> {
    match email.filter(|e| !e.trim().is_empty()) {
        Some(email) if !is_valid_email(email) => Err(PatientError::Validation(format!(
            "email '{}' is not valid",
            email
        ))),
        _ => Ok(()),
    }
}
