use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_WATTAGE: f64 = 100_000.0;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Validation error type
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Validation error for field '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a display name (home, device, template, rule).
/// Trimmed length 1-100 characters, no control characters.
pub fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, "Name cannot be empty"));
    }

    let length = trimmed.chars().count();
    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::new(
            field,
            format!(
                "Name length {} exceeds maximum of {} characters",
                length, MAX_NAME_LENGTH
            ),
        ));
    }

    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::new(
            field,
            "Name must not contain control characters",
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

    if email.len() <= 254 && regex.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::new("email", "Email address is not valid"))
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            "password",
            format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ),
        ));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            "password",
            format!(
                "Password must be at most {} characters",
                MAX_PASSWORD_LENGTH
            ),
        ));
    }
    Ok(())
}

/// Validate rated power in watts: finite, within [0, 100000]
pub fn validate_wattage(field: &str, wattage: f64) -> Result<(), ValidationError> {
    if !wattage.is_finite() || !(0.0..=MAX_WATTAGE).contains(&wattage) {
        return Err(ValidationError::new(
            field,
            format!("Wattage must be between 0 and {}", MAX_WATTAGE),
        ));
    }
    Ok(())
}

pub fn validate_positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new(field, "Value must be a positive number"))
    }
}

pub fn validate_non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            "Value must be a non-negative number",
        ))
    }
}

/// Alert threshold percentage: (0, 1000]
pub fn validate_threshold_pct(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 && value <= 1000.0 {
        Ok(())
    } else {
        Err(ValidationError::new(
            "threshold_pct",
            "Threshold must be greater than 0 and at most 1000 percent",
        ))
    }
}
