//! Form validation.
//!
//! Every check here runs before a request is built, so rejected input never
//! reaches the server. Lengths are counted in characters, not bytes, so that
//! non-Latin names are measured the way users type them.

use std::fmt;

use crate::types::{Email, EmailError};

/// Minimum characters in a display name.
pub const MIN_NAME_CHARS: usize = 2;
/// Minimum characters in a password.
pub const MIN_PASSWORD_CHARS: usize = 8;
/// Smallest class capacity offered when creating a class.
pub const MIN_CLASS_CAPACITY: u32 = 1;
/// Largest class capacity offered when creating a class.
pub const MAX_CLASS_CAPACITY: u32 = 30;

/// The form field a [`ValidationError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Email,
    Password,
    Title,
    Capacity,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Password => "password",
            Self::Title => "title",
            Self::Capacity => "capacity",
        };
        f.write_str(name)
    }
}

/// Why a field was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    #[error("must be at least {min} characters")]
    TooShort { min: usize },
    #[error("must not be empty")]
    Empty,
    #[error("must be between {min} and {max}")]
    OutOfRange { min: u32, max: u32 },
    #[error(transparent)]
    InvalidEmail(#[from] EmailError),
}

/// Client-side rejection of a single form field.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: ValidationReason,
}

impl ValidationError {
    #[must_use]
    pub const fn new(field: Field, reason: ValidationReason) -> Self {
        Self { field, reason }
    }
}

/// Check a display name.
///
/// # Errors
///
/// Returns an error if the trimmed name is shorter than [`MIN_NAME_CHARS`].
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    check_min_chars(Field::Name, name.trim(), MIN_NAME_CHARS)
}

/// Check and parse an email address.
///
/// # Errors
///
/// Returns an error if the address does not parse as an [`Email`].
pub fn validate_email(email: &str) -> Result<Email, ValidationError> {
    Email::parse(email.trim()).map_err(|e| ValidationError::new(Field::Email, e.into()))
}

/// Check a password.
///
/// # Errors
///
/// Returns an error if the password is shorter than [`MIN_PASSWORD_CHARS`].
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    check_min_chars(Field::Password, password, MIN_PASSWORD_CHARS)
}

/// Check a class title.
///
/// # Errors
///
/// Returns an error if the title is blank.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::new(Field::Title, ValidationReason::Empty));
    }
    Ok(())
}

/// Check a class capacity.
///
/// # Errors
///
/// Returns an error unless `capacity` is within
/// [`MIN_CLASS_CAPACITY`]..=[`MAX_CLASS_CAPACITY`].
pub fn validate_capacity(capacity: u32) -> Result<(), ValidationError> {
    if (MIN_CLASS_CAPACITY..=MAX_CLASS_CAPACITY).contains(&capacity) {
        Ok(())
    } else {
        Err(ValidationError::new(
            Field::Capacity,
            ValidationReason::OutOfRange {
                min: MIN_CLASS_CAPACITY,
                max: MAX_CLASS_CAPACITY,
            },
        ))
    }
}

/// Validate the sign-up form, reporting the first invalid field in form order.
///
/// # Errors
///
/// Returns the first failing field's [`ValidationError`].
pub fn validate_signup(name: &str, email: &str, password: &str) -> Result<Email, ValidationError> {
    validate_name(name)?;
    let email = validate_email(email)?;
    validate_password(password)?;
    Ok(email)
}

/// Validate the login form.
///
/// # Errors
///
/// Returns the first failing field's [`ValidationError`].
pub fn validate_login(email: &str, password: &str) -> Result<Email, ValidationError> {
    let email = validate_email(email)?;
    validate_password(password)?;
    Ok(email)
}

fn check_min_chars(field: Field, value: &str, min: usize) -> Result<(), ValidationError> {
    if value.chars().count() < min {
        return Err(ValidationError::new(field, ValidationReason::TooShort { min }));
    }
    Ok(())
}
