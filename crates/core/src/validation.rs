use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::{RegistroPayload, Requerimiento};

/// `local@domain.tld` with no whitespace and a single `@`.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// First failing check of [`validate`]. `Display` is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Por favor, completa todos los campos requeridos")]
    MissingFields { fields: Vec<&'static str> },
    #[error("Por favor, ingresa un email válido")]
    InvalidEmail,
    #[error("Esperando ubicación GPS. Por favor, permite el acceso a tu ubicación.")]
    CoordinatesPending,
    #[error("La ubicación GPS está fuera de rango (lat {lat}, lng {lng})")]
    CoordinatesOutOfRange { lat: f64, lng: f64 },
}

impl ValidationError {
    /// Metrics/log label for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingFields { .. } => "missing_fields",
            Self::InvalidEmail => "invalid_email",
            Self::CoordinatesPending => "coordinates_pending",
            Self::CoordinatesOutOfRange { .. } => "coordinates_out_of_range",
        }
    }
}

/// Returns `true` when the address has the `local@domain.tld` shape.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

/// Checks the record in order: required fields, email shape, location fix.
///
/// Whitespace-only text counts as missing. On success the returned payload
/// carries the resolved coordinates and the email exactly as it was checked.
pub fn validate(record: &Requerimiento) -> Result<RegistroPayload, ValidationError> {
    let mut missing: Vec<&'static str> = record
        .text_fields()
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
    if record.agencies.is_empty() {
        missing.push("organismos_encargados");
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { fields: missing });
    }

    let email = record.email.trim();
    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail);
    }

    let coords = record.coords.ok_or(ValidationError::CoordinatesPending)?;
    if !coords.is_within_range() {
        return Err(ValidationError::CoordinatesOutOfRange {
            lat: coords.lat,
            lng: coords.lng,
        });
    }

    let mut accepted = record.clone();
    accepted.email = email.to_string();
    Ok(RegistroPayload::new(accepted, coords))
}
