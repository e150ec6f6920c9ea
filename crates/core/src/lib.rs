//! Domain types for citizen-service request ("requerimiento") submission.

pub mod audio;
pub mod types;
pub mod validation;

pub use audio::{AudioAttachment, AudioError, AudioMediaType};
pub use types::{Coordinates, RegistroPayload, Requerimiento, AVAILABLE_AGENCIES};
pub use validation::{is_valid_email, validate, ValidationError};
