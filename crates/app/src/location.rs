use async_trait::async_trait;
use thiserror::Error;

use requerimiento_core::Coordinates;

/// Failure of a single location request. `Display` is the user-facing alert.
///
/// A denied permission and a position that could not be produced (timeout,
/// no signal) share one alert; they differ only in [`LocationError::kind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("No se pudo obtener la ubicación GPS. Por favor, habilita los permisos de ubicación.")]
    PermissionDenied,
    #[error("No se pudo obtener la ubicación GPS. Por favor, habilita los permisos de ubicación.")]
    Unavailable,
    #[error("Tu navegador no soporta geolocalización")]
    Unsupported,
}

impl LocationError {
    /// Log label for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::Unavailable => "unavailable",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Source of the device position.
///
/// Each call is one independent request: no polling and no cached fix.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Position known ahead of time, e.g. passed on the command line.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// Device without a location capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unsupported)
    }
}
