//! Fleet error types

use thiserror::Error;

/// Errors surfaced to callers of the fleet subsystem.
///
/// Only malformed requests (unknown device or profile names passed
/// explicitly) produce hard errors; transient backend failures are folded
/// into degraded return values by the components themselves.
#[derive(Error, Debug, Clone)]
pub enum FleetError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Profile {profile} is not compatible with model {model}")]
    ProfileIncompatible { profile: String, model: String },
}

impl serde::Serialize for FleetError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
