//! Device Backend Boundary
//!
//! Everything that touches a physical device goes through the
//! [`DeviceBackend`] trait: reachability queries, property reads, raw
//! metrics, reconnect commands and named operations. The fleet components
//! receive an `Arc<dyn DeviceBackend>` by constructor injection and never
//! talk to a transport directly, so the whole subsystem can be driven
//! against a scripted backend in tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::registry::DeviceType;

/// Errors raised at the backend boundary.
///
/// Per-call timeout behavior is the backend's responsibility; the fleet
/// layer only distinguishes "could not reach the device" from "the device
/// rejected or botched the command".
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Device not visible: {0}")]
    NotVisible(String),
}

/// Raw counters read from a device in one pass.
///
/// Battery and temperature are absent on devices that do not expose them
/// (e.g. emulators); all other fields are always reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMetrics {
    /// CPU usage percentage (0-100)
    pub cpu_usage: f64,
    /// Memory usage percentage (0-100)
    pub memory_usage: f64,
    /// Battery level percentage (0-100)
    #[serde(default)]
    pub battery_level: Option<f64>,
    /// Device temperature in °C
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Connection strength percentage (0-100)
    pub connection_strength: f64,
    /// Operation throughput (backend-defined unit)
    pub throughput: f64,
    /// Error rate (0.0-1.0)
    pub error_rate: f64,
}

/// Closed set of named operations the fleet can dispatch to a device.
///
/// Replaces call-by-name dispatch: batch execution and recovery both go
/// through this enum, and a backend implements exactly these commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOperation {
    /// Liveness ping
    Ping,
    /// Full device reboot
    Reboot,
    /// Re-establish the transport connection
    Reconnect,
    /// Restart running applications (recovery from resource starvation)
    RestartApplications,
}

impl DeviceOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Reboot => "reboot",
            Self::Reconnect => "reconnect",
            Self::RestartApplications => "restart_applications",
        }
    }
}

impl fmt::Display for DeviceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceOperation {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(Self::Ping),
            "reboot" => Ok(Self::Reboot),
            "reconnect" => Ok(Self::Reconnect),
            "restart_applications" => Ok(Self::RestartApplications),
            other => Err(BackendError::CommandFailed(format!(
                "Unknown operation: {}",
                other
            ))),
        }
    }
}

/// Low-level device control capability.
///
/// Implemented by an external collaborator (adb/usbmux bridge, lab
/// harness, ...). All calls may suspend on device I/O and are expected to
/// carry their own timeouts.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Set of device ids currently physically reachable for one family.
    async fn list_reachable(&self, device_type: DeviceType)
        -> Result<HashSet<String>, BackendError>;

    /// Identifying properties of a device (model name, OS version, ...).
    async fn read_properties(&self, device_id: &str)
        -> Result<HashMap<String, String>, BackendError>;

    /// Actively try to re-establish the connection to a device.
    /// `Ok(false)` means the attempt completed but the device stayed away.
    async fn attempt_reconnect(&self, device_id: &str) -> Result<bool, BackendError>;

    /// One-shot read of the device's raw resource counters.
    async fn read_metrics(&self, device_id: &str) -> Result<DeviceMetrics, BackendError>;

    /// Liveness probe; returns once the device answered.
    async fn probe(&self, device_id: &str) -> Result<(), BackendError>;

    /// Execute a named operation with free-form parameters.
    async fn invoke_operation(
        &self,
        device_id: &str,
        operation: DeviceOperation,
        params: &Value,
    ) -> Result<Value, BackendError>;

    /// Apply a single configuration setting to the device.
    async fn apply_setting(
        &self,
        device_id: &str,
        setting: &str,
        value: &Value,
    ) -> Result<(), BackendError>;

    /// Hardware model string, used for profile compatibility matching.
    async fn device_model(&self, device_id: &str) -> Result<String, BackendError>;
}
