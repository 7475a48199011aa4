//! Automatic Device Recovery
//!
//! Consumes health-check output and issues corrective backend commands
//! with a per-device escalation cap. Recovery triggers are additive: a
//! device can be resource-starved and weakly connected at the same time,
//! in which case both actions fire in one pass.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::backend::{DeviceBackend, DeviceOperation};
use crate::error::FleetError;
use crate::health::{HealthMonitor, HealthSnapshot, HealthStatus};

/// Auto-recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Recovery attempts per device before it is reported as exhausted
    pub max_attempts: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Escalation-limited recovery driver
pub struct AutoRecovery {
    health: Arc<HealthMonitor>,
    backend: Arc<dyn DeviceBackend>,
    config: RecoveryConfig,
    attempts: DashMap<String, u32>,
}

impl AutoRecovery {
    pub fn new(health: Arc<HealthMonitor>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self::with_config(health, backend, RecoveryConfig::default())
    }

    pub fn with_config(
        health: Arc<HealthMonitor>,
        backend: Arc<dyn DeviceBackend>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            health,
            backend,
            config,
            attempts: DashMap::new(),
        }
    }

    /// Recovery attempts recorded for a device since its last healthy check
    pub fn attempts(&self, device_id: &str) -> u32 {
        self.attempts.get(device_id).map(|v| *v).unwrap_or(0)
    }

    /// External reset of the escalation counter
    pub fn reset(&self, device_id: &str) {
        self.attempts.insert(device_id.to_string(), 0);
    }

    /// Check health and attempt recovery if needed.
    ///
    /// Returns `Ok(true)` when the device is healthy or a recovery pass
    /// completed without a failing action, `Ok(false)` when attempts are
    /// exhausted or an action failed. The attempt is counted either way.
    pub async fn check_and_recover(&self, device_id: &str) -> Result<bool, FleetError> {
        let snapshot = self.health.check_health(device_id).await?;

        if snapshot.status == HealthStatus::Healthy {
            self.attempts.insert(device_id.to_string(), 0);
            return Ok(true);
        }

        if self.attempts(device_id) >= self.config.max_attempts {
            error!("Max recovery attempts reached for device {}", device_id);
            return Ok(false);
        }

        let actions = self.select_actions(&snapshot);
        let attempt = {
            let mut counter = self.attempts.entry(device_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        info!(
            "Recovery attempt {}/{} for device {}: {:?}",
            attempt, self.config.max_attempts, device_id, actions
        );

        let mut all_ok = true;
        for action in actions {
            if let Err(e) = self
                .backend
                .invoke_operation(device_id, action, &Value::Null)
                .await
            {
                warn!("Recovery action {} failed for {}: {}", action, device_id, e);
                all_ok = false;
            }
        }
        Ok(all_ok)
    }

    /// Additive trigger selection, sharing the health thresholds.
    fn select_actions(&self, snapshot: &HealthSnapshot) -> Vec<DeviceOperation> {
        let thresholds = self.health.thresholds();
        let mut actions = Vec::new();

        if snapshot.cpu_usage > thresholds.cpu_usage
            || snapshot.memory_usage > thresholds.memory_usage
        {
            actions.push(DeviceOperation::RestartApplications);
        }
        if snapshot.connection_strength < thresholds.connection_strength {
            actions.push(DeviceOperation::Reconnect);
        }
        if snapshot.status == HealthStatus::Error {
            actions.push(DeviceOperation::Reboot);
        }
        actions
    }
}
