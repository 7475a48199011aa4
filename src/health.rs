//! Device Health Monitoring
//!
//! Classifies live device metrics against configurable thresholds and
//! keeps a bounded rolling history per device. Backend failures never
//! propagate as errors from a health check: they become an Error snapshot
//! with sentinel values, so monitoring loops built on top can treat every
//! call uniformly.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::backend::{DeviceBackend, DeviceMetrics};
use crate::error::FleetError;
use crate::registry::DeviceRegistry;

/// Maximum health snapshots retained per device (FIFO ring)
const HISTORY_CAPACITY: usize = 100;

/// Device health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// All present metrics within thresholds
    #[default]
    Healthy,
    /// At least one present metric beyond its threshold
    Warning,
    /// The metrics read itself failed
    Error,
}

/// Alert thresholds for health classification.
///
/// Battery and connection strength are floors (alert below), the rest are
/// ceilings (alert above).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub battery_level: f64,
    pub temperature: f64,
    pub connection_strength: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cpu_usage: 90.0,
            memory_usage: 90.0,
            battery_level: 15.0,
            temperature: 45.0,
            connection_strength: 30.0,
        }
    }
}

impl HealthThresholds {
    /// Warning iff at least one present metric is beyond its threshold.
    fn classify(&self, metrics: &DeviceMetrics) -> HealthStatus {
        let mut warning = metrics.cpu_usage > self.cpu_usage
            || metrics.memory_usage > self.memory_usage
            || metrics.connection_strength < self.connection_strength;

        if let Some(battery) = metrics.battery_level {
            warning = warning || battery < self.battery_level;
        }
        if let Some(temperature) = metrics.temperature {
            warning = warning || temperature > self.temperature;
        }

        if warning {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Point-in-time health read of one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub device_id: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub battery_level: Option<f64>,
    pub temperature: Option<f64>,
    pub connection_strength: f64,
    pub status: HealthStatus,
    pub last_error: Option<String>,
}

impl HealthSnapshot {
    /// Worst-case snapshot for a failed metrics read.
    fn failed(device_id: &str, error: String) -> Self {
        Self {
            device_id: device_id.to_string(),
            cpu_usage: 0.0,
            memory_usage: 0.0,
            battery_level: None,
            temperature: None,
            connection_strength: 0.0,
            status: HealthStatus::Error,
            last_error: Some(error),
        }
    }
}

/// Health monitor with per-device bounded history
pub struct HealthMonitor {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
    thresholds: HealthThresholds,
    history: DashMap<String, VecDeque<HealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<DeviceRegistry>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self::with_thresholds(registry, backend, HealthThresholds::default())
    }

    pub fn with_thresholds(
        registry: Arc<DeviceRegistry>,
        backend: Arc<dyn DeviceBackend>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            registry,
            backend,
            thresholds,
            history: DashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Check health of one device.
    ///
    /// Errs only for ids absent from the registry. A failed metrics read
    /// is reported inside the snapshot (status Error, sentinel values),
    /// which is still appended to history.
    pub async fn check_health(&self, device_id: &str) -> Result<HealthSnapshot, FleetError> {
        if !self.registry.contains(device_id) {
            return Err(FleetError::DeviceNotFound(device_id.to_string()));
        }

        let snapshot = match self.backend.read_metrics(device_id).await {
            Ok(metrics) => HealthSnapshot {
                device_id: device_id.to_string(),
                cpu_usage: metrics.cpu_usage,
                memory_usage: metrics.memory_usage,
                battery_level: metrics.battery_level,
                temperature: metrics.temperature,
                connection_strength: metrics.connection_strength,
                status: self.thresholds.classify(&metrics),
                last_error: None,
            },
            Err(e) => {
                error!("Health check failed for device {}: {}", device_id, e);
                HealthSnapshot::failed(device_id, e.to_string())
            }
        };

        self.push_history(device_id, snapshot.clone());
        Ok(snapshot)
    }

    /// Health history for a device, oldest first
    pub fn history(&self, device_id: &str) -> Vec<HealthSnapshot> {
        self.history
            .get(device_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent snapshot for a device
    pub fn latest(&self, device_id: &str) -> Option<HealthSnapshot> {
        self.history
            .get(device_id)
            .and_then(|ring| ring.back().cloned())
    }

    fn push_history(&self, device_id: &str, snapshot: HealthSnapshot) {
        let mut ring = self
            .history
            .entry(device_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(HISTORY_CAPACITY));
        if ring.len() >= HISTORY_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceType;
    use crate::testing::{metrics, MockBackend};

    fn setup() -> (Arc<DeviceRegistry>, Arc<MockBackend>, HealthMonitor) {
        let registry = Arc::new(DeviceRegistry::new());
        let backend = Arc::new(MockBackend::new());
        registry.add_device("d1", DeviceType::Android, "Pixel", "12.0");
        let monitor = HealthMonitor::new(registry.clone(), backend.clone());
        (registry, backend, monitor)
    }

    #[tokio::test]
    async fn test_healthy_device() {
        let (_registry, backend, monitor) = setup();
        backend.set_metrics("d1", metrics(20.0, 40.0, 80.0));

        let snapshot = monitor.check_health("d1").await.unwrap();
        assert_eq!(snapshot.status, HealthStatus::Healthy);
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn test_high_cpu_is_warning() {
        let (_registry, backend, monitor) = setup();
        backend.set_metrics("d1", metrics(95.0, 50.0, 80.0));

        let snapshot = monitor.check_health("d1").await.unwrap();
        assert_eq!(snapshot.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_weak_connection_is_warning() {
        let (_registry, backend, monitor) = setup();
        backend.set_metrics("d1", metrics(10.0, 10.0, 20.0));

        let snapshot = monitor.check_health("d1").await.unwrap();
        assert_eq!(snapshot.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_low_battery_is_warning() {
        let (_registry, backend, monitor) = setup();
        let mut m = metrics(10.0, 10.0, 90.0);
        m.battery_level = Some(10.0);
        backend.set_metrics("d1", m);

        let snapshot = monitor.check_health("d1").await.unwrap();
        assert_eq!(snapshot.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_full_battery_is_not_warning() {
        let (_registry, backend, monitor) = setup();
        let mut m = metrics(10.0, 10.0, 90.0);
        m.battery_level = Some(100.0);
        m.temperature = Some(30.0);
        backend.set_metrics("d1", m);

        let snapshot = monitor.check_health("d1").await.unwrap();
        assert_eq!(snapshot.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failed_metrics_read_yields_error_snapshot() {
        let (_registry, backend, monitor) = setup();
        backend.fail_metrics("d1");

        let snapshot = monitor.check_health("d1").await.unwrap();
        assert_eq!(snapshot.status, HealthStatus::Error);
        assert_eq!(snapshot.cpu_usage, 0.0);
        assert_eq!(snapshot.connection_strength, 0.0);
        assert!(!snapshot.last_error.as_deref().unwrap_or_default().is_empty());
        // Error snapshots are recorded too
        assert_eq!(monitor.history("d1").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let (_registry, _backend, monitor) = setup();
        assert!(matches!(
            monitor.check_health("ghost").await,
            Err(FleetError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_warning_then_error_scenario() {
        let (_registry, backend, monitor) = setup();
        backend.set_metrics("d1", metrics(95.0, 50.0, 80.0));
        let first = monitor.check_health("d1").await.unwrap();
        assert_eq!(first.status, HealthStatus::Warning);

        backend.fail_metrics("d1");
        let second = monitor.check_health("d1").await.unwrap();
        assert_eq!(second.status, HealthStatus::Error);
        assert!(second.last_error.is_some());
        assert_eq!(second.cpu_usage, 0.0);
    }

    #[tokio::test]
    async fn test_history_bounded_at_capacity() {
        let (_registry, backend, monitor) = setup();
        for i in 0..205u32 {
            backend.set_metrics("d1", metrics(i as f64 % 100.0, 10.0, 80.0));
            monitor.check_health("d1").await.unwrap();
        }

        let history = monitor.history("d1");
        assert_eq!(history.len(), 100);
        // Entries are the most recent 100 (calls 105..=204)
        assert_eq!(history[0].cpu_usage, 105.0 % 100.0);
        assert_eq!(history[99].cpu_usage, 204.0 % 100.0);
        assert_eq!(monitor.latest("d1").unwrap().cpu_usage, 204.0 % 100.0);
    }
}
