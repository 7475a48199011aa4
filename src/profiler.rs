//! Performance Profiler
//!
//! Samples response time, throughput and error rate for a device and
//! retains a bounded per-device history. Mirrors the health monitor's
//! contract: a backend failure degrades the sample to worst-case values
//! instead of raising, so profiling loops survive flaky devices.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::backend::DeviceBackend;
use crate::error::FleetError;
use crate::registry::DeviceRegistry;

/// Maximum samples retained per device (FIFO ring)
const HISTORY_CAPACITY: usize = 1000;

/// Cadence of `start_profiling`
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// One profiling data point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub device_id: String,
    /// Round-trip time of a liveness probe, in seconds
    pub response_time: f64,
    pub throughput: f64,
    /// 0.0-1.0; 1.0 is the failure sentinel
    pub error_rate: f64,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceSample {
    /// Worst-case sample for a failed collection
    fn failed(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            response_time: 0.0,
            throughput: 0.0,
            error_rate: 1.0,
            timestamp: Utc::now(),
        }
    }
}

/// Sampling profiler with bounded per-device history
pub struct PerformanceProfiler {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
    history: DashMap<String, VecDeque<PerformanceSample>>,
}

impl PerformanceProfiler {
    pub fn new(registry: Arc<DeviceRegistry>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            registry,
            backend,
            history: DashMap::new(),
        }
    }

    /// Collect one sample: probe round trip plus a metrics read.
    ///
    /// Errs only for ids absent from the registry; backend failures yield
    /// a worst-case sample. Every sample is appended to history.
    pub async fn collect_sample(&self, device_id: &str) -> Result<PerformanceSample, FleetError> {
        if !self.registry.contains(device_id) {
            return Err(FleetError::DeviceNotFound(device_id.to_string()));
        }

        let sample = self.sample_once(device_id).await;
        self.push_history(device_id, sample.clone());
        Ok(sample)
    }

    /// Collect one sample per second for `duration`, returning the finite
    /// sequence bound to this call.
    pub async fn start_profiling(
        &self,
        device_id: &str,
        duration: Duration,
    ) -> Result<Vec<PerformanceSample>, FleetError> {
        if !self.registry.contains(device_id) {
            return Err(FleetError::DeviceNotFound(device_id.to_string()));
        }

        let sample_count = duration.as_secs().max(1);
        debug!(
            "Profiling device {} for {}s ({} samples)",
            device_id,
            duration.as_secs(),
            sample_count
        );

        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        let mut samples = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            interval.tick().await;
            let sample = self.sample_once(device_id).await;
            self.push_history(device_id, sample.clone());
            samples.push(sample);
        }
        Ok(samples)
    }

    /// Sample history for a device, oldest first
    pub fn history(&self, device_id: &str) -> Vec<PerformanceSample> {
        self.history
            .get(device_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn sample_once(&self, device_id: &str) -> PerformanceSample {
        let started = Instant::now();
        if let Err(e) = self.backend.probe(device_id).await {
            error!("Failed to collect metrics for device {}: {}", device_id, e);
            return PerformanceSample::failed(device_id);
        }
        let response_time = started.elapsed().as_secs_f64();

        match self.backend.read_metrics(device_id).await {
            Ok(metrics) => PerformanceSample {
                device_id: device_id.to_string(),
                response_time,
                throughput: metrics.throughput,
                error_rate: metrics.error_rate,
                timestamp: Utc::now(),
            },
            Err(e) => {
                error!("Failed to collect metrics for device {}: {}", device_id, e);
                PerformanceSample::failed(device_id)
            }
        }
    }

    fn push_history(&self, device_id: &str, sample: PerformanceSample) {
        let mut ring = self
            .history
            .entry(device_id.to_string())
            .or_insert_with(VecDeque::new);
        if ring.len() >= HISTORY_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(sample);
    }
}
