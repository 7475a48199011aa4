//! Batch Operation Dispatch
//!
//! Fans a named operation out across many devices on a bounded worker
//! pool. Each device's outcome is captured independently; one bad device
//! never aborts or delays the rest, and the result map always carries
//! exactly one entry per requested device id.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use crate::backend::{DeviceBackend, DeviceOperation};
use crate::registry::DeviceRegistry;

/// Batch dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Device operations in flight at once; excess devices queue
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
        }
    }
}

/// Per-device result of a batch execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success { result: Value },
    Error { error: String },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Concurrent fan-out of one operation over many devices
pub struct BatchDispatcher {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
    config: BatchConfig,
}

impl BatchDispatcher {
    pub fn new(registry: Arc<DeviceRegistry>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self::with_config(registry, backend, BatchConfig::default())
    }

    pub fn with_config(
        registry: Arc<DeviceRegistry>,
        backend: Arc<dyn DeviceBackend>,
        config: BatchConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            config,
        }
    }

    /// Execute `operation` on the given devices (or the whole fleet when
    /// `devices` is None). Unknown ids yield error entries, not registry
    /// mutations.
    pub async fn execute_batch(
        &self,
        operation: DeviceOperation,
        params: Value,
        devices: Option<Vec<String>>,
    ) -> HashMap<String, BatchOutcome> {
        let targets = devices.unwrap_or_else(|| {
            self.registry
                .list_all()
                .into_iter()
                .map(|record| record.id)
                .collect()
        });

        let batch_id = Uuid::new_v4();
        debug!(
            "Batch {}: dispatching {} to {} devices",
            batch_id,
            operation,
            targets.len()
        );

        let params = &params;
        let results: Vec<(String, BatchOutcome)> = stream::iter(targets)
            .map(|device_id| async move {
                let outcome = self.execute_single(&device_id, operation, params).await;
                (device_id, outcome)
            })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        debug!("Batch {}: completed", batch_id);
        results.into_iter().collect()
    }

    async fn execute_single(
        &self,
        device_id: &str,
        operation: DeviceOperation,
        params: &Value,
    ) -> BatchOutcome {
        if !self.registry.contains(device_id) {
            return BatchOutcome::Error {
                error: format!("Device {} not found", device_id),
            };
        }

        match self
            .backend
            .invoke_operation(device_id, operation, params)
            .await
        {
            Ok(result) => BatchOutcome::Success { result },
            Err(e) => {
                error!("Operation {} failed for device {}: {}", operation, device_id, e);
                BatchOutcome::Error {
                    error: format!("Operation {} failed: {}", operation, e),
                }
            }
        }
    }
}
