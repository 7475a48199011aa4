//! Scriptable backend double shared by the module tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::backend::{BackendError, DeviceBackend, DeviceMetrics, DeviceOperation};
use crate::registry::DeviceType;

#[derive(Default)]
struct MockState {
    reachable: HashMap<DeviceType, HashSet<String>>,
    properties: HashMap<String, HashMap<String, String>>,
    metrics: HashMap<String, DeviceMetrics>,
    metrics_failures: HashSet<String>,
    probe_failures: HashSet<String>,
    operation_failures: HashSet<String>,
    reconnectable: HashSet<String>,
    models: HashMap<String, String>,
    failing_settings: HashSet<String>,
    invoked: Vec<(String, DeviceOperation)>,
    applied: Vec<(String, String, Value)>,
    reconnect_calls: Vec<String>,
}

/// In-memory [`DeviceBackend`] whose behavior is scripted per device.
#[derive(Default)]
pub(crate) struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, device_type: DeviceType, ids: &[&str]) {
        self.state.lock().reachable.insert(
            device_type,
            ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_properties(&self, id: &str, props: &[(&str, &str)]) {
        self.state.lock().properties.insert(
            id.to_string(),
            props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    pub fn set_metrics(&self, id: &str, metrics: DeviceMetrics) {
        let mut state = self.state.lock();
        state.metrics_failures.remove(id);
        state.metrics.insert(id.to_string(), metrics);
    }

    pub fn fail_metrics(&self, id: &str) {
        self.state.lock().metrics_failures.insert(id.to_string());
    }

    pub fn fail_probe(&self, id: &str) {
        self.state.lock().probe_failures.insert(id.to_string());
    }

    pub fn fail_operations(&self, id: &str) {
        self.state.lock().operation_failures.insert(id.to_string());
    }

    pub fn allow_reconnect(&self, id: &str) {
        self.state.lock().reconnectable.insert(id.to_string());
    }

    pub fn set_model(&self, id: &str, model: &str) {
        self.state
            .lock()
            .models
            .insert(id.to_string(), model.to_string());
    }

    pub fn fail_setting(&self, setting: &str) {
        self.state.lock().failing_settings.insert(setting.to_string());
    }

    pub fn invoked_operations(&self) -> Vec<(String, DeviceOperation)> {
        self.state.lock().invoked.clone()
    }

    pub fn applied_settings(&self) -> Vec<(String, String, Value)> {
        self.state.lock().applied.clone()
    }

    pub fn reconnect_calls(&self) -> Vec<String> {
        self.state.lock().reconnect_calls.clone()
    }
}

/// Metrics helper with battery/temperature left unset.
pub(crate) fn metrics(cpu: f64, memory: f64, strength: f64) -> DeviceMetrics {
    DeviceMetrics {
        cpu_usage: cpu,
        memory_usage: memory,
        battery_level: None,
        temperature: None,
        connection_strength: strength,
        throughput: 120.0,
        error_rate: 0.01,
    }
}

#[async_trait]
impl DeviceBackend for MockBackend {
    async fn list_reachable(
        &self,
        device_type: DeviceType,
    ) -> Result<HashSet<String>, BackendError> {
        Ok(self
            .state
            .lock()
            .reachable
            .get(&device_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_properties(
        &self,
        device_id: &str,
    ) -> Result<HashMap<String, String>, BackendError> {
        self.state
            .lock()
            .properties
            .get(device_id)
            .cloned()
            .ok_or_else(|| BackendError::NotVisible(device_id.to_string()))
    }

    async fn attempt_reconnect(&self, device_id: &str) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        state.reconnect_calls.push(device_id.to_string());
        Ok(state.reconnectable.contains(device_id))
    }

    async fn read_metrics(&self, device_id: &str) -> Result<DeviceMetrics, BackendError> {
        let state = self.state.lock();
        if state.metrics_failures.contains(device_id) {
            return Err(BackendError::Transport(format!(
                "metrics read failed for {}",
                device_id
            )));
        }
        state
            .metrics
            .get(device_id)
            .cloned()
            .ok_or_else(|| BackendError::NotVisible(device_id.to_string()))
    }

    async fn probe(&self, device_id: &str) -> Result<(), BackendError> {
        if self.state.lock().probe_failures.contains(device_id) {
            return Err(BackendError::Transport(format!(
                "probe failed for {}",
                device_id
            )));
        }
        Ok(())
    }

    async fn invoke_operation(
        &self,
        device_id: &str,
        operation: DeviceOperation,
        _params: &Value,
    ) -> Result<Value, BackendError> {
        let mut state = self.state.lock();
        state.invoked.push((device_id.to_string(), operation));
        if state.operation_failures.contains(device_id) {
            return Err(BackendError::CommandFailed(format!(
                "{} failed on {}",
                operation, device_id
            )));
        }
        Ok(json!({ "ok": true, "operation": operation.as_str() }))
    }

    async fn apply_setting(
        &self,
        device_id: &str,
        setting: &str,
        value: &Value,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.failing_settings.contains(setting) {
            return Err(BackendError::CommandFailed(format!(
                "setting {} rejected",
                setting
            )));
        }
        state
            .applied
            .push((device_id.to_string(), setting.to_string(), value.clone()));
        Ok(())
    }

    async fn device_model(&self, device_id: &str) -> Result<String, BackendError> {
        self.state
            .lock()
            .models
            .get(device_id)
            .cloned()
            .ok_or_else(|| BackendError::NotVisible(device_id.to_string()))
    }
}
