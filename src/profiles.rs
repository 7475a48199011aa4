//! Device Configuration Profiles
//!
//! Named bundles of settings and performance targets applied to
//! compatible devices. Compatibility is matched against the device's
//! hardware model, with `*` wildcards for model families.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::backend::DeviceBackend;
use crate::error::FleetError;
use crate::registry::DeviceRegistry;

/// Named configuration bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    /// Setting name → scalar value, applied through the backend
    pub settings: HashMap<String, Value>,
    /// Model-match patterns; a device must match at least one
    pub compatibility: Vec<String>,
    /// Metric name → target value (informational, not enforced here)
    pub performance_targets: HashMap<String, f64>,
}

/// Store and application of device profiles
pub struct ProfileManager {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
    profiles: DashMap<String, DeviceProfile>,
}

impl ProfileManager {
    pub fn new(registry: Arc<DeviceRegistry>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            registry,
            backend,
            profiles: DashMap::new(),
        }
    }

    /// Create a profile, overwriting any existing profile of the same name.
    pub fn create_profile(
        &self,
        name: impl Into<String>,
        settings: HashMap<String, Value>,
        compatibility: Vec<String>,
        performance_targets: HashMap<String, f64>,
    ) -> DeviceProfile {
        let profile = DeviceProfile {
            name: name.into(),
            settings,
            compatibility,
            performance_targets,
        };
        info!("Created profile {}", profile.name);
        self.profiles.insert(profile.name.clone(), profile.clone());
        profile
    }

    pub fn get_profile(&self, name: &str) -> Option<DeviceProfile> {
        self.profiles.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove_profile(&self, name: &str) -> bool {
        self.profiles.remove(name).is_some()
    }

    pub fn list_profiles(&self) -> Vec<DeviceProfile> {
        self.profiles
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Apply a profile's settings to a device.
    ///
    /// Unknown profile or device ids and incompatible models raise; a
    /// setting that fails mid-application returns `Ok(false)` and leaves
    /// the settings applied so far in place (no rollback).
    pub async fn apply_profile(
        &self,
        device_id: &str,
        profile_name: &str,
    ) -> Result<bool, FleetError> {
        let profile = self
            .get_profile(profile_name)
            .ok_or_else(|| FleetError::ProfileNotFound(profile_name.to_string()))?;

        if !self.registry.contains(device_id) {
            return Err(FleetError::DeviceNotFound(device_id.to_string()));
        }

        let model = self
            .backend
            .device_model(device_id)
            .await
            .map_err(|e| FleetError::OperationFailed(e.to_string()))?;

        if !profile
            .compatibility
            .iter()
            .any(|pattern| model_matches(&model, pattern))
        {
            return Err(FleetError::ProfileIncompatible {
                profile: profile_name.to_string(),
                model,
            });
        }

        for (setting, value) in &profile.settings {
            if let Err(e) = self.backend.apply_setting(device_id, setting, value).await {
                error!(
                    "Failed to apply profile {} to device {}: {}",
                    profile_name, device_id, e
                );
                return Ok(false);
            }
        }

        info!("Applied profile {} to device {}", profile_name, device_id);
        Ok(true)
    }
}

/// Match a model string against a pattern with `*` wildcard segments.
fn model_matches(model: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return model == pattern;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let last = segments.len() - 1;
    let mut rest = model;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            // Leading segment anchors at the start
            let Some(stripped) = rest.strip_prefix(segment) else {
                return false;
            };
            rest = stripped;
        } else if i == last {
            // Trailing segment anchors at the end
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceType;
    use crate::testing::MockBackend;
    use serde_json::json;

    fn setup() -> (Arc<MockBackend>, ProfileManager) {
        let registry = Arc::new(DeviceRegistry::new());
        registry.add_device("d1", DeviceType::Android, "Pixel 7", "13.0");
        let backend = Arc::new(MockBackend::new());
        backend.set_model("d1", "Pixel 7");
        let manager = ProfileManager::new(registry, backend.clone());
        (backend, manager)
    }

    fn perf_profile(manager: &ProfileManager, compatibility: Vec<String>) -> DeviceProfile {
        let mut settings = HashMap::new();
        settings.insert("animation_scale".to_string(), json!(0.0));
        settings.insert("brightness".to_string(), json!(128));
        let mut targets = HashMap::new();
        targets.insert("response_time".to_string(), 0.2);
        manager.create_profile("perf", settings, compatibility, targets)
    }

    #[tokio::test]
    async fn test_apply_profile() {
        let (backend, manager) = setup();
        perf_profile(&manager, vec!["Pixel 7".into()]);

        assert!(manager.apply_profile("d1", "perf").await.unwrap());
        let applied = backend.applied_settings();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|(id, _, _)| id == "d1"));
    }

    #[tokio::test]
    async fn test_wildcard_compatibility() {
        let (_backend, manager) = setup();
        perf_profile(&manager, vec!["Pixel *".into()]);
        assert!(manager.apply_profile("d1", "perf").await.unwrap());
    }

    #[tokio::test]
    async fn test_incompatible_model_applies_nothing() {
        let (backend, manager) = setup();
        perf_profile(&manager, vec!["iPhone *".into()]);

        let result = manager.apply_profile("d1", "perf").await;
        assert!(matches!(
            result,
            Err(FleetError::ProfileIncompatible { .. })
        ));
        assert!(backend.applied_settings().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_profile_and_device() {
        let (_backend, manager) = setup();
        assert!(matches!(
            manager.apply_profile("d1", "nope").await,
            Err(FleetError::ProfileNotFound(_))
        ));

        perf_profile(&manager, vec!["Pixel 7".into()]);
        assert!(matches!(
            manager.apply_profile("ghost", "perf").await,
            Err(FleetError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_application_returns_false() {
        let (backend, manager) = setup();
        perf_profile(&manager, vec!["Pixel 7".into()]);
        backend.fail_setting("animation_scale");

        assert!(!manager.apply_profile("d1", "perf").await.unwrap());
        // Settings applied before the failure stay applied
        assert!(backend.applied_settings().len() <= 1);
    }

    #[test]
    fn test_create_profile_upserts() {
        let registry = Arc::new(DeviceRegistry::new());
        let backend = Arc::new(MockBackend::new());
        let manager = ProfileManager::new(registry, backend);

        manager.create_profile("p", HashMap::new(), vec!["A".into()], HashMap::new());
        manager.create_profile("p", HashMap::new(), vec!["B".into()], HashMap::new());

        assert_eq!(manager.list_profiles().len(), 1);
        assert_eq!(manager.get_profile("p").unwrap().compatibility, vec!["B"]);
        assert!(manager.remove_profile("p"));
        assert!(!manager.remove_profile("p"));
    }

    #[test]
    fn test_model_matches() {
        assert!(model_matches("Pixel 7", "Pixel 7"));
        assert!(!model_matches("Pixel 7", "Pixel 8"));
        assert!(model_matches("Pixel 7 Pro", "Pixel *"));
        assert!(model_matches("iPhone 14,2", "iPhone *"));
        assert!(model_matches("Galaxy S23 Ultra", "*Ultra"));
        assert!(!model_matches("Galaxy S23", "*Ultra"));
        assert!(model_matches("SM-G991B", "SM-*B"));
        assert!(!model_matches("SM-G991U", "SM-*B"));
        assert!(model_matches("anything", "*"));
    }
}
