//! Fleet-level Device Management
//!
//! Scans the backend for attached devices of both families, registers
//! them, and answers version-compatibility and feature-support questions.
//! Version strings from devices are loose dotted numerics ("13", "16.1",
//! "4.4.2"), compared component-wise with missing components as zero.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::backend::DeviceBackend;
use crate::registry::{DeviceRecord, DeviceRegistry, DeviceType};

/// Supported OS version window per device family
const MIN_ANDROID_VERSION: &str = "4.4";
const LATEST_ANDROID_VERSION: &str = "14.0";
const MIN_IOS_VERSION: &str = "11.0";
const LATEST_IOS_VERSION: &str = "17.0";

/// Feature name → minimum OS version, per family
const ANDROID_FEATURES: &[(&str, &str)] = &[
    ("performance_metrics", "5.0"),
    ("gpu_monitoring", "6.0"),
    ("network_monitoring", "5.0"),
    ("battery_stats", "5.0"),
    ("screen_recording", "10.0"),
];

const IOS_FEATURES: &[(&str, &str)] = &[
    ("performance_metrics", "11.0"),
    ("gpu_monitoring", "12.0"),
    ("network_monitoring", "11.0"),
    ("battery_stats", "11.0"),
    ("screen_recording", "11.0"),
];

/// Android property keys reported by the backend
const ANDROID_NAME_PROP: &str = "ro.product.model";
const ANDROID_VERSION_PROP: &str = "ro.build.version.release";

/// iOS property keys reported by the backend
const IOS_NAME_PROP: &str = "DeviceName";
const IOS_VERSION_PROP: &str = "ProductVersion";

/// Version-support verdict and per-feature availability for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub supported: bool,
    /// Empty when the device version is outside the support window
    pub features: HashMap<String, bool>,
}

/// Fleet scanner and compatibility oracle
pub struct DeviceManager {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
}

impl DeviceManager {
    pub fn new(registry: Arc<DeviceRegistry>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self { registry, backend }
    }

    /// Scan both device families and register every reachable device.
    ///
    /// Devices whose property read fails are logged and skipped; the scan
    /// continues. Returns the full registry snapshot.
    pub async fn scan_devices(&self) -> Vec<DeviceRecord> {
        for device_type in [DeviceType::Android, DeviceType::Ios] {
            let reachable = match self.backend.list_reachable(device_type).await {
                Ok(set) => set,
                Err(e) => {
                    error!("Error accessing {:?} devices: {}", device_type, e);
                    continue;
                }
            };

            for device_id in reachable {
                match self.backend.read_properties(&device_id).await {
                    Ok(props) => {
                        let (name, version) = identify(device_type, &props);
                        self.registry
                            .add_device(device_id, device_type, name, version);
                    }
                    Err(e) => {
                        error!("Error scanning device {}: {}", device_id, e);
                    }
                }
            }
        }

        let devices = self.registry.list_all();
        info!("Device scan complete: {} devices registered", devices.len());
        devices
    }

    /// Whether the device's OS version falls inside the supported window
    /// for its family (inclusive at both ends).
    pub fn is_version_supported(&self, record: &DeviceRecord) -> bool {
        let (min, max) = match record.device_type {
            DeviceType::Android => (MIN_ANDROID_VERSION, LATEST_ANDROID_VERSION),
            DeviceType::Ios => (MIN_IOS_VERSION, LATEST_IOS_VERSION),
        };
        let version = parse_version(&record.version);
        compare_versions(&version, &parse_version(min)) != std::cmp::Ordering::Less
            && compare_versions(&version, &parse_version(max)) != std::cmp::Ordering::Greater
    }

    /// Per-feature availability for a device, by minimum-version gate.
    pub fn supported_features(&self, record: &DeviceRecord) -> HashMap<String, bool> {
        let matrix = match record.device_type {
            DeviceType::Android => ANDROID_FEATURES,
            DeviceType::Ios => IOS_FEATURES,
        };
        let version = parse_version(&record.version);
        matrix
            .iter()
            .map(|(feature, min)| {
                let available = compare_versions(&version, &parse_version(min))
                    != std::cmp::Ordering::Less;
                (feature.to_string(), available)
            })
            .collect()
    }

    /// Combined verdict for a registered device; None for unknown ids.
    pub fn device_compatibility(&self, device_id: &str) -> Option<CompatibilityReport> {
        let record = self.registry.get(device_id)?;
        let supported = self.is_version_supported(&record);
        let features = if supported {
            self.supported_features(&record)
        } else {
            HashMap::new()
        };
        Some(CompatibilityReport {
            supported,
            features,
        })
    }

    /// Wait for a device to connect, returning its record on success.
    pub async fn wait_for_device(
        &self,
        device_id: &str,
        timeout: Duration,
    ) -> Option<DeviceRecord> {
        if self.registry.wait_for_device(device_id, timeout).await {
            self.registry.get(device_id)
        } else {
            None
        }
    }
}

/// Pull name and OS version out of a property map, with fallbacks for
/// devices that report incomplete properties.
fn identify(device_type: DeviceType, props: &HashMap<String, String>) -> (String, String) {
    let (name_key, version_key, fallback) = match device_type {
        DeviceType::Android => (ANDROID_NAME_PROP, ANDROID_VERSION_PROP, "Unknown Android Device"),
        DeviceType::Ios => (IOS_NAME_PROP, IOS_VERSION_PROP, "Unknown iOS Device"),
    };
    let name = props
        .get(name_key)
        .cloned()
        .unwrap_or_else(|| fallback.to_string());
    let version = props
        .get(version_key)
        .cloned()
        .unwrap_or_else(|| "0.0".to_string());
    (name, version)
}

/// Lenient dotted-numeric version parse; non-numeric components read as 0.
fn parse_version(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|part| part.trim().parse().unwrap_or(0))
        .collect()
}

/// Component-wise comparison with missing components as zero.
fn compare_versions(a: &[u64], b: &[u64]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}
