//! Device Registry
//!
//! Authoritative in-memory view of the fleet: which devices exist, what
//! family they belong to and whether they are currently connected.
//! Thread-safe via DashMap; every mutation is scoped to a single entry
//! lock and never spans a backend call, so slow device I/O cannot block
//! concurrent readers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Interval at which `wait_for_device` re-checks the registry
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Device family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Android,
    Ios,
}

/// Connection state of a registered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

/// Identity and connection state of one device.
///
/// Owned exclusively by the registry; callers get snapshot copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Opaque unique id (adb serial / usbmux udid)
    pub id: String,
    pub device_type: DeviceType,
    /// Human-readable name (product model / device name)
    pub name: String,
    /// OS version string as reported by the device
    pub version: String,
    pub status: ConnectionStatus,
    /// Last time the monitor observed this device, `None` if never seen
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Consecutive reconnect attempts since the device was last connected
    pub reconnect_attempts: u32,
}

impl DeviceRecord {
    fn new(id: String, device_type: DeviceType, name: String, version: String) -> Self {
        Self {
            id,
            device_type,
            name,
            version,
            status: ConnectionStatus::Disconnected,
            last_seen: None,
            reconnect_attempts: 0,
        }
    }
}

/// Aggregate registry counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetStats {
    pub total: usize,
    pub connected: usize,
    pub disconnected: usize,
}

/// Registry of all known devices and their connection state
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    /// Register a new device. Returns false (and leaves the existing
    /// record untouched) if the id is already present.
    pub fn add_device(
        &self,
        id: impl Into<String>,
        device_type: DeviceType,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> bool {
        let id = id.into();
        match self.devices.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let record = DeviceRecord::new(id.clone(), device_type, name.into(), version.into());
                info!(
                    "Added {:?} device: {} ({}, {})",
                    device_type, id, record.name, record.version
                );
                slot.insert(record);
                true
            }
        }
    }

    /// Remove a device. Returns false if the id was not registered.
    pub fn remove_device(&self, id: &str) -> bool {
        let removed = self.devices.remove(id).is_some();
        if removed {
            info!("Removed device: {}", id);
        }
        removed
    }

    /// Snapshot of one device record
    pub fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Snapshot of all registered devices
    pub fn list_all(&self) -> Vec<DeviceRecord> {
        self.devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of currently connected devices
    pub fn list_connected(&self) -> Vec<DeviceRecord> {
        self.devices
            .iter()
            .filter(|entry| entry.status == ConnectionStatus::Connected)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }

    pub fn stats(&self) -> FleetStats {
        let total = self.devices.len();
        let connected = self
            .devices
            .iter()
            .filter(|entry| entry.status == ConnectionStatus::Connected)
            .count();
        FleetStats {
            total,
            connected,
            disconnected: total - connected,
        }
    }

    /// Poll until the device reports Connected or the timeout elapses.
    ///
    /// Returns false on timeout and for ids that were never registered.
    pub async fn wait_for_device(&self, id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(record) = self.get(id) {
                if record.status == ConnectionStatus::Connected {
                    return true;
                }
            }
            if tokio::time::Instant::now() + WAIT_POLL_INTERVAL > deadline {
                return false;
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Mark a device Connected, stamping `last_seen` and resetting the
    /// reconnect counter. Returns whether the status actually changed,
    /// or None for unknown ids.
    pub(crate) fn mark_connected(&self, id: &str, now: DateTime<Utc>) -> Option<bool> {
        let mut entry = self.devices.get_mut(id)?;
        let changed = entry.status != ConnectionStatus::Connected;
        entry.status = ConnectionStatus::Connected;
        entry.last_seen = Some(now);
        entry.reconnect_attempts = 0;
        Some(changed)
    }

    /// Mark a device Disconnected. Returns whether the status actually
    /// changed, or None for unknown ids.
    pub(crate) fn mark_disconnected(&self, id: &str) -> Option<bool> {
        let mut entry = self.devices.get_mut(id)?;
        let changed = entry.status == ConnectionStatus::Connected;
        entry.status = ConnectionStatus::Disconnected;
        Some(changed)
    }

    /// Increment the reconnect counter, returning the new attempt number.
    pub(crate) fn begin_reconnect_attempt(&self, id: &str) -> Option<u32> {
        let mut entry = self.devices.get_mut(id)?;
        entry.reconnect_attempts += 1;
        Some(entry.reconnect_attempts)
    }

    /// Stamp `last_seen` without touching connection state, so staleness
    /// stays observable while reconnection keeps failing.
    pub(crate) fn touch_last_seen(&self, id: &str, now: DateTime<Utc>) {
        if let Some(mut entry) = self.devices.get_mut(id) {
            entry.last_seen = Some(now);
        }
    }
}
