//! Connection Monitor
//!
//! Background loop that reconciles registry state with the set of devices
//! the backend can physically reach. Runs on a fixed period, transitions
//! devices between Connected and Disconnected, and drives bounded
//! reconnection attempts for devices that drop off the bus.
//!
//! Lifecycle: `start()` is a no-op while the loop is running; `stop()`
//! signals cancellation and joins the task, so no registry mutation from
//! the monitor can happen after it returns.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::DeviceBackend;
use crate::registry::{DeviceRegistry, DeviceType};

/// Capacity of the status-change broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll period in milliseconds
    pub poll_interval_ms: u64,
    /// Reconnect attempts per device before the monitor stops actively
    /// reconnecting (the device keeps being polled every cycle)
    pub max_reconnect_attempts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            max_reconnect_attempts: 3,
        }
    }
}

/// Status-change notification, emitted only on actual transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Connected { device_id: String },
    Disconnected { device_id: String },
}

struct MonitorTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background reconciliation of registry state against reachable devices
pub struct ConnectionMonitor {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
    config: MonitorConfig,
    events: broadcast::Sender<DeviceEvent>,
    task: Mutex<Option<MonitorTask>>,
}

impl ConnectionMonitor {
    pub fn new(registry: Arc<DeviceRegistry>, backend: Arc<dyn DeviceBackend>) -> Self {
        Self::with_config(registry, backend, MonitorConfig::default())
    }

    pub fn with_config(
        registry: Arc<DeviceRegistry>,
        backend: Arc<dyn DeviceBackend>,
        config: MonitorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            backend,
            config,
            events,
            task: Mutex::new(None),
        }
    }

    /// Subscribe to connection status changes
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Start the background loop. No-op if already running.
    pub fn start(&self) {
        let mut slot = self.task.lock();
        if slot.is_some() {
            debug!("Connection monitor already running");
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let registry = self.registry.clone();
        let backend = self.backend.clone();
        let config = self.config.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            monitor_loop(registry, backend, config, events, stop_rx).await;
        });

        *slot = Some(MonitorTask { stop_tx, handle });
        info!("Device monitoring started");
    }

    /// Stop the background loop and wait for it to exit.
    ///
    /// Guarantees no monitor cycle is in flight after this returns.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.stop_tx.send(());
            let _ = task.handle.await;
            info!("Device monitoring stopped");
        }
    }
}

/// The monitor loop. One full cycle completes before the next tick fires.
async fn monitor_loop(
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn DeviceBackend>,
    config: MonitorConfig,
    events: broadcast::Sender<DeviceEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_millis(config.poll_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_cycle(&registry, backend.as_ref(), &config, &events).await;
            }
            _ = &mut stop_rx => {
                debug!("Connection monitor stop requested");
                break;
            }
        }
    }
}

/// One reconciliation cycle over every registered device.
pub(crate) async fn run_cycle(
    registry: &DeviceRegistry,
    backend: &dyn DeviceBackend,
    config: &MonitorConfig,
    events: &broadcast::Sender<DeviceEvent>,
) {
    let android = reachable_set(backend, DeviceType::Android).await;
    let ios = reachable_set(backend, DeviceType::Ios).await;
    let now = Utc::now();

    for record in registry.list_all() {
        let reachable = match record.device_type {
            DeviceType::Android => android.contains(&record.id),
            DeviceType::Ios => ios.contains(&record.id),
        };

        if reachable {
            if registry.mark_connected(&record.id, now) == Some(true) {
                info!("Device {} status changed to connected", record.id);
                let _ = events.send(DeviceEvent::Connected {
                    device_id: record.id.clone(),
                });
            }
            continue;
        }

        if registry.mark_disconnected(&record.id) == Some(true) {
            warn!("Device {} disconnected", record.id);
            let _ = events.send(DeviceEvent::Disconnected {
                device_id: record.id.clone(),
            });
        }

        if record.reconnect_attempts >= config.max_reconnect_attempts {
            continue;
        }
        let Some(attempt) = registry.begin_reconnect_attempt(&record.id) else {
            continue; // removed concurrently
        };
        info!(
            "Attempting to reconnect device {} (attempt {}/{})",
            record.id, attempt, config.max_reconnect_attempts
        );

        match backend.attempt_reconnect(&record.id).await {
            Ok(true) => {
                if registry.mark_connected(&record.id, now) == Some(true) {
                    info!("Device {} status changed to connected", record.id);
                    let _ = events.send(DeviceEvent::Connected {
                        device_id: record.id.clone(),
                    });
                }
            }
            Ok(false) => {
                registry.touch_last_seen(&record.id, now);
            }
            Err(e) => {
                error!("Error reconnecting to device {}: {}", record.id, e);
                registry.touch_last_seen(&record.id, now);
            }
        }
    }
}

async fn reachable_set(
    backend: &dyn DeviceBackend,
    device_type: DeviceType,
) -> std::collections::HashSet<String> {
    match backend.list_reachable(device_type).await {
        Ok(set) => set,
        Err(e) => {
            error!("Error checking {:?} devices: {}", device_type, e);
            Default::default()
        }
    }
}
