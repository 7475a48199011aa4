//! DeviceFleet - device fleet lifecycle and operations for mobile test labs
//!
//! In-process coordination layer over a fleet of Android and iOS test
//! devices that connect and disconnect unpredictably:
//! - Device registry with connection-state tracking
//! - Background connection monitoring with automatic reconnection
//! - Threshold-based health classification with bounded history
//! - Auto-recovery with escalation limits
//! - Concurrent batch-operation dispatch with per-device failure isolation
//! - Performance sampling and named device profiles
//!
//! The low-level device transport is supplied by the caller as a
//! [`DeviceBackend`] implementation; this crate never talks to hardware
//! directly and keeps no state across process restarts.

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod health;
pub mod manager;
pub mod monitor;
pub mod profiler;
pub mod profiles;
pub mod recovery;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendError, DeviceBackend, DeviceMetrics, DeviceOperation};
pub use batch::{BatchConfig, BatchDispatcher, BatchOutcome};
pub use config::FleetConfig;
pub use error::FleetError;
pub use health::{HealthMonitor, HealthSnapshot, HealthStatus, HealthThresholds};
pub use manager::{CompatibilityReport, DeviceManager};
pub use monitor::{ConnectionMonitor, DeviceEvent, MonitorConfig};
pub use profiler::{PerformanceProfiler, PerformanceSample};
pub use profiles::{DeviceProfile, ProfileManager};
pub use recovery::{AutoRecovery, RecoveryConfig};
pub use registry::{
    ConnectionStatus, DeviceRecord, DeviceRegistry, DeviceType, FleetStats,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for binaries embedding the fleet subsystem.
///
/// Respects `RUST_LOG`; defaults to `info`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
