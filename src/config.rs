//! Fleet Configuration
//!
//! Aggregate of the per-component config structs, for callers that load
//! settings from a JSON document. Every field has a sensible default, so
//! a partial (or empty) document configures a working fleet.

use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig;
use crate::health::HealthThresholds;
use crate::monitor::MonitorConfig;
use crate::recovery::RecoveryConfig;

/// Top-level configuration for the fleet subsystem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub monitor: MonitorConfig,
    pub thresholds: HealthThresholds,
    pub recovery: RecoveryConfig,
    pub batch: BatchConfig,
}
