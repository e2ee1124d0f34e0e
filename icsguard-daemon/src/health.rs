//! Aggregated health reporting.
//!
//! The daemon reports one entry for the detector pipeline and one per result
//! sink. The overall status is the worst of all components.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use icsguard_core::pipeline::HealthStatus;
use icsguard_detector::PipelineStats;
use icsguard_detector::dispatch::SinkSnapshot;

/// Aggregated health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status among all components.
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
    /// Pipeline counters at the time of the check.
    pub stats: PipelineStats,
}

/// Health of one component ("pipeline" or a sink name).
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
}

impl ComponentHealth {
    /// A sink is degraded while its most recent publish has failed.
    pub fn from_sink(snapshot: &SinkSnapshot) -> Self {
        let status = if snapshot.last_ok {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(format!(
                "last publish failed ({} failures total)",
                snapshot.failed
            ))
        };
        Self {
            name: snapshot.name.clone(),
            status,
        }
    }
}

/// Return the worst status found: Unhealthy > Degraded > Healthy.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut unhealthy = Vec::new();
    let mut degraded = Vec::new();

    for component in components {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", component.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}
