//! Host metrics as consumed by the UI.

use provider_backend::MonitoringResource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
    pub percent: f64,
}

/// Cumulative byte counters since host boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Cumulative byte counters since host boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub label: String,
    pub celsius: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCounts {
    pub total: u32,
    pub running: u32,
}

/// One monitoring sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Sample time, unix milliseconds.
    pub timestamp_ms: u64,
    /// `false` when the host cannot report metrics.
    pub available: bool,
    pub message: Option<String>,
    pub cpu_percent: f64,
    pub memory: MemoryUsage,
    pub disk: DiskCounters,
    pub network: NetworkCounters,
    pub temperatures: Vec<Temperature>,
    pub processes: ProcessCounts,
}

impl MetricsSnapshot {
    /// Convert a wire sample. `received_at_ms` stands in for a missing
    /// server timestamp.
    pub fn from_resource(resource: MonitoringResource, received_at_ms: u64) -> Self {
        let timestamp_ms = resource
            .timestamp
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| (secs * 1000.0).round() as u64)
            .unwrap_or(received_at_ms);

        Self {
            timestamp_ms,
            available: resource.available,
            message: resource.message.filter(|m| !m.trim().is_empty()),
            cpu_percent: resource.cpu.percent,
            memory: MemoryUsage {
                used: resource.memory.used,
                total: resource.memory.total,
                percent: resource.memory.percent,
            },
            disk: DiskCounters {
                read_bytes: resource.disk_io.read_bytes,
                write_bytes: resource.disk_io.write_bytes,
            },
            network: NetworkCounters {
                bytes_sent: resource.network.bytes_sent,
                bytes_recv: resource.network.bytes_recv,
            },
            temperatures: resource
                .temperatures
                .into_iter()
                .map(|t| Temperature {
                    label: t.label,
                    celsius: t.current,
                })
                .collect(),
            processes: ProcessCounts {
                total: resource.processes.total,
                running: resource.processes.running,
            },
        }
    }

    /// Hottest sensor, if any.
    pub fn max_temperature(&self) -> Option<f64> {
        self.temperatures
            .iter()
            .map(|t| t.celsius)
            .fold(None, |max, c| Some(max.map_or(c, |m: f64| m.max(c))))
    }
}
