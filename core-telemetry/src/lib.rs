//! # Host Telemetry
//!
//! Shared monitoring poll loop, per-view metric histories and
//! consumer-side smoothing.
//!
//! - [`TelemetryCoordinator`]: one loop for every attached [`Subscription`]
//! - [`MetricsHistory`]: bounded per-channel series with byte rates
//! - [`smoothing::weighted_ema`]: display smoothing for jittery gauges

pub mod coordinator;
pub mod error;
pub mod history;
pub mod model;
pub mod smoothing;

pub use coordinator::{
    CoordinatorState, MetricsSource, SubscriberRequest, SubscriberView, Subscription,
    TelemetryCoordinator,
};
pub use error::{Result, TelemetryError};
pub use history::{Channel, HistoryPoint, MetricsHistory};
pub use model::{
    DiskCounters, MemoryUsage, MetricsSnapshot, NetworkCounters, ProcessCounts, Temperature,
};
