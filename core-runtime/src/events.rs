//! # Event Bus System
//!
//! Typed events published by the upload orchestrator, the job tracker and
//! the telemetry coordinator over a `tokio::sync::broadcast` channel.
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐
//! │ PendingFile orch ├────────>│           │
//! └──────────────────┘         │           │  subscribe  ┌────────────┐
//! ┌──────────────────┐  emit   │ EventBus  ├────────────>│ Host UI    │
//! │ JobTracker       ├────────>│ (broadcast│             └────────────┘
//! └──────────────────┘         │  channel) │  subscribe  ┌────────────┐
//! ┌──────────────────┐  emit   │           ├────────────>│ Logger     │
//! │ Telemetry coord  ├────────>│           │             └────────────┘
//! └──────────────────┘         └───────────┘
//! ```
//!
//! Events describe *transitions*. Hosts that need the current state read it
//! from the owning service (`PendingFileOrchestrator::list`,
//! `JobTracker::get`, `Subscription::view`); the bus only says that
//! something changed.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Upload(UploadEvent::Progress {
//!     file_id: "local-1".to_string(),
//!     percent: 40,
//! }))
//! .ok();
//!
//! assert_eq!(rx.recv().await.unwrap().description(), "Upload progress");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - `RecvError::Lagged(n)`: the subscriber fell behind and missed `n` events.
//!   Non-fatal; resync from the owning service.
//! - `RecvError::Closed`: every sender is gone; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Upload(UploadEvent),
    Job(JobEvent),
    Telemetry(TelemetryEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Upload(e) => e.description(),
            CoreEvent::Job(e) => e.description(),
            CoreEvent::Telemetry(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Upload(UploadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Job(JobEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Job(JobEvent::CancelRejected { .. }) => EventSeverity::Warning,
            CoreEvent::Telemetry(TelemetryEvent::Degraded { .. }) => EventSeverity::Warning,
            CoreEvent::Telemetry(TelemetryEvent::FetchFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Upload(UploadEvent::Ready { .. }) => EventSeverity::Info,
            CoreEvent::Job(JobEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Job(JobEvent::Cancelled { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Upload Events
// ============================================================================

/// Pending-file transitions. `file_id` is the local id assigned at selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    Selected {
        file_id: String,
        filename: String,
        size_bytes: u64,
    },
    Progress {
        file_id: String,
        percent: u8,
    },
    PreliminaryMetadata {
        file_id: String,
        duration_ms: Option<u64>,
    },
    Analyzing {
        file_id: String,
        server_id: String,
        stage: String,
        eta_seconds: Option<u32>,
    },
    Ready {
        file_id: String,
        server_id: String,
    },
    Failed {
        file_id: String,
        message: String,
    },
    Removed {
        file_id: String,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Selected { .. } => "File selected",
            UploadEvent::Progress { .. } => "Upload progress",
            UploadEvent::PreliminaryMetadata { .. } => "Local probe finished",
            UploadEvent::Analyzing { .. } => "Server analysis in progress",
            UploadEvent::Ready { .. } => "File ready for conversion",
            UploadEvent::Failed { .. } => "File failed",
            UploadEvent::Removed { .. } => "File removed",
        }
    }
}

// ============================================================================
// Job Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum JobEvent {
    Tracked {
        job_id: String,
        source_file_id: Option<String>,
    },
    Progress {
        job_id: String,
        status: String,
        percent: u8,
        stage: Option<String>,
        eta_seconds: Option<u32>,
    },
    Completed {
        job_id: String,
    },
    Failed {
        job_id: String,
        message: String,
    },
    Cancelled {
        job_id: String,
    },
    CancelRejected {
        job_id: String,
        message: String,
    },
    Removed {
        job_id: String,
    },
}

impl JobEvent {
    fn description(&self) -> &str {
        match self {
            JobEvent::Tracked { .. } => "Job tracked",
            JobEvent::Progress { .. } => "Job progress",
            JobEvent::Completed { .. } => "Job completed",
            JobEvent::Failed { .. } => "Job failed",
            JobEvent::Cancelled { .. } => "Job cancelled",
            JobEvent::CancelRejected { .. } => "Job cancel rejected",
            JobEvent::Removed { .. } => "Job removed",
        }
    }
}

// ============================================================================
// Telemetry Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TelemetryEvent {
    LoopStarted { cadence_ms: u64 },
    CadenceChanged { cadence_ms: u64 },
    LoopStopped,
    Degraded { message: Option<String> },
    FetchFailed { message: String },
    Recovered,
}

impl TelemetryEvent {
    fn description(&self) -> &str {
        match self {
            TelemetryEvent::LoopStarted { .. } => "Telemetry polling started",
            TelemetryEvent::CadenceChanged { .. } => "Telemetry cadence changed",
            TelemetryEvent::LoopStopped => "Telemetry polling stopped",
            TelemetryEvent::Degraded { .. } => "Telemetry degraded",
            TelemetryEvent::FetchFailed { .. } => "Telemetry fetch failed",
            TelemetryEvent::Recovered => "Telemetry recovered",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Fails only when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate applied before events are returned.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(percent: u8) -> CoreEvent {
        CoreEvent::Upload(UploadEvent::Progress {
            file_id: "local-1".to_string(),
            percent,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription_count() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(progress(10)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Job(JobEvent::Tracked {
            job_id: "42".to_string(),
            source_file_id: Some("file-1".to_string()),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Job(_)));

        bus.emit(progress(50)).ok();
        let job_event = CoreEvent::Job(JobEvent::Cancelled {
            job_id: "7".to_string(),
        });
        bus.emit(job_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), job_event);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for percent in 0..5 {
            bus.emit(progress(percent * 10)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Upload(UploadEvent::Failed {
            file_id: "a".to_string(),
            message: "timeout".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let degraded = CoreEvent::Telemetry(TelemetryEvent::Degraded { message: None });
        assert_eq!(degraded.severity(), EventSeverity::Warning);

        assert_eq!(progress(1).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Telemetry(TelemetryEvent::CadenceChanged { cadence_ms: 1000 });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Telemetry");
        assert_eq!(json["payload"]["event"], "CadenceChanged");
        assert_eq!(json["payload"]["cadence_ms"], 1000);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
