//! Update model shared by the push and pull channels.

use serde::{Deserialize, Serialize};

/// Non-terminal progress report.
///
/// Every field is optional; absent fields leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub status: Option<String>,
    pub stage: Option<String>,
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub eta_seconds: Option<u32>,
    /// Encoding speed as a multiple of realtime.
    pub speed_factor: Option<f64>,
}

impl SyncProgress {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_eta_seconds(mut self, eta: u32) -> Self {
        self.eta_seconds = Some(eta);
        self
    }

    pub fn with_speed_factor(mut self, speed: f64) -> Self {
        self.speed_factor = Some(speed);
        self
    }
}

/// One decoded update from either channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate<T> {
    Progress(SyncProgress),
    Ready(T),
    Failed(String),
}

impl<T> SyncUpdate<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncUpdate::Progress(_))
    }
}

/// Convert a float from the wire into a clamped percent.
pub fn percent_from_wire(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).floor() as u8
}

/// Clamp a wire ETA to `0..=max_seconds`.
pub fn eta_from_wire(value: f64, max_seconds: u32) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, max_seconds as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_from_wire() {
        assert_eq!(percent_from_wire(-5.0), 0);
        assert_eq!(percent_from_wire(42.9), 42);
        assert_eq!(percent_from_wire(250.0), 100);
        assert_eq!(percent_from_wire(f64::NAN), 0);
    }

    #[test]
    fn test_eta_from_wire() {
        assert_eq!(eta_from_wire(-1.0, 86_400), 0);
        assert_eq!(eta_from_wire(12.4, 86_400), 12);
        assert_eq!(eta_from_wire(1e9, 86_400), 86_400);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!SyncUpdate::<()>::Progress(SyncProgress::default()).is_terminal());
        assert!(SyncUpdate::Ready(()).is_terminal());
        assert!(SyncUpdate::<()>::Failed("x".to_string()).is_terminal());
    }
}
