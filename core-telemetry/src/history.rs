//! # Metrics History
//!
//! Bounded per-channel series derived from successive snapshots.
//!
//! Gauge channels (CPU, memory) store the sampled value. Counter channels
//! (disk, network) store a rate in bytes per second computed from the
//! previous snapshot:
//!
//! ```text
//! rate = max(0, (current - previous) / elapsed_secs)
//! ```
//!
//! When there is no previous snapshot, or the timestamps do not advance,
//! the channel repeats its previous rate (0 for the very first sample).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::model::MetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Cpu,
    Memory,
    DiskRead,
    DiskWrite,
    NetworkSent,
    NetworkRecv,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Cpu,
        Channel::Memory,
        Channel::DiskRead,
        Channel::DiskWrite,
        Channel::NetworkSent,
        Channel::NetworkRecv,
    ];

    /// Counter channels hold bytes/sec rather than the raw sample.
    pub fn is_rate(&self) -> bool {
        !matches!(self, Channel::Cpu | Channel::Memory)
    }

    fn index(&self) -> usize {
        *self as usize
    }

    fn counter(&self, snapshot: &MetricsSnapshot) -> u64 {
        match self {
            Channel::DiskRead => snapshot.disk.read_bytes,
            Channel::DiskWrite => snapshot.disk.write_bytes,
            Channel::NetworkSent => snapshot.network.bytes_sent,
            Channel::NetworkRecv => snapshot.network.bytes_recv,
            Channel::Cpu | Channel::Memory => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp_ms: u64,
    pub value: f64,
}

/// Capacity for a window sampled at `cadence_ms`, at least one point.
pub fn capacity_for(window_ms: u64, cadence_ms: u64) -> usize {
    let cadence_ms = cadence_ms.max(1);
    usize::try_from(window_ms.div_ceil(cadence_ms))
        .unwrap_or(usize::MAX)
        .max(1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsHistory {
    capacity: usize,
    series: [VecDeque<HistoryPoint>; 6],
    previous: Option<MetricsSnapshot>,
    last_rates: [f64; 6],
}

impl MetricsHistory {
    pub fn new(window_ms: u64, cadence_ms: u64) -> Self {
        let capacity = capacity_for(window_ms, cadence_ms);
        Self {
            capacity,
            // Series grow on push; the capacity can be far larger than what
            // is ever stored.
            series: std::array::from_fn(|_| VecDeque::new()),
            previous: None,
            last_rates: [0.0; 6],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points currently held per channel.
    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute capacity, dropping the oldest points if it shrank.
    pub fn resize(&mut self, window_ms: u64, cadence_ms: u64) {
        self.capacity = capacity_for(window_ms, cadence_ms);
        for series in &mut self.series {
            while series.len() > self.capacity {
                series.pop_front();
            }
        }
    }

    pub fn push(&mut self, snapshot: &MetricsSnapshot) {
        let elapsed_secs = self
            .previous
            .as_ref()
            .filter(|prev| snapshot.timestamp_ms > prev.timestamp_ms)
            .map(|prev| (snapshot.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0);

        for channel in Channel::ALL {
            let value = match channel {
                Channel::Cpu => snapshot.cpu_percent,
                Channel::Memory => snapshot.memory.percent,
                rate_channel => {
                    let rate = match (&self.previous, elapsed_secs) {
                        (Some(prev), Some(elapsed)) => {
                            let delta = rate_channel.counter(snapshot) as f64
                                - rate_channel.counter(prev) as f64;
                            (delta / elapsed).max(0.0)
                        }
                        _ => self.last_rates[rate_channel.index()],
                    };
                    self.last_rates[rate_channel.index()] = rate;
                    rate
                }
            };

            let series = &mut self.series[channel.index()];
            if series.len() == self.capacity {
                series.pop_front();
            }
            series.push_back(HistoryPoint {
                timestamp_ms: snapshot.timestamp_ms,
                value,
            });
        }

        self.previous = Some(snapshot.clone());
    }

    pub fn points(&self, channel: Channel) -> &VecDeque<HistoryPoint> {
        &self.series[channel.index()]
    }

    /// Values only, oldest first.
    pub fn values(&self, channel: Channel) -> Vec<f64> {
        self.points(channel).iter().map(|p| p.value).collect()
    }

    pub fn latest(&self, channel: Channel) -> Option<HistoryPoint> {
        self.points(channel).back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiskCounters, MemoryUsage, NetworkCounters, ProcessCounts};

    fn sample(timestamp_ms: u64, cpu: f64, read_bytes: u64, bytes_recv: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp_ms,
            available: true,
            message: None,
            cpu_percent: cpu,
            memory: MemoryUsage {
                used: 4,
                total: 8,
                percent: 50.0,
            },
            disk: DiskCounters {
                read_bytes,
                write_bytes: 0,
            },
            network: NetworkCounters {
                bytes_sent: 0,
                bytes_recv,
            },
            temperatures: Vec::new(),
            processes: ProcessCounts::default(),
        }
    }

    #[test]
    fn test_capacity_rounds_up() {
        assert_eq!(capacity_for(60_000, 2_000), 30);
        assert_eq!(capacity_for(60_000, 7_000), 9);
        assert_eq!(capacity_for(500, 1_000), 1);
        assert_eq!(capacity_for(0, 1_000), 1);
    }

    #[test]
    fn test_first_rate_is_zero() {
        let mut history = MetricsHistory::new(10_000, 1_000);
        history.push(&sample(1_000, 10.0, 5_000, 9_000));

        assert_eq!(history.latest(Channel::DiskRead).unwrap().value, 0.0);
        assert_eq!(history.latest(Channel::Cpu).unwrap().value, 10.0);
    }

    #[test]
    fn test_rate_uses_snapshot_timestamps() {
        let mut history = MetricsHistory::new(10_000, 1_000);
        history.push(&sample(1_000, 10.0, 0, 0));
        history.push(&sample(3_000, 20.0, 4_000, 1_000));

        assert_eq!(history.latest(Channel::DiskRead).unwrap().value, 2_000.0);
        assert_eq!(history.latest(Channel::NetworkRecv).unwrap().value, 500.0);
    }

    #[test]
    fn test_counter_reset_is_clamped() {
        let mut history = MetricsHistory::new(10_000, 1_000);
        history.push(&sample(1_000, 0.0, 10_000, 0));
        history.push(&sample(2_000, 0.0, 100, 0));

        assert_eq!(history.latest(Channel::DiskRead).unwrap().value, 0.0);
    }

    #[test]
    fn test_non_advancing_timestamp_repeats_rate() {
        let mut history = MetricsHistory::new(10_000, 1_000);
        history.push(&sample(1_000, 0.0, 0, 0));
        history.push(&sample(2_000, 0.0, 3_000, 0));
        history.push(&sample(2_000, 0.0, 9_000, 0));

        assert_eq!(
            history.values(Channel::DiskRead),
            vec![0.0, 3_000.0, 3_000.0]
        );
    }

    #[test]
    fn test_bounded_and_resized() {
        let mut history = MetricsHistory::new(3_000, 1_000);
        for i in 0..5 {
            history.push(&sample(i * 1_000, i as f64, 0, 0));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.values(Channel::Cpu), vec![2.0, 3.0, 4.0]);

        history.resize(2_000, 1_000);
        assert_eq!(history.capacity(), 2);
        assert_eq!(history.values(Channel::Cpu), vec![3.0, 4.0]);

        history.resize(10_000, 1_000);
        assert_eq!(history.capacity(), 10);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_huge_window_allocates_lazily() {
        let mut history = MetricsHistory::new(u64::MAX / 2, 1_000);
        assert!(history.capacity() > 1_000_000_000);
        assert!(history.is_empty());

        history.push(&sample(1_000, 5.0, 0, 0));
        history.push(&sample(2_000, 6.0, 0, 0));
        assert_eq!(history.values(Channel::Cpu), vec![5.0, 6.0]);
    }
}
