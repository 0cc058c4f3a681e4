//! Core state - readings, metrics, the event log and the broadcast hub

mod alert;
mod events;
mod hub;
mod log_buffer;

pub use alert::{evaluate, AlertEngine, Assessment, Origin, Severity};
pub use events::{Event, LogEntry, LogLevel};
pub use hub::{Hub, HubState, Outbound, SubscriberId, SubscriberRegistry};
pub use log_buffer::LogBuffer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of flame sensors on the device
pub const SLOT_COUNT: usize = 3;

/// Slot value for a tripped (flame present) sensor
pub const TRIPPED: u8 = 0;

/// Slot value for a clear sensor
pub const CLEAR: u8 = 1;

/// Canonical reading of the three flame sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensors: [u8; SLOT_COUNT],
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(sensors: [u8; SLOT_COUNT]) -> Self {
        Self {
            sensors,
            timestamp: Utc::now(),
        }
    }

    pub fn all_clear() -> Self {
        Self::new([CLEAR; SLOT_COUNT])
    }

    /// Indices of tripped slots, lowest first
    pub fn tripped(&self) -> impl Iterator<Item = usize> + '_ {
        self.sensors
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == TRIPPED)
            .map(|(i, _)| i)
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::all_clear()
    }
}

/// System-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub fire_detections: u64,
    pub water_activations: u64,
    pub media_files: u64,
    pub storage_used: u64,
    pub active_cameras: u64,
    /// Seconds since start, filled in at snapshot time
    pub uptime: u64,
}

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Searching,
    Connected,
    Disconnected,
    Simulating,
}

/// Link status as seen by subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub connected: bool,
    pub port: Option<String>,
    pub simulated: bool,
}

impl LinkStatus {
    pub fn searching() -> Self {
        Self {
            state: LinkState::Searching,
            connected: false,
            port: None,
            simulated: false,
        }
    }

    pub fn connected(port: &str) -> Self {
        Self {
            state: LinkState::Connected,
            connected: true,
            port: Some(port.to_string()),
            simulated: false,
        }
    }

    pub fn disconnected(port: Option<String>) -> Self {
        Self {
            state: LinkState::Disconnected,
            connected: false,
            port,
            simulated: false,
        }
    }

    pub fn simulating() -> Self {
        Self {
            state: LinkState::Simulating,
            connected: false,
            port: None,
            simulated: true,
        }
    }

    /// Short caption used on synthetic pictures
    pub fn caption(&self) -> &'static str {
        match self.state {
            LinkState::Searching => "LINK SEARCHING",
            LinkState::Connected => "LINK ONLINE",
            LinkState::Disconnected => "LINK DOWN",
            LinkState::Simulating => "SIMULATION",
        }
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::searching()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tripped_indices() {
        let reading = SensorReading::new([0, 1, 0]);
        assert_eq!(reading.tripped().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(SensorReading::all_clear().tripped().count(), 0);
    }

    #[test]
    fn test_metrics_serialize_camel_case() {
        let metrics = SystemMetrics {
            fire_detections: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["fireDetections"], 2);
        assert_eq!(json["activeCameras"], 0);
    }
}
