//! Fire alert decision logic
//!
//! Every reading is evaluated on its own. There is no suppression window:
//! two identical fire readings in a row raise two alerts.

use serde::{Deserialize, Serialize};

use super::{Event, Hub, HubState, LogLevel, SensorReading, SystemMetrics, SLOT_COUNT, TRIPPED};

/// Human-readable slot names, indexed by slot
pub const SLOT_LABELS: [&str; SLOT_COUNT] = ["Sensor 1 (D2)", "Sensor 2 (D3)", "Sensor 3 (D4)"];

/// Alert severity by number of tripped sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_tripped(count: usize) -> Self {
        match count {
            n if n >= SLOT_COUNT => Severity::Critical,
            2 => Severity::High,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Physical serial link
    Link,
    /// Simulation generator
    Simulation,
    /// Operator-triggered test
    Manual,
}

impl Origin {
    pub fn simulated(self) -> bool {
        !matches!(self, Origin::Link)
    }
}

/// Outcome of evaluating one reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub fire_detected: bool,
    pub tripped: Vec<usize>,
    pub location: Option<String>,
    pub severity: Option<Severity>,
}

/// Pure fire decision for one reading
pub fn evaluate(sensors: &[u8; SLOT_COUNT]) -> Assessment {
    let tripped: Vec<usize> = sensors
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == TRIPPED)
        .map(|(i, _)| i)
        .collect();

    if tripped.is_empty() {
        return Assessment {
            fire_detected: false,
            tripped,
            location: None,
            severity: None,
        };
    }

    let location = tripped
        .iter()
        .map(|i| SLOT_LABELS[*i])
        .collect::<Vec<_>>()
        .join(" & ");

    Assessment {
        fire_detected: true,
        severity: Some(Severity::from_tripped(tripped.len())),
        location: Some(location),
        tripped,
    }
}

/// Applies readings to the hub and raises alerts
#[derive(Clone)]
pub struct AlertEngine {
    hub: Hub,
}

impl AlertEngine {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Replace the current reading and publish the result
    pub fn ingest(&self, sensors: [u8; SLOT_COUNT], origin: Origin) -> Assessment {
        self.hub.update(|state| apply(state, sensors, origin))
    }

    /// Set one slot of the current reading, keeping the others
    pub fn set_slot(&self, slot: usize, value: u8, origin: Origin) -> Assessment {
        self.hub.update(|state| {
            let mut sensors = state.reading.sensors;
            if let Some(v) = sensors.get_mut(slot) {
                *v = value;
            }
            apply(state, sensors, origin)
        })
    }

    /// Count a water activation and publish it along with the new metrics
    pub fn record_water_activation(&self, simulated: bool) -> SystemMetrics {
        self.hub.update(|state| {
            state.metrics.water_activations += 1;
            let metrics = state.metrics_snapshot();
            state.publish(&Event::WaterActivated {
                metrics,
                simulated,
                timestamp: chrono::Utc::now(),
            });
            state.publish_metrics();
            state.log(LogLevel::Success, "Water system activated");
            metrics
        })
    }
}

fn apply(state: &mut HubState, sensors: [u8; SLOT_COUNT], origin: Origin) -> Assessment {
    let reading = SensorReading::new(sensors);
    state.reading = reading;

    let assessment = evaluate(&sensors);
    let simulated = origin.simulated();

    state.publish(&Event::SensorUpdate {
        sensors,
        fire_detected: assessment.fire_detected,
        simulated,
        timestamp: reading.timestamp,
    });

    if let (Some(location), Some(severity)) = (&assessment.location, assessment.severity) {
        state.metrics.fire_detections += 1;
        let metrics = state.metrics_snapshot();
        state.publish(&Event::FireAlert {
            location: location.clone(),
            severity,
            sensors,
            metrics,
            simulated,
            timestamp: reading.timestamp,
        });
        let marker = if simulated { " [simulated]" } else { "" };
        state.log(
            LogLevel::Error,
            format!("FIRE DETECTED at {} ({}){}", location, severity, marker),
        );
    }

    assessment
}
