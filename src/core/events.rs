// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Events published to real-time subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LinkStatus, Severity, SystemMetrics, SLOT_COUNT};

/// Severity of a user-facing log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// One entry of the event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
        }
    }
}

/// Outbound message, tagged by `type` on the wire
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Event {
    /// Bootstrap snapshot sent once to each new subscriber
    Connection {
        client_id: Uuid,
        link: LinkStatus,
        sensors: [u8; SLOT_COUNT],
        /// When the current reading was taken
        timestamp: DateTime<Utc>,
        metrics: SystemMetrics,
        logs: Vec<LogEntry>,
    },
    LinkStatus(LinkStatus),
    SensorUpdate {
        sensors: [u8; SLOT_COUNT],
        fire_detected: bool,
        simulated: bool,
        timestamp: DateTime<Utc>,
    },
    FireAlert {
        location: String,
        severity: Severity,
        sensors: [u8; SLOT_COUNT],
        metrics: SystemMetrics,
        simulated: bool,
        timestamp: DateTime<Utc>,
    },
    WaterActivated {
        metrics: SystemMetrics,
        simulated: bool,
        timestamp: DateTime<Utc>,
    },
    CameraUrl {
        camera_type: String,
        url: String,
    },
    LogEntry(LogEntry),
    MetricsUpdate {
        metrics: SystemMetrics,
    },
}

impl Event {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connection { .. } => "connection",
            Event::LinkStatus(_) => "link_status",
            Event::SensorUpdate { .. } => "sensor_update",
            Event::FireAlert { .. } => "fire_alert",
            Event::WaterActivated { .. } => "water_activated",
            Event::CameraUrl { .. } => "camera_url",
            Event::LogEntry(_) => "log_entry",
            Event::MetricsUpdate { .. } => "metrics_update",
        }
    }
}
