// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! EmberLink - Fire-Sensor Serial Bridge
//!
//! Bridges a three-sensor flame detector board to dashboard clients:
//! - Serial link with USB discovery, handshake and automatic reconnect
//! - Tolerant line decoder for five firmware output formats
//! - Fire alerts, water activation and metrics fanned out over WebSocket
//! - Simulation source when no device is attached
//! - Camera proxy with transcoding, push-camera relay and synthetic fallback
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   lines   ┌─────────┐  readings  ┌─────────────┐
//! │ Link Manager │ ────────→ │ Decoder │ ─────────→ │ AlertEngine │
//! │  (Simulator) │           └─────────┘            └──────┬──────┘
//! └──────▲───────┘                                         ↓
//!        │ commands     ┌────────────┐  events    ┌───────────────┐
//!        └───────────── │ Dispatcher │ ←───────── │      Hub      │
//!                       └────────────┘  ────────→ │ (subscribers) │
//!                                                 └───────────────┘
//! ┌─────────────┐   ┌─────────────┐
//! │ HTTP (axum) │ → │ StreamProxy │ → transcoder / push camera / synthetic
//! └─────────────┘   └─────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod http;
pub mod proxy;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use config::Config;
pub use core::{AlertEngine, Event, Hub, SensorReading, SystemMetrics};
pub use error::{Error, Result};
pub use proxy::{CameraSource, StreamProxy};
pub use sensors::{decode, LinkHandle, LinkManager};
pub use streaming::{Dispatcher, WebSocketServer};

/// EmberLink version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// EmberLink name
pub const NAME: &str = "EmberLink";
