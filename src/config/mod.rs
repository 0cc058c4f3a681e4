// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Skip device discovery and start in simulation
    pub simulate_only: bool,

    /// HTTP and websocket listeners
    pub server: ServerConfig,

    /// Serial link
    pub link: LinkConfig,

    /// Simulated sensor source
    pub simulation: SimulationConfig,

    /// Camera proxy
    pub stream: StreamConfig,

    /// Event log ring buffer
    pub log: LogConfig,

    /// Named cameras advertised by the camera listing
    pub cameras: Vec<CameraEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "EmberLink".to_string(),
            log_level: "info".to_string(),
            simulate_only: false,
            server: ServerConfig::default(),
            link: LinkConfig::default(),
            simulation: SimulationConfig::default(),
            stream: StreamConfig::default(),
            log: LogConfig::default(),
            cameras: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("emberlink"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    pub websocket_port: u16,
    /// Path the real-time channel is served on
    pub websocket_path: String,
    pub websocket_max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 3000,
            websocket_port: 8765,
            websocket_path: "/ws".to_string(),
            websocket_max_clients: 64,
        }
    }
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Explicit device path; bypasses discovery when set
    pub port: Option<String>,
    pub baud_rate: u32,
    /// USB vendor ids accepted during discovery
    pub allowed_vids: Vec<u16>,
    /// (vid, pid) pairs accepted during discovery
    pub allowed_products: Vec<(u16, u16)>,
    /// Lowercase manufacturer substrings accepted during discovery
    pub manufacturer_hints: Vec<String>,
    pub reconnect_delay_ms: u64,
    pub handshake_delay_ms: u64,
    pub handshake_token: String,
    pub test_token: String,
    pub water_token: String,
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            allowed_vids: vec![0x2341, 0x2A03, 0x1A86, 0x0403, 0x10C4],
            allowed_products: vec![(0x2341, 0x0043), (0x2341, 0x0001), (0x1A86, 0x7523)],
            manufacturer_hints: vec![
                "arduino".to_string(),
                "wch".to_string(),
                "ftdi".to_string(),
                "silicon labs".to_string(),
            ],
            reconnect_delay_ms: 5000,
            handshake_delay_ms: 2000,
            handshake_token: "STATUS".to_string(),
            test_token: "TEST".to_string(),
            water_token: "WATER_ON".to_string(),
            read_timeout_ms: 100,
        }
    }
}

impl LinkConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn handshake_delay(&self) -> Duration {
        Duration::from_millis(self.handshake_delay_ms)
    }
}

/// Simulated sensor source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_interval_ms: u64,
    /// Probability per tick of a simulated fire on one slot
    pub fire_probability: f64,
    /// Probability per tick and slot of a routine trip
    pub flip_probability: f64,
    pub clear_delay_ms: u64,
    /// Fixed RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3000,
            fire_probability: 0.05,
            flip_probability: 0.02,
            clear_delay_ms: 5000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn clear_delay(&self) -> Duration {
        Duration::from_millis(self.clear_delay_ms)
    }
}

/// Camera proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Transcoder executable
    pub transcoder: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Transcoder JPEG quality scale (2 = best, 31 = worst)
    pub transcoder_quality: u8,
    /// Quality of synthetic pictures (1-100)
    pub synthetic_quality: u8,
    pub probe_timeout_ms: u64,
    /// Hosts treated as reachable without probing
    pub always_reachable: Vec<String>,
    /// Path suffixes tried against push-style cameras, in order
    pub push_paths: Vec<String>,
    pub upstream_timeout_ms: u64,
    /// Local capture device override
    pub local_device: Option<String>,
    /// Largest picture the frame splitter will buffer
    pub max_frame_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            transcoder: "ffmpeg".to_string(),
            fps: 15,
            width: 640,
            height: 480,
            transcoder_quality: 5,
            synthetic_quality: 70,
            probe_timeout_ms: 3000,
            always_reachable: vec![
                "rtsp.stream".to_string(),
                "wowzaec2demo.streamlock.net".to_string(),
                "demo.unified-streaming.com".to_string(),
            ],
            push_paths: vec![
                "/video".to_string(),
                "/mjpeg".to_string(),
                "/videostream.cgi".to_string(),
                "/stream".to_string(),
                "/mjpg/video.mjpg".to_string(),
            ],
            upstream_timeout_ms: 3000,
            local_device: None,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}

impl StreamConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub capacity: usize,
    /// Entries replayed to a new subscriber
    pub bootstrap_tail: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            bootstrap_tail: 20,
        }
    }
}

/// A camera advertised by the listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraEntry {
    pub name: String,
    /// One of `rtsp`, `ipcam`, `local`, `simulated`
    pub kind: String,
    #[serde(default)]
    pub params: std::collections::BTreeMap<String, String>,
}
