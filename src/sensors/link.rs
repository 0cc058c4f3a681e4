// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Serial link lifecycle
//!
//! ```text
//! Searching ──found──> Connected ──closed──> Disconnected ──delay──> Searching
//!     │                                                                ^
//!     └──none found──> Simulating ──────────reconnect──────────────────┘
//! ```
//!
//! The link task is the only owner of the serial port. Simulation runs only
//! inside the `Simulating` phase, so it never overlaps a physical link.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decoder::decode;
use super::discovery::discover;
use super::simulator::SimulationSession;
use crate::config::{LinkConfig, SimulationConfig};
use crate::core::{AlertEngine, Hub, LinkStatus, LogLevel, Origin};
use crate::error::{Error, Result};

/// Longest line kept while waiting for a newline
const MAX_LINE: usize = 4096;

/// Requests handled by the link task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    /// Drop the current source and search for a device again
    Reconnect,
    /// Send the probe token to the device
    Test,
    /// Send the water-valve token to the device
    ActivateWater,
}

/// Cloneable handle for sending commands to the link task
#[derive(Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<LinkCommand>,
}

impl LinkHandle {
    pub async fn send(&self, command: LinkCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::LinkClosed)
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.send(LinkCommand::Reconnect).await
    }

    pub async fn test(&self) -> Result<()> {
        self.send(LinkCommand::Test).await
    }

    pub async fn activate_water(&self) -> Result<()> {
        self.send(LinkCommand::ActivateWater).await
    }

    /// Handle whose commands land in the returned receiver
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<LinkCommand>) {
        let (tx, rx) = mpsc::channel(32);
        (Self { tx }, rx)
    }
}

enum Phase {
    Searching,
    Connected(SerialSession),
    Disconnected(Option<String>),
    Simulating,
    Stopped,
}

enum ReaderEvent {
    Line(String),
    Error(String),
    Closed,
}

/// An open serial port with its reader thread
struct SerialSession {
    port_name: String,
    writer: Box<dyn SerialPort>,
    lines: mpsc::Receiver<ReaderEvent>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialSession {
    fn open(port_name: &str, config: &LinkConfig) -> Result<Self> {
        let port = serialport::new(port_name, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;
        let writer = port.try_clone()?;

        let (tx, lines) = mpsc::channel(256);
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = stop.clone();
        let reader = tokio::task::spawn_blocking(move || read_lines(port, tx, reader_stop));

        Ok(Self {
            port_name: port_name.to_string(),
            writer,
            lines,
            stop,
            reader: Some(reader),
        })
    }

    fn write_token(&mut self, token: &str) -> std::io::Result<()> {
        self.writer.write_all(token.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    /// Stop the reader and release both handles
    async fn close(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        debug!("Closed serial port {}", self.port_name);
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn read_lines(mut port: Box<dyn SerialPort>, tx: mpsc::Sender<ReaderEvent>, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; 256];
    let mut pending: Vec<u8> = Vec::with_capacity(MAX_LINE);

    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => {
                let _ = tx.blocking_send(ReaderEvent::Closed);
                return;
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = pending.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if !line.is_empty() && tx.blocking_send(ReaderEvent::Line(line)).is_err() {
                        return;
                    }
                }
                if pending.len() > MAX_LINE {
                    pending.clear();
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
            Err(e) => {
                let _ = tx.blocking_send(ReaderEvent::Error(e.to_string()));
                let _ = tx.blocking_send(ReaderEvent::Closed);
                return;
            }
        }
    }
}

/// Owns the serial link and the simulation fallback
pub struct LinkManager {
    config: LinkConfig,
    simulation: SimulationConfig,
    alert: AlertEngine,
    commands: mpsc::Receiver<LinkCommand>,
    start_simulating: bool,
}

impl LinkManager {
    pub fn new(
        config: LinkConfig,
        simulation: SimulationConfig,
        alert: AlertEngine,
        start_simulating: bool,
    ) -> (Self, LinkHandle) {
        let (tx, commands) = mpsc::channel(32);
        let manager = Self {
            config,
            simulation,
            alert,
            commands,
            start_simulating,
        };
        (manager, LinkHandle { tx })
    }

    fn hub(&self) -> &Hub {
        self.alert.hub()
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting link manager...");

        let mut phase = if self.start_simulating {
            Phase::Simulating
        } else {
            Phase::Searching
        };

        loop {
            phase = match phase {
                Phase::Searching => self.search(),
                Phase::Connected(session) => self.connected(session, &mut shutdown).await,
                Phase::Disconnected(port) => self.disconnected(port, &mut shutdown).await,
                Phase::Simulating => self.simulating(&mut shutdown).await,
                Phase::Stopped => break,
            };
        }

        self.hub().set_link(LinkStatus::disconnected(None));
        info!("Link manager stopped");
    }

    fn search(&mut self) -> Phase {
        self.hub().set_link(LinkStatus::searching());

        match discover(&self.config) {
            Ok(Some(port)) => match SerialSession::open(&port, &self.config) {
                Ok(session) => Phase::Connected(session),
                Err(e) => {
                    self.hub().log(LogLevel::Error, format!("Failed to open {}: {}", port, e));
                    Phase::Disconnected(Some(port))
                }
            },
            Ok(None) => {
                self.hub().log(LogLevel::Warning, "No sensor board found, switching to simulation");
                Phase::Simulating
            }
            Err(e) => {
                self.hub().log(LogLevel::Error, format!("Serial enumeration failed: {}", e));
                Phase::Simulating
            }
        }
    }

    async fn connected(&mut self, mut session: SerialSession, shutdown: &mut broadcast::Receiver<()>) -> Phase {
        let port = session.port_name.clone();
        self.hub().update(|state| {
            state.set_link(LinkStatus::connected(&port));
            state.log(
                LogLevel::Success,
                format!("Connected to sensor board on {} at {} baud", port, self.config.baud_rate),
            );
        });

        let handshake = tokio::time::sleep(self.config.handshake_delay());
        tokio::pin!(handshake);
        let mut handshake_sent = false;

        loop {
            tokio::select! {
                _ = &mut handshake, if !handshake_sent => {
                    handshake_sent = true;
                    if let Err(e) = session.write_token(&self.config.handshake_token) {
                        warn!("Handshake to {} failed: {}", port, e);
                    }
                }
                event = session.lines.recv() => match event {
                    Some(ReaderEvent::Line(line)) => match decode(&line) {
                        Some(sensors) => {
                            self.alert.ingest(sensors, Origin::Link);
                        }
                        None => debug!("Ignored line from {}: {:?}", port, line),
                    },
                    Some(ReaderEvent::Error(e)) => {
                        // Retry waits for the close that follows
                        self.hub().update(|state| {
                            state.set_link(LinkStatus::disconnected(Some(port.clone())));
                            state.log(LogLevel::Error, format!("Serial error on {}: {}", port, e));
                        });
                    }
                    Some(ReaderEvent::Closed) | None => {
                        session.close().await;
                        return Phase::Disconnected(Some(port));
                    }
                },
                command = self.commands.recv() => match command {
                    Some(LinkCommand::Reconnect) => {
                        session.close().await;
                        self.hub().log(LogLevel::Info, format!("Reconnect requested, released {}", port));
                        return Phase::Searching;
                    }
                    Some(command) => self.write_command(Some(&mut session), command),
                    None => {
                        session.close().await;
                        return Phase::Stopped;
                    }
                },
                _ = shutdown.recv() => {
                    session.close().await;
                    return Phase::Stopped;
                }
            }
        }
    }

    async fn disconnected(&mut self, port: Option<String>, shutdown: &mut broadcast::Receiver<()>) -> Phase {
        let delay = self.config.reconnect_delay();
        self.hub().update(|state| {
            state.set_link(LinkStatus::disconnected(port.clone()));
            state.log(
                LogLevel::Warning,
                format!("Sensor link down, retrying in {:?}", delay),
            );
        });

        let retry = tokio::time::sleep(delay);
        tokio::pin!(retry);

        loop {
            tokio::select! {
                _ = &mut retry => return Phase::Searching,
                command = self.commands.recv() => match command {
                    Some(LinkCommand::Reconnect) => return Phase::Searching,
                    Some(command) => self.write_command(None, command),
                    None => return Phase::Stopped,
                },
                _ = shutdown.recv() => return Phase::Stopped,
            }
        }
    }

    async fn simulating(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Phase {
        self.hub().update(|state| {
            state.set_link(LinkStatus::simulating());
            state.log(LogLevel::Info, "Simulation mode active");
        });

        let mut session = SimulationSession::start(&self.simulation, self.alert.clone());

        loop {
            tokio::select! {
                _ = session.step() => {}
                command = self.commands.recv() => match command {
                    Some(LinkCommand::Reconnect) => {
                        drop(session);
                        self.hub().log(LogLevel::Info, "Reconnect requested, leaving simulation");
                        return Phase::Searching;
                    }
                    Some(command) => self.write_command(None, command),
                    None => return Phase::Stopped,
                },
                _ = shutdown.recv() => return Phase::Stopped,
            }
        }
    }

    fn write_command(&self, session: Option<&mut SerialSession>, command: LinkCommand) {
        let token = match command {
            LinkCommand::Test => &self.config.test_token,
            LinkCommand::ActivateWater => &self.config.water_token,
            LinkCommand::Reconnect => return,
        };

        match (session, command) {
            (Some(session), _) => match session.write_token(token) {
                Ok(()) => {
                    if command == LinkCommand::Test {
                        self.hub().log(
                            LogLevel::Success,
                            format!("Link test sent to {}", session.port_name),
                        );
                    }
                }
                Err(e) => self.hub().log(
                    LogLevel::Error,
                    format!("Write to {} failed: {}", session.port_name, e),
                ),
            },
            (None, LinkCommand::Test) => {
                self.hub().log(LogLevel::Warning, "No physical link, readings are simulated");
            }
            (None, _) => debug!("No physical link for {:?}", command),
        }
    }
}
