// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Transcoder child process guard
//!
//! A `Transcoder` owns the child and its stdout. Dropping it kills the child
//! if it is still running, so every exit path of a stream session (normal
//! end, error, client disconnect) releases the process.

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Error, Result};

/// Capture backend for local devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

fn output_args(config: &StreamConfig) -> Vec<String> {
    vec![
        "-f".into(),
        "mjpeg".into(),
        "-q:v".into(),
        config.transcoder_quality.to_string(),
        "-r".into(),
        config.fps.to_string(),
        "-s".into(),
        format!("{}x{}", config.width, config.height),
        "-an".into(),
        "pipe:1".into(),
    ]
}

fn quiet_args() -> Vec<String> {
    vec!["-hide_banner".into(), "-loglevel".into(), "error".into()]
}

/// Arguments for pulling a network stream
pub fn network_args(url: &str, config: &StreamConfig) -> Vec<String> {
    let mut args = quiet_args();
    if url.starts_with("rtsp") {
        args.extend(["-rtsp_transport".into(), "tcp".into()]);
    }
    args.extend(["-i".into(), url.to_string()]);
    args.extend(output_args(config));
    args
}

/// Arguments for capturing a local device
pub fn local_args(platform: Platform, device: Option<&str>, config: &StreamConfig) -> Vec<String> {
    let mut args = quiet_args();
    match platform {
        Platform::Linux => args.extend([
            "-f".into(),
            "v4l2".into(),
            "-framerate".into(),
            config.fps.to_string(),
            "-video_size".into(),
            format!("{}x{}", config.width, config.height),
            "-i".into(),
            device.unwrap_or("/dev/video0").to_string(),
        ]),
        Platform::MacOs => args.extend([
            "-f".into(),
            "avfoundation".into(),
            // avfoundation only accepts rates the device advertises
            "-framerate".into(),
            "30".into(),
            "-i".into(),
            device.unwrap_or("0").to_string(),
        ]),
        Platform::Windows => args.extend([
            "-f".into(),
            "dshow".into(),
            "-i".into(),
            format!("video={}", device.unwrap_or("Integrated Camera")),
        ]),
    }
    args.extend(output_args(config));
    args
}

/// Running transcoder child
pub struct Transcoder {
    child: Child,
    stdout: ChildStdout,
    label: String,
    stderr_task: Option<JoinHandle<()>>,
}

impl Transcoder {
    pub fn spawn(program: &str, args: &[String], label: &str) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "stdout not captured"),
        })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let label = label.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[transcoder {}] {}", label, line);
                }
            })
        });

        info!("Spawned transcoder for {} (pid {:?})", label, child.id());

        Ok(Self {
            child,
            stdout,
            label: label.to_string(),
            stderr_task,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Read the next chunk of output; 0 means the child closed stdout
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf).await
    }

    /// Kill the child if it is still running and reap it
    pub async fn finish(mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status),
            _ => {
                let _ = self.child.start_kill();
                self.child.wait().await.ok()
            }
        }
    }
}

impl Drop for Transcoder {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            match self.child.start_kill() {
                Ok(()) => debug!("Killed transcoder for {}", self.label),
                Err(e) => warn!("Failed to kill transcoder for {}: {}", self.label, e),
            }
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
