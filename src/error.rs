// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Error types

use thiserror::Error;

/// Errors raised by the link, proxy and hub layers
#[derive(Debug, Error)]
pub enum Error {
    /// Serial device could not be enumerated, opened or written
    #[error("serial link error: {0}")]
    Serial(#[from] serialport::Error),

    /// Transcoder child process could not be started
    #[error("failed to spawn transcoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Camera source could not be reached
    #[error("camera {target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    /// Upstream HTTP camera request failed
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Camera source description was invalid
    #[error("invalid camera source: {0}")]
    InvalidSource(String),

    /// The link task is gone
    #[error("link manager is not running")]
    LinkClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("picture encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;
