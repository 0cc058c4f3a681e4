// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Camera stream proxy
//!
//! Resolves a viewer request into one of four sources and hands back a byte
//! stream ready to be used as a response body. Each session owns everything it
//! started, so dropping the body (the viewer went away) kills any transcoder
//! child and releases the active-camera slot.

pub mod multipart;
pub mod probe;
pub mod push;
pub mod synthetic;
pub mod transcoder;

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{pin_mut, Stream, StreamExt};
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::core::{Hub, LogLevel};
use crate::error::{Error, Result};

pub use multipart::{JpegSplitter, BOUNDARY, CONTENT_TYPE};
pub use synthetic::SyntheticPattern;
pub use transcoder::{Platform, Transcoder};

const READ_CHUNK: usize = 64 * 1024;

/// Where a viewer's pictures come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    /// Streaming URL pulled through the transcoder
    Network {
        url: String,
        username: Option<String>,
        password: Option<String>,
    },
    /// Capture device on this host
    Local { device: Option<String> },
    /// HTTP camera that serves its own multipart stream
    Push {
        ip: String,
        port: u16,
        path: Option<String>,
    },
    /// Generated test pattern
    Synthetic { caption: Option<String> },
}

/// How a session's bytes are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Transcoded,
    Passthrough,
    Synthetic,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Transcoded => "transcoded",
            Delivery::Passthrough => "passthrough",
            Delivery::Synthetic => "synthetic",
        }
    }
}

/// A ready stream session
pub struct ProxyResponse {
    pub content_type: String,
    pub body: BoxStream<'static, io::Result<Bytes>>,
    pub delivery: Delivery,
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("content_type", &self.content_type)
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

/// Holds one active-camera slot for the life of a session
pub struct SessionGuard {
    hub: Hub,
}

impl SessionGuard {
    pub fn new(hub: Hub) -> Self {
        hub.adjust_active_cameras(1);
        Self { hub }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.hub.adjust_active_cameras(-1);
    }
}

/// Keep `guard` alive exactly as long as the body is
fn guarded<S>(inner: S, guard: SessionGuard) -> BoxStream<'static, io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    stream! {
        let _guard = guard;
        pin_mut!(inner);
        while let Some(item) = inner.next().await {
            yield item;
        }
    }
    .boxed()
}

/// Endless synthetic pictures captioned with the current link status
pub(crate) fn synthetic_frames(
    pattern: SyntheticPattern,
    hub: Hub,
    interval: Duration,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream! {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut frame: u64 = 0;
        loop {
            ticker.tick().await;
            let status = hub.link_status().caption();
            match pattern.render(frame, status) {
                Ok(jpeg) => yield Ok(multipart::part(&jpeg)),
                Err(e) => {
                    warn!("Synthetic picture failed: {}", e);
                    yield Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
                    break;
                }
            }
            frame += 1;
        }
    }
}

/// Multipart parts cut from a transcoder's output until it closes stdout
pub(crate) fn transcoded_frames(
    mut transcoder: Transcoder,
    max_frame: usize,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream! {
        let mut splitter = JpegSplitter::new(max_frame);
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match transcoder.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    for picture in splitter.push(&buf[..n]) {
                        yield Ok(multipart::part(&picture));
                    }
                }
                Err(e) => {
                    warn!("Transcoder read failed: {}", e);
                    break;
                }
            }
        }
        let status = transcoder.finish().await;
        debug!("Transcoder exited with {:?}", status);
    }
}

/// Kinds accepted by the camera connect command and endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKind {
    Rtsp,
    IpCam,
    Local,
    Simulated,
}

impl CameraKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "rtsp" | "network" | "stream" => Some(CameraKind::Rtsp),
            "ipcam" | "ip" | "phone" => Some(CameraKind::IpCam),
            "local" | "webcam" | "usb" => Some(CameraKind::Local),
            "simulated" | "simulation" | "demo" => Some(CameraKind::Simulated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraKind::Rtsp => "rtsp",
            CameraKind::IpCam => "ipcam",
            CameraKind::Local => "local",
            CameraKind::Simulated => "simulated",
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            CameraKind::Rtsp => "/api/camera/stream",
            CameraKind::IpCam => "/api/camera/ipcam",
            CameraKind::Local => "/api/camera/local",
            CameraKind::Simulated => "/api/camera/simulated",
        }
    }

    fn query_keys(&self) -> &'static [&'static str] {
        match self {
            CameraKind::Rtsp => &["url", "username", "password"],
            CameraKind::IpCam => &["ip", "port", "path"],
            CameraKind::Local => &["device"],
            CameraKind::Simulated => &["label"],
        }
    }
}

/// Relative URL a viewer fetches to watch a camera of `kind`
pub fn stream_url(kind: CameraKind, params: &BTreeMap<String, String>) -> Result<String> {
    let required = match kind {
        CameraKind::Rtsp => Some("url"),
        CameraKind::IpCam => Some("ip"),
        _ => None,
    };
    if let Some(key) = required {
        if params.get(key).map_or(true, |v| v.trim().is_empty()) {
            return Err(Error::InvalidSource(format!(
                "{} camera needs a '{}' parameter",
                kind.as_str(),
                key
            )));
        }
    }

    let base = format!("http://localhost{}", kind.endpoint());
    let mut url = Url::parse(&base).map_err(|e| Error::InvalidSource(e.to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        for key in kind.query_keys() {
            if let Some(value) = params.get(*key).filter(|v| !v.is_empty()) {
                query.append_pair(key, value);
            }
        }
    }

    Ok(match url.query() {
        Some(q) if !q.is_empty() => format!("{}?{}", url.path(), q),
        _ => url.path().to_string(),
    })
}

/// Opens stream sessions
#[derive(Clone)]
pub struct StreamProxy {
    config: Arc<StreamConfig>,
    hub: Hub,
    client: Client,
}

impl StreamProxy {
    pub fn new(config: StreamConfig, hub: Hub) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.upstream_timeout())
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            hub,
            client,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start a session for `source`. Only a malformed source is an error;
    /// unreachable or failing cameras fall back to the synthetic pattern.
    pub async fn open(&self, source: CameraSource) -> Result<ProxyResponse> {
        match source {
            CameraSource::Network {
                url,
                username,
                password,
            } => self.open_network(&url, username.as_deref(), password.as_deref()).await,
            CameraSource::Local { device } => Ok(self.open_local(device.as_deref())),
            CameraSource::Push { ip, port, path } => Ok(self.open_push(&ip, port, path.as_deref()).await),
            CameraSource::Synthetic { caption } => {
                let caption = caption.unwrap_or_else(|| "SIMULATED CAMERA".to_string());
                info!("Serving simulated camera '{}'", caption);
                Ok(self.synthetic(&caption))
            }
        }
    }

    fn pattern(&self, caption: &str) -> SyntheticPattern {
        SyntheticPattern::new(
            self.config.width,
            self.config.height,
            self.config.synthetic_quality,
            caption,
        )
    }

    fn synthetic(&self, caption: &str) -> ProxyResponse {
        let frames = synthetic_frames(self.pattern(caption), self.hub.clone(), self.config.frame_interval());
        ProxyResponse {
            content_type: CONTENT_TYPE.to_string(),
            body: guarded(frames, SessionGuard::new(self.hub.clone())),
            delivery: Delivery::Synthetic,
        }
    }

    async fn open_network(
        &self,
        raw: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<ProxyResponse> {
        let mut url =
            Url::parse(raw.trim()).map_err(|e| Error::InvalidSource(format!("{}: {}", raw, e)))?;
        let (host, port) = probe::target_of(&url)
            .ok_or_else(|| Error::InvalidSource(format!("{}: no host or port", raw)))?;

        if let Some(user) = username.filter(|u| !u.is_empty()) {
            url.set_username(user)
                .map_err(|_| Error::InvalidSource(format!("{}: cannot carry credentials", raw)))?;
            url.set_password(password.filter(|p| !p.is_empty()))
                .map_err(|_| Error::InvalidSource(format!("{}: cannot carry credentials", raw)))?;
        }

        let target = format!("{}:{}", host, port);
        let reachable = probe::is_always_reachable(&host, &self.config.always_reachable)
            || probe::probe(&host, port, self.config.probe_timeout()).await;
        if !reachable {
            self.hub.log(
                LogLevel::Warning,
                format!("Camera {} unreachable, serving synthetic feed", target),
            );
            return Ok(self.synthetic(&format!("OFFLINE {}", target)));
        }

        let args = transcoder::network_args(url.as_str(), &self.config);
        match Transcoder::spawn(&self.config.transcoder, &args, &target) {
            Ok(transcoder) => {
                self.hub
                    .log(LogLevel::Info, format!("Streaming camera {}", target));
                let guard = SessionGuard::new(self.hub.clone());
                Ok(ProxyResponse {
                    content_type: CONTENT_TYPE.to_string(),
                    body: guarded(transcoded_frames(transcoder, self.config.max_frame_bytes), guard),
                    delivery: Delivery::Transcoded,
                })
            }
            Err(e) => {
                self.hub
                    .log(LogLevel::Warning, format!("{}, serving synthetic feed", e));
                Ok(self.synthetic(&format!("OFFLINE {}", target)))
            }
        }
    }

    fn open_local(&self, device: Option<&str>) -> ProxyResponse {
        let device = device
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| self.config.local_device.clone());
        let args = transcoder::local_args(Platform::current(), device.as_deref(), &self.config);
        let label = device.unwrap_or_else(|| "default device".to_string());

        let transcoder = match Transcoder::spawn(&self.config.transcoder, &args, &label) {
            Ok(t) => Some(t),
            Err(e) => {
                self.hub
                    .log(LogLevel::Warning, format!("{}, serving synthetic feed", e));
                None
            }
        };
        let delivery = if transcoder.is_some() {
            Delivery::Transcoded
        } else {
            Delivery::Synthetic
        };

        let hub = self.hub.clone();
        let pattern = self.pattern("LOCAL CAMERA");
        let interval = self.config.frame_interval();
        let max_frame = self.config.max_frame_bytes;

        let frames = stream! {
            if let Some(transcoder) = transcoder {
                let live = transcoded_frames(transcoder, max_frame);
                pin_mut!(live);
                while let Some(item) = live.next().await {
                    yield item;
                }
                hub.log(
                    LogLevel::Warning,
                    format!("Local camera {} stopped, serving synthetic feed", label),
                );
            }
            let fallback = synthetic_frames(pattern, hub.clone(), interval);
            pin_mut!(fallback);
            while let Some(item) = fallback.next().await {
                yield item;
            }
        };

        ProxyResponse {
            content_type: CONTENT_TYPE.to_string(),
            body: guarded(frames, SessionGuard::new(self.hub.clone())),
            delivery,
        }
    }

    async fn open_push(&self, ip: &str, port: u16, path: Option<&str>) -> ProxyResponse {
        let opened = push::open_push(
            &self.client,
            ip,
            port,
            path,
            &self.config.push_paths,
            self.config.upstream_timeout(),
        )
        .await;

        match opened {
            Ok((url, response)) => {
                self.hub
                    .log(LogLevel::Info, format!("Relaying push camera {}", url));
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or(CONTENT_TYPE)
                    .to_string();
                let body = response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));

                ProxyResponse {
                    content_type,
                    body: guarded(body, SessionGuard::new(self.hub.clone())),
                    delivery: Delivery::Passthrough,
                }
            }
            Err(e) => {
                self.hub
                    .log(LogLevel::Warning, format!("{}, serving synthetic feed", e));
                self.synthetic(&format!("OFFLINE {}:{}", ip, port))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use std::time::Instant;

    fn proxy_with(config: StreamConfig) -> (StreamProxy, Hub) {
        let hub = Hub::new(&LogConfig::default());
        (StreamProxy::new(config, hub.clone()).unwrap(), hub)
    }

    fn fast_config() -> StreamConfig {
        StreamConfig {
            width: 160,
            height: 120,
            fps: 50,
            probe_timeout_ms: 500,
            upstream_timeout_ms: 500,
            ..StreamConfig::default()
        }
    }

    fn is_jpeg_part(part: &Bytes) -> bool {
        part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n")
    }

    #[test]
    fn test_stream_urls() {
        let mut params = BTreeMap::new();
        params.insert("url".to_string(), "rtsp://10.0.0.5/live".to_string());
        params.insert("ignored".to_string(), "x".to_string());
        assert_eq!(
            stream_url(CameraKind::Rtsp, &params).unwrap(),
            "/api/camera/stream?url=rtsp%3A%2F%2F10.0.0.5%2Flive"
        );

        assert_eq!(
            stream_url(CameraKind::Simulated, &BTreeMap::new()).unwrap(),
            "/api/camera/simulated"
        );

        assert!(matches!(
            stream_url(CameraKind::IpCam, &BTreeMap::new()),
            Err(Error::InvalidSource(_))
        ));
    }

    #[test]
    fn test_camera_kind_parse() {
        assert_eq!(CameraKind::parse("RTSP"), Some(CameraKind::Rtsp));
        assert_eq!(CameraKind::parse("ipcam"), Some(CameraKind::IpCam));
        assert_eq!(CameraKind::parse("thermal"), None);
    }

    #[tokio::test]
    async fn test_synthetic_session_counts_active_camera() {
        let (proxy, hub) = proxy_with(fast_config());

        let mut response = proxy
            .open(CameraSource::Synthetic { caption: None })
            .await
            .unwrap();
        assert_eq!(response.delivery, Delivery::Synthetic);
        assert_eq!(response.content_type, CONTENT_TYPE);
        assert_eq!(hub.metrics().active_cameras, 1);

        let part = response.body.next().await.unwrap().unwrap();
        assert!(is_jpeg_part(&part));

        drop(response);
        assert_eq!(hub.metrics().active_cameras, 0);
    }

    #[tokio::test]
    async fn test_invalid_network_url_is_error() {
        let (proxy, _hub) = proxy_with(fast_config());
        let result = proxy
            .open(CameraSource::Network {
                url: "not a url".to_string(),
                username: None,
                password: None,
            })
            .await;
        assert!(matches!(result, Err(Error::InvalidSource(_))));
    }

    #[tokio::test]
    async fn test_unreachable_network_camera_falls_back_within_timeout() {
        let (proxy, hub) = proxy_with(fast_config());
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let started = Instant::now();
        let mut response = proxy
            .open(CameraSource::Network {
                url: format!("rtsp://127.0.0.1:{}/live", port),
                username: None,
                password: None,
            })
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(response.delivery, Delivery::Synthetic);
        assert!(is_jpeg_part(&response.body.next().await.unwrap().unwrap()));
        assert!(hub
            .recent_logs(5)
            .iter()
            .any(|entry| entry.message.contains("unreachable")));
    }

    #[tokio::test]
    async fn test_unreachable_push_camera_falls_back() {
        let (proxy, _hub) = proxy_with(fast_config());
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let response = proxy
            .open(CameraSource::Push {
                ip: "127.0.0.1".to_string(),
                port,
                path: None,
            })
            .await
            .unwrap();
        assert_eq!(response.delivery, Delivery::Synthetic);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_body_kills_transcoder() {
        let (_proxy, hub) = proxy_with(fast_config());
        let transcoder = Transcoder::spawn("sleep", &["30".to_string()], "sleeper").unwrap();
        let pid = transcoder.id().unwrap();

        let body = guarded(
            transcoded_frames(transcoder, 1024),
            SessionGuard::new(hub.clone()),
        );
        assert_eq!(hub.metrics().active_cameras, 1);

        drop(body);
        assert_eq!(hub.metrics().active_cameras, 0);
        assert!(transcoder::tests::wait_gone(pid).await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_body_mid_stream_kills_transcoder() {
        let (_proxy, hub) = proxy_with(fast_config());
        let transcoder = Transcoder::spawn(
            "sh",
            &["-c".to_string(), "printf '\\377\\330a\\377\\331'; sleep 30".to_string()],
            "writer",
        )
        .unwrap();
        let pid = transcoder.id().unwrap();

        let mut body = guarded(
            transcoded_frames(transcoder, 1024),
            SessionGuard::new(hub.clone()),
        );
        assert!(body.next().await.unwrap().is_ok());

        drop(body);
        assert!(transcoder::tests::wait_gone(pid).await);
        assert_eq!(hub.metrics().active_cameras, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcoder_output_is_framed() {
        let transcoder = Transcoder::spawn(
            "sh",
            &["-c".to_string(), "printf '\\377\\330abc\\377\\331'".to_string()],
            "printer",
        )
        .unwrap();

        let parts: Vec<Bytes> = transcoded_frames(transcoder, 1024)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(parts.len(), 1);
        assert_eq!(
            &parts[0][..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 7\r\n\r\n\xFF\xD8abc\xFF\xD9\r\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_local_capture_falls_back_to_synthetic() {
        let config = StreamConfig {
            transcoder: "false".to_string(),
            ..fast_config()
        };
        let (proxy, hub) = proxy_with(config);

        let mut response = proxy.open(CameraSource::Local { device: None }).await.unwrap();
        assert_eq!(response.delivery, Delivery::Transcoded);

        let part = tokio::time::timeout(Duration::from_secs(5), response.body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(is_jpeg_part(&part));
        assert!(hub
            .recent_logs(5)
            .iter()
            .any(|entry| entry.message.contains("stopped")));
    }
}
