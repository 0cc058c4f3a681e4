//! Push-style camera upstreams
//!
//! Phone and IP-webcam apps serve their own multipart stream over HTTP on one
//! of a handful of well-known paths.

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::debug;

use crate::error::{Error, Result};

/// Candidate paths in try order: the caller's path first, then the
/// configured suffixes, without duplicates
pub fn candidate_paths(path: Option<&str>, suffixes: &[String]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    let normalized = path
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| if p.starts_with('/') { p.to_string() } else { format!("/{}", p) });

    for candidate in normalized.into_iter().chain(suffixes.iter().cloned()) {
        if !paths.contains(&candidate) {
            paths.push(candidate);
        }
    }
    paths
}

/// Open the first candidate path that answers with a success status
pub async fn open_push(
    client: &Client,
    ip: &str,
    port: u16,
    path: Option<&str>,
    suffixes: &[String],
    timeout: Duration,
) -> Result<(String, Response)> {
    let mut last_reason = "no candidate paths".to_string();

    for candidate in candidate_paths(path, suffixes) {
        let url = format!("http://{}:{}{}", ip, port, candidate);
        // response headers must arrive within the timeout; the body may stream forever
        match tokio::time::timeout(timeout, client.get(&url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => {
                debug!("Push camera answered on {}", url);
                return Ok((url, response));
            }
            Ok(Ok(response)) => {
                last_reason = format!("{} returned {}", url, response.status());
            }
            Ok(Err(e)) => {
                last_reason = format!("{}: {}", url, e);
            }
            Err(_) => {
                last_reason = format!("{} timed out", url);
            }
        }
        debug!("Push candidate rejected: {}", last_reason);
    }

    Err(Error::Unreachable {
        target: format!("{}:{}", ip, port),
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_only(ok_path: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let response = if path == ok_path {
                        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=cam\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndata"
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        port
    }

    #[test]
    fn test_candidate_order() {
        let suffixes = vec!["/video".to_string(), "/mjpeg".to_string()];
        assert_eq!(candidate_paths(None, &suffixes), suffixes);
        assert_eq!(
            candidate_paths(Some("mjpeg"), &suffixes),
            vec!["/mjpeg".to_string(), "/video".to_string()]
        );
        assert_eq!(
            candidate_paths(Some("/cam"), &suffixes),
            vec!["/cam".to_string(), "/video".to_string(), "/mjpeg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_first_successful_path_wins() {
        let port = serve_only("/mjpeg").await;
        let suffixes = vec!["/video".to_string(), "/mjpeg".to_string()];
        let client = Client::new();

        let (url, response) = open_push(&client, "127.0.0.1", port, None, &suffixes, Duration::from_secs(2))
            .await
            .unwrap();

        assert!(url.ends_with("/mjpeg"));
        assert_eq!(
            response.headers()["content-type"],
            "multipart/x-mixed-replace; boundary=cam"
        );
    }

    #[tokio::test]
    async fn test_all_paths_failing_is_unreachable() {
        let port = serve_only("/nothing").await;
        let suffixes = vec!["/video".to_string()];
        let client = Client::new();

        let result = open_push(&client, "127.0.0.1", port, None, &suffixes, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Unreachable { .. })));
    }
}
