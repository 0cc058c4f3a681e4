//! Camera reachability probing

use std::time::Duration;

use reqwest::Url;
use tokio::net::TcpStream;
use tracing::debug;

/// Host and port a camera URL points at, with scheme default ports
pub fn target_of(url: &Url) -> Option<(String, u16)> {
    let host = url.host_str()?.to_string();
    let port = match url.port_or_known_default() {
        Some(port) => port,
        None => match url.scheme() {
            "rtsp" => 554,
            "rtsps" => 322,
            "rtmp" => 1935,
            "rtmps" => 443,
            _ => return None,
        },
    };
    Some((host, port))
}

/// Known public test streams, treated as reachable without probing
pub fn is_always_reachable(host: &str, known: &[String]) -> bool {
    known.iter().any(|k| {
        host.eq_ignore_ascii_case(k)
            || host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", k.to_ascii_lowercase()))
    })
}

/// Bounded TCP connect to `host:port`. Failure and timeout both read as
/// unreachable.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("Probe {}:{} failed: {}", host, port, e);
            false
        }
        Err(_) => {
            debug!("Probe {}:{} timed out after {:?}", host, port, timeout);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[test]
    fn test_default_ports() {
        let rtsp = Url::parse("rtsp://10.0.0.5/stream1").unwrap();
        assert_eq!(target_of(&rtsp), Some(("10.0.0.5".to_string(), 554)));

        let explicit = Url::parse("rtsp://cam.local:8554/live").unwrap();
        assert_eq!(target_of(&explicit), Some(("cam.local".to_string(), 8554)));

        let http = Url::parse("http://cam.local/video").unwrap();
        assert_eq!(target_of(&http), Some(("cam.local".to_string(), 80)));

        let odd = Url::parse("custom://cam.local/x").unwrap();
        assert_eq!(target_of(&odd), None);
    }

    #[test]
    fn test_known_hosts() {
        let known = vec!["rtsp.stream".to_string()];
        assert!(is_always_reachable("rtsp.stream", &known));
        assert!(is_always_reachable("RTSP.STREAM", &known));
        assert!(is_always_reachable("demo.rtsp.stream", &known));
        assert!(!is_always_reachable("notrtsp.stream", &known));
    }

    #[tokio::test]
    async fn test_listening_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable_within_timeout() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let started = Instant::now();
        assert!(!probe("127.0.0.1", port, Duration::from_millis(500)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    /// Listener whose accept queue is full, so new connects hang
    #[cfg(target_os = "linux")]
    async fn saturated_listener() -> (tokio::net::TcpListener, Vec<TcpStream>, u16) {
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut queued = Vec::new();
        for _ in 0..64 {
            let connect = TcpStream::connect(("127.0.0.1", port));
            match tokio::time::timeout(Duration::from_millis(200), connect).await {
                Ok(Ok(stream)) => queued.push(stream),
                Ok(Err(e)) => panic!("connect failed: {}", e),
                Err(_) => return (listener, queued, port),
            }
        }
        panic!("accept queue never filled");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_hanging_connect_times_out() {
        let (_listener, _queued, port) = saturated_listener().await;

        let timeout = Duration::from_millis(300);
        let started = Instant::now();
        assert!(!probe("127.0.0.1", port, timeout).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout, "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2));
    }
}
