// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! WebSocket server for the real-time channel

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::Dispatcher;
use crate::config::ServerConfig;
use crate::core::{Hub, Outbound};

/// WebSocket server
pub struct WebSocketServer {
    bind_address: String,
    port: u16,
    path: String,
    max_clients: usize,
    hub: Hub,
    dispatcher: Dispatcher,
}

impl WebSocketServer {
    pub fn new(config: &ServerConfig, hub: Hub, dispatcher: Dispatcher) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.websocket_port,
            path: config.websocket_path.clone(),
            max_clients: config.websocket_max_clients,
            hub,
            dispatcher,
        }
    }

    /// Bind the listener and serve connections in a background task
    pub async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let listener = TcpListener::bind((self.bind_address.as_str(), self.port)).await?;
        let addr = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}{}", addr, self.path);

        tokio::spawn(accept_loop(
            listener,
            self.path.clone(),
            self.max_clients,
            self.hub.clone(),
            self.dispatcher.clone(),
            shutdown,
        ));

        Ok(addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    path: String,
    max_clients: usize,
    hub: Hub,
    dispatcher: Dispatcher,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        if hub.subscriber_count() >= max_clients {
                            warn!("Max clients reached, rejecting connection from {}", addr);
                            continue;
                        }

                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            path.clone(),
                            hub.clone(),
                            dispatcher.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("WebSocket server shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    path: String,
    hub: Hub,
    dispatcher: Dispatcher,
) {
    let check_path = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        if request.uri().path() == path {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws_stream = match accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (client_id, mut outbound) = hub.subscribe(Some(addr));
    info!("New WebSocket connection from {} (id: {})", addr, client_id);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming messages from client
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", addr, text);
                        dispatcher.handle_text(client_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            // Queued events for this subscriber
            msg = outbound.recv() => {
                match msg {
                    Some(Outbound::Text(json)) => {
                        if let Err(e) = ws_sender.send(Message::Text(json)).await {
                            warn!("Failed to send to {}: {}", addr, e);
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    hub.unsubscribe(&client_id);
    info!("WebSocket client {} disconnected", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use crate::core::{AlertEngine, LogLevel};
    use crate::sensors::LinkHandle;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    async fn server() -> (SocketAddr, Hub, broadcast::Sender<()>) {
        let hub = Hub::new(&LogConfig::default());
        let (link, _commands) = LinkHandle::detached();
        let dispatcher = Dispatcher::new(link, AlertEngine::new(hub.clone()));

        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            websocket_port: 0,
            websocket_max_clients: 2,
            ..ServerConfig::default()
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let addr = WebSocketServer::new(&config, hub.clone(), dispatcher)
            .start(shutdown_rx)
            .await
            .unwrap();
        (addr, hub, shutdown_tx)
    }

    async fn next_json<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_bootstrap_then_broadcast() {
        let (addr, hub, _shutdown) = server().await;
        let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

        let hello = next_json(&mut ws).await;
        assert_eq!(hello["type"], "connection");

        hub.log(LogLevel::Info, "hello subscribers");
        let entry = next_json(&mut ws).await;
        assert_eq!(entry["type"], "log_entry");
        assert_eq!(entry["message"], "hello subscribers");
    }

    #[tokio::test]
    async fn test_commands_reach_dispatcher() {
        let (addr, hub, _shutdown) = server().await;
        let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        next_json(&mut ws).await;

        ws.send(Message::Text(r#"{"command":"simulate_fire","sensor":3}"#.to_string()))
            .await
            .unwrap();

        loop {
            let event = next_json(&mut ws).await;
            if event["type"] == "fire_alert" {
                assert_eq!(event["location"], "Sensor 3 (D4)");
                break;
            }
        }
        assert_eq!(hub.reading().sensors, [1, 1, 0]);
    }

    #[tokio::test]
    async fn test_wrong_path_is_rejected() {
        let (addr, hub, _shutdown) = server().await;
        assert!(connect_async(format!("ws://{}/other", addr)).await.is_err());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_all_ends_connection() {
        let (addr, hub, _shutdown) = server().await;
        let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        next_json(&mut ws).await;

        hub.close_all();
        let end = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        })
        .await;
        assert!(end.is_ok());
    }
}
