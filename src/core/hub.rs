// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Broadcast hub - shared state and subscriber fan-out
//!
//! Every mutation of the reading, metrics, log buffer, link status and
//! subscriber set happens under one lock, and events are published while
//! that lock is held. Each subscriber drains a single FIFO queue, so events
//! reach it in the order they were generated.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Event, LinkStatus, LogBuffer, LogEntry, LogLevel, SensorReading, SystemMetrics};
use crate::config::LogConfig;

/// Subscriber identifier, also sent to the client as its connection id
pub type SubscriberId = Uuid;

/// Per-subscriber queue depth before the subscriber is considered stalled
pub const SUBSCRIBER_QUEUE: usize = 256;

/// Message queued for a subscriber's connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

struct Subscriber {
    addr: Option<SocketAddr>,
    tx: mpsc::Sender<Outbound>,
}

/// Subscribers keyed by connection id
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<SubscriberId, Subscriber>,
}

impl SubscriberRegistry {
    fn insert(&mut self, id: SubscriberId, addr: Option<SocketAddr>, tx: mpsc::Sender<Outbound>) {
        self.subscribers.insert(id, Subscriber { addr, tx });
    }

    pub fn remove(&mut self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.subscribers.values().filter_map(|s| s.addr).collect()
    }

    /// Queue `text` for every subscriber, dropping those whose queue is
    /// closed or full. Returns the number of subscribers written to.
    fn broadcast(&mut self, text: &str) -> usize {
        let mut dead = Vec::new();

        for (id, subscriber) in &self.subscribers {
            if subscriber.tx.try_send(Outbound::Text(text.to_string())).is_err() {
                dead.push(*id);
            }
        }

        for id in &dead {
            self.subscribers.remove(id);
            debug!("Dropped subscriber {}", id);
        }

        self.subscribers.len()
    }

    fn send_to(&mut self, id: &SubscriberId, text: &str) -> bool {
        let delivered = match self.subscribers.get(id) {
            Some(subscriber) => subscriber.tx.try_send(Outbound::Text(text.to_string())).is_ok(),
            None => return false,
        };
        if !delivered {
            self.subscribers.remove(id);
        }
        delivered
    }

    fn close_all(&mut self) -> usize {
        let count = self.subscribers.len();
        for (_, subscriber) in self.subscribers.drain() {
            let _ = subscriber.tx.try_send(Outbound::Close);
        }
        count
    }
}

/// State guarded by the hub lock
pub struct HubState {
    pub reading: SensorReading,
    pub metrics: SystemMetrics,
    pub logs: LogBuffer,
    pub link: LinkStatus,
    pub subscribers: SubscriberRegistry,
    started: Instant,
    bootstrap_tail: usize,
}

impl HubState {
    fn new(config: &LogConfig) -> Self {
        Self {
            reading: SensorReading::all_clear(),
            metrics: SystemMetrics::default(),
            logs: LogBuffer::new(config.capacity),
            link: LinkStatus::default(),
            subscribers: SubscriberRegistry::default(),
            started: Instant::now(),
            bootstrap_tail: config.bootstrap_tail,
        }
    }

    /// Serialize once and write to every open subscriber
    pub fn publish(&mut self, event: &Event) -> usize {
        match serde_json::to_string(event) {
            Ok(text) => self.subscribers.broadcast(&text),
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                0
            }
        }
    }

    /// Write to a single subscriber
    pub fn send_to(&mut self, id: &SubscriberId, event: &Event) -> bool {
        match serde_json::to_string(event) {
            Ok(text) => self.subscribers.send_to(id, &text),
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                false
            }
        }
    }

    /// Metrics with uptime filled in
    pub fn metrics_snapshot(&self) -> SystemMetrics {
        SystemMetrics {
            uptime: self.started.elapsed().as_secs(),
            ..self.metrics
        }
    }

    /// Append to the event log and publish it
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        match level {
            LogLevel::Info | LogLevel::Success => info!("{}", entry.message),
            LogLevel::Warning => warn!("{}", entry.message),
            LogLevel::Error => error!("{}", entry.message),
        }
        self.logs.push(entry.clone());
        self.publish(&Event::LogEntry(entry));
    }

    pub fn set_link(&mut self, status: LinkStatus) {
        self.link = status.clone();
        self.publish(&Event::LinkStatus(status));
    }

    pub fn publish_metrics(&mut self) {
        let metrics = self.metrics_snapshot();
        self.publish(&Event::MetricsUpdate { metrics });
    }

    fn bootstrap(&self, client_id: SubscriberId) -> Event {
        Event::Connection {
            client_id,
            link: self.link.clone(),
            sensors: self.reading.sensors,
            timestamp: self.reading.timestamp,
            metrics: self.metrics_snapshot(),
            logs: self.logs.tail(self.bootstrap_tail),
        }
    }
}

/// Shared hub context
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Mutex<HubState>>,
}

impl Hub {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubState::new(config))),
        }
    }

    /// Run `f` with exclusive access to the hub state
    pub fn update<R>(&self, f: impl FnOnce(&mut HubState) -> R) -> R {
        let mut state = self.inner.lock();
        f(&mut state)
    }

    /// Register a subscriber. Its queue starts with the bootstrap snapshot,
    /// and registration is atomic with respect to publishes.
    pub fn subscribe(&self, addr: Option<SocketAddr>) -> (SubscriberId, mpsc::Receiver<Outbound>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);

        self.update(|state| {
            match serde_json::to_string(&state.bootstrap(id)) {
                Ok(text) => {
                    let _ = tx.try_send(Outbound::Text(text));
                }
                Err(e) => error!("Failed to serialize bootstrap for {}: {}", id, e),
            }
            state.subscribers.insert(id, addr, tx);
        });

        (id, rx)
    }

    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.update(|state| state.subscribers.remove(id))
    }

    pub fn publish(&self, event: &Event) -> usize {
        self.update(|state| state.publish(event))
    }

    pub fn send_to(&self, id: &SubscriberId, event: &Event) -> bool {
        self.update(|state| state.send_to(id, event))
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.update(|state| state.log(level, message));
    }

    pub fn set_link(&self, status: LinkStatus) {
        self.update(|state| state.set_link(status));
    }

    /// Adjust the active camera count and publish the new metrics
    pub fn adjust_active_cameras(&self, delta: i64) {
        self.update(|state| {
            state.metrics.active_cameras = state.metrics.active_cameras.saturating_add_signed(delta);
            state.publish_metrics();
        });
    }

    pub fn reading(&self) -> SensorReading {
        self.inner.lock().reading
    }

    pub fn metrics(&self) -> SystemMetrics {
        self.inner.lock().metrics_snapshot()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.inner.lock().link.clone()
    }

    pub fn recent_logs(&self, n: usize) -> Vec<LogEntry> {
        self.inner.lock().logs.tail(n)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn is_subscribed(&self, id: &SubscriberId) -> bool {
        self.inner.lock().subscribers.contains(id)
    }

    /// Close every subscriber channel
    pub fn close_all(&self) -> usize {
        self.update(|state| state.subscribers.close_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> Hub {
        Hub::new(&LogConfig::default())
    }

    fn text(msg: Option<Outbound>) -> serde_json::Value {
        match msg {
            Some(Outbound::Text(t)) => serde_json::from_str(&t).unwrap(),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_bootstrap_snapshot_first() {
        let hub = hub();
        for i in 0..30 {
            hub.log(LogLevel::Info, format!("line {}", i));
        }

        let (id, mut rx) = hub.subscribe(None);
        let snapshot = text(rx.try_recv().ok());

        assert_eq!(snapshot["type"], "connection");
        assert_eq!(snapshot["clientId"], id.to_string());
        assert_eq!(snapshot["logs"].as_array().unwrap().len(), 20);
        assert_eq!(snapshot["logs"][0]["message"], "line 10");
        assert_eq!(snapshot["sensors"], serde_json::json!([1, 1, 1]));
        assert!(snapshot["timestamp"].is_string());
        assert_eq!(snapshot["link"]["state"], "searching");
    }

    #[test]
    fn test_publish_reaches_all_subscribers_in_order() {
        let hub = hub();
        let (_a, mut rx_a) = hub.subscribe(None);
        let (_b, mut rx_b) = hub.subscribe(None);
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();

        hub.log(LogLevel::Info, "first");
        hub.log(LogLevel::Info, "second");

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(text(rx.try_recv().ok())["message"], "first");
            assert_eq!(text(rx.try_recv().ok())["message"], "second");
        }
    }

    #[test]
    fn test_closed_subscriber_removed_on_next_publish() {
        let hub = hub();
        let (gone, rx_gone) = hub.subscribe(None);
        let (kept, mut rx_kept) = hub.subscribe(None);
        drop(rx_gone);

        assert!(hub.is_subscribed(&gone));
        let delivered = hub.publish(&Event::MetricsUpdate { metrics: hub.metrics() });

        assert_eq!(delivered, 1);
        assert!(!hub.is_subscribed(&gone));
        assert!(hub.is_subscribed(&kept));
        rx_kept.try_recv().unwrap();
        assert_eq!(text(rx_kept.try_recv().ok())["type"], "metrics_update");
    }

    #[test]
    fn test_stalled_subscriber_is_dropped() {
        let hub = hub();
        let (id, _rx) = hub.subscribe(None);

        for _ in 0..SUBSCRIBER_QUEUE + 1 {
            hub.publish(&Event::MetricsUpdate { metrics: hub.metrics() });
        }

        assert!(!hub.is_subscribed(&id));
    }

    #[test]
    fn test_close_all_sends_close() {
        let hub = hub();
        let (_id, mut rx) = hub.subscribe(None);
        rx.try_recv().unwrap();

        assert_eq!(hub.close_all(), 1);
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Close));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_active_cameras_never_underflows() {
        let hub = hub();
        hub.adjust_active_cameras(1);
        hub.adjust_active_cameras(-1);
        hub.adjust_active_cameras(-1);
        assert_eq!(hub.metrics().active_cameras, 0);
    }
}
