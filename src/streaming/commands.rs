//! Inbound subscriber commands

use std::collections::BTreeMap;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::{AlertEngine, Event, Hub, LogLevel, Origin, SubscriberId, SLOT_COUNT, TRIPPED};
use crate::proxy::{stream_url, CameraKind};
use crate::sensors::LinkHandle;

/// A recognized command, tagged by its `command` field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    TestLink,
    Reconnect,
    SimulateFire {
        #[serde(default)]
        sensor: Option<Value>,
    },
    ActivateWater,
    ConnectCamera {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        params: BTreeMap<String, Value>,
    },
}

const KNOWN: [&str; 5] = [
    "test_link",
    "reconnect",
    "simulate_fire",
    "activate_water",
    "connect_camera",
];

/// Why an inbound message produced no command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    /// Not JSON, not an object, or a known command with bad fields
    Malformed(String),
    /// Well-formed but names a command we do not handle
    Unknown(String),
}

/// Parse one inbound message
pub fn parse(text: &str) -> Result<Command, Rejected> {
    let value: Value = serde_json::from_str(text).map_err(|e| Rejected::Malformed(e.to_string()))?;
    let name = value
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| Rejected::Malformed("missing 'command' field".to_string()))?
        .to_string();

    if !KNOWN.contains(&name.as_str()) {
        return Err(Rejected::Unknown(name));
    }
    serde_json::from_value(value).map_err(|e| Rejected::Malformed(format!("{}: {}", name, e)))
}

/// 1-based sensor number from a number or numeric string
fn sensor_slot(sensor: Option<&Value>) -> Option<usize> {
    let n = match sensor? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (1..=SLOT_COUNT as u64).contains(&n).then(|| n as usize - 1)
}

fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Executes subscriber commands against the link and alert engine
#[derive(Clone)]
pub struct Dispatcher {
    link: LinkHandle,
    alert: AlertEngine,
}

impl Dispatcher {
    pub fn new(link: LinkHandle, alert: AlertEngine) -> Self {
        Self { link, alert }
    }

    fn hub(&self) -> &Hub {
        self.alert.hub()
    }

    /// Handle one inbound text message from `client`. Never fails; problems
    /// are logged and the connection stays open.
    pub async fn handle_text(&self, client: SubscriberId, text: &str) {
        match parse(text) {
            Ok(command) => self.execute(client, command).await,
            Err(Rejected::Unknown(name)) => debug!("Ignoring unknown command '{}' from {}", name, client),
            Err(Rejected::Malformed(reason)) => {
                warn!("Malformed message from {}: {}", client, reason)
            }
        }
    }

    pub async fn execute(&self, client: SubscriberId, command: Command) {
        debug!("Command from {}: {:?}", client, command);

        match command {
            Command::TestLink => {
                if let Err(e) = self.link.test().await {
                    self.hub().log(LogLevel::Error, format!("Link test failed: {}", e));
                }
            }
            Command::Reconnect => {
                self.hub().log(LogLevel::Info, "Reconnect requested");
                if let Err(e) = self.link.reconnect().await {
                    self.hub().log(LogLevel::Error, format!("Reconnect failed: {}", e));
                }
            }
            Command::SimulateFire { sensor } => {
                let slot = sensor_slot(sensor.as_ref())
                    .unwrap_or_else(|| rand::thread_rng().gen_range(0..SLOT_COUNT));
                self.hub().log(
                    LogLevel::Warning,
                    format!("Simulated fire triggered on sensor {}", slot + 1),
                );
                self.alert.set_slot(slot, TRIPPED, Origin::Manual);
            }
            Command::ActivateWater => {
                let simulated = !self.hub().link_status().connected;
                self.alert.record_water_activation(simulated);
                if let Err(e) = self.link.activate_water().await {
                    warn!("Water command not delivered: {}", e);
                }
            }
            Command::ConnectCamera { kind, params } => {
                let params: BTreeMap<String, String> =
                    params.iter().map(|(k, v)| (k.clone(), param_string(v))).collect();

                let resolved = CameraKind::parse(&kind)
                    .ok_or_else(|| format!("Unknown camera type '{}'", kind))
                    .and_then(|k| {
                        stream_url(k, &params)
                            .map(|url| (k, url))
                            .map_err(|e| e.to_string())
                    });

                match resolved {
                    Ok((kind, url)) => {
                        self.hub().send_to(
                            &client,
                            &Event::CameraUrl {
                                camera_type: kind.as_str().to_string(),
                                url,
                            },
                        );
                    }
                    Err(reason) => self.hub().log(LogLevel::Warning, reason),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use crate::core::Outbound;
    use crate::sensors::LinkCommand;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn dispatcher() -> (Dispatcher, Hub, mpsc::Receiver<LinkCommand>) {
        let hub = Hub::new(&LogConfig::default());
        let (link, rx) = LinkHandle::detached();
        (Dispatcher::new(link, AlertEngine::new(hub.clone())), hub, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(Outbound::Text(text)) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(r#"{"command":"test_link"}"#), Ok(Command::TestLink));
        assert_eq!(
            parse(r#"{"command":"simulate_fire","sensor":2}"#),
            Ok(Command::SimulateFire {
                sensor: Some(Value::from(2))
            })
        );
        assert!(matches!(
            parse(r#"{"command":"connect_camera","type":"rtsp","params":{"url":"rtsp://x/y"}}"#),
            Ok(Command::ConnectCamera { .. })
        ));
        assert_eq!(
            parse(r#"{"command":"self_destruct"}"#),
            Err(Rejected::Unknown("self_destruct".to_string()))
        );
        assert!(matches!(parse("{not json"), Err(Rejected::Malformed(_))));
        assert!(matches!(parse(r#"{"sensor":1}"#), Err(Rejected::Malformed(_))));
    }

    #[test]
    fn test_sensor_slot() {
        assert_eq!(sensor_slot(Some(&Value::from(1))), Some(0));
        assert_eq!(sensor_slot(Some(&Value::from("3"))), Some(2));
        assert_eq!(sensor_slot(Some(&Value::from(0))), None);
        assert_eq!(sensor_slot(Some(&Value::from(4))), None);
        assert_eq!(sensor_slot(None), None);
    }

    #[tokio::test]
    async fn test_simulate_fire_trips_requested_sensor() {
        let (dispatcher, hub, _link) = dispatcher();
        let (id, mut rx) = hub.subscribe(None);

        dispatcher
            .handle_text(id, r#"{"command":"simulate_fire","sensor":2}"#)
            .await;

        assert_eq!(hub.reading().sensors, [1, 0, 1]);
        assert_eq!(hub.metrics().fire_detections, 1);

        let events = drain(&mut rx);
        let alert = events.iter().find(|e| e["type"] == "fire_alert").unwrap();
        assert_eq!(alert["simulated"], true);
    }

    #[tokio::test]
    async fn test_simulate_fire_without_sensor_picks_one() {
        let (dispatcher, hub, _link) = dispatcher();
        dispatcher
            .execute(Uuid::nil(), Command::SimulateFire { sensor: None })
            .await;
        assert_eq!(hub.reading().tripped().count(), 1);
    }

    #[tokio::test]
    async fn test_activate_water_counts_and_forwards() {
        let (dispatcher, hub, mut link) = dispatcher();
        let (id, mut rx) = hub.subscribe(None);

        dispatcher.handle_text(id, r#"{"command":"activate_water"}"#).await;

        assert_eq!(hub.metrics().water_activations, 1);
        assert_eq!(link.try_recv().ok(), Some(LinkCommand::ActivateWater));
        let events = drain(&mut rx);
        let water = events.iter().find(|e| e["type"] == "water_activated").unwrap();
        assert_eq!(water["simulated"], true);
        assert_eq!(water["metrics"]["waterActivations"], 1);
    }

    #[tokio::test]
    async fn test_link_commands_are_forwarded() {
        let (dispatcher, _hub, mut link) = dispatcher();
        dispatcher.handle_text(Uuid::nil(), r#"{"command":"test_link"}"#).await;
        dispatcher.handle_text(Uuid::nil(), r#"{"command":"reconnect"}"#).await;

        assert_eq!(link.try_recv().ok(), Some(LinkCommand::Test));
        assert_eq!(link.try_recv().ok(), Some(LinkCommand::Reconnect));
    }

    #[tokio::test]
    async fn test_connect_camera_answers_requester_only() {
        let (dispatcher, hub, _link) = dispatcher();
        let (asker, mut asker_rx) = hub.subscribe(None);
        let (_other, mut other_rx) = hub.subscribe(None);
        drain(&mut asker_rx);
        drain(&mut other_rx);

        dispatcher
            .handle_text(
                asker,
                r#"{"command":"connect_camera","type":"ipcam","params":{"ip":"192.168.1.20","port":8080}}"#,
            )
            .await;

        let events = drain(&mut asker_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "camera_url");
        assert_eq!(events[0]["cameraType"], "ipcam");
        assert_eq!(events[0]["url"], "/api/camera/ipcam?ip=192.168.1.20&port=8080");
        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_camera_type_logs() {
        let (dispatcher, hub, _link) = dispatcher();
        dispatcher
            .handle_text(
                Uuid::nil(),
                r#"{"command":"connect_camera","type":"thermal"}"#,
            )
            .await;
        assert!(hub.recent_logs(1)[0].message.contains("Unknown camera type"));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_are_ignored() {
        let (dispatcher, hub, mut link) = dispatcher();
        dispatcher.handle_text(Uuid::nil(), r#"{"command":"dance"}"#).await;
        dispatcher.handle_text(Uuid::nil(), "][").await;

        assert!(link.try_recv().is_err());
        assert!(hub.recent_logs(10).is_empty());
    }

    #[tokio::test]
    async fn test_dead_link_is_reported() {
        let (link, rx) = LinkHandle::detached();
        drop(rx);
        let hub = Hub::new(&LogConfig::default());
        let dispatcher = Dispatcher::new(link, AlertEngine::new(hub.clone()));

        dispatcher.execute(Uuid::nil(), Command::TestLink).await;
        assert!(hub.recent_logs(1)[0].message.contains("Link test failed"));
    }

}
