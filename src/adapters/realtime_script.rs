use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::realtime::{
    RealtimeChannel, RealtimeConnection, RealtimeConnector, RealtimeError,
};
use crate::domain::realtime_event::{OutboundEvent, RealtimeMessage};

/// Simulates the charger side of a session from a JSON script.
///
/// ```json
/// {
///   "on_connect": [],
///   "reactions": {
///     "load_car_information": [{"ok": {"name": "car_information", "data": {"soc": 20}}}],
///     "start_session": [{"ok": {"name": "soc_update", "data": {"soc": 21}}}, {"error": "timeout"}]
///   }
/// }
/// ```
///
/// Publishing an event replays its reactions in order. An `error` step fails
/// the publish and skips the remaining steps.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptFile {
    #[serde(default)]
    on_connect: Vec<ScriptMessage>,
    #[serde(default)]
    reactions: HashMap<String, Vec<ScriptStep>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptMessage {
    name: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptStep {
    ok: Option<ScriptMessage>,
    error: Option<String>,
}

#[derive(Debug)]
pub struct ScriptedConnector {
    script: ScriptFile,
    connections: AtomicUsize,
    published: Arc<Mutex<Vec<OutboundEvent>>>,
}

#[derive(Debug)]
pub struct ScriptedChannel {
    script: ScriptFile,
    outbound: Option<Sender<RealtimeMessage>>,
    published: Arc<Mutex<Vec<OutboundEvent>>>,
}

impl ScriptedConnector {
    pub fn from_file(path: &str) -> Result<Self, RealtimeError> {
        let content = fs::read_to_string(path).map_err(RealtimeError::Io)?;
        let script: ScriptFile = serde_json::from_str(&content).map_err(RealtimeError::Json)?;
        Self::from_script(script)
    }

    pub fn from_value(value: Value) -> Result<Self, RealtimeError> {
        let script: ScriptFile = serde_json::from_value(value).map_err(RealtimeError::Json)?;
        Self::from_script(script)
    }

    fn from_script(script: ScriptFile) -> Result<Self, RealtimeError> {
        for (event, steps) in &script.reactions {
            if steps
                .iter()
                .any(|step| step.ok.is_some() == step.error.is_some())
            {
                return Err(RealtimeError::Script(format!(
                    "reaction step for {event} must contain exactly one of: ok or error"
                )));
            }
        }

        Ok(Self {
            script,
            connections: AtomicUsize::new(0),
            published: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> Vec<OutboundEvent> {
        self.published
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl RealtimeConnector for ScriptedConnector {
    type Channel = ScriptedChannel;

    fn connect(
        &self,
        _token: &str,
        channel_id: &str,
    ) -> Result<RealtimeConnection<ScriptedChannel>, RealtimeError> {
        self.connections.fetch_add(1, Ordering::Relaxed);

        let (sender, receiver) = mpsc::channel();
        for message in &self.script.on_connect {
            deliver(&sender, message)?;
        }

        tracing::info!(channel_id, "scripted realtime channel connected");

        let channel = ScriptedChannel {
            script: self.script.clone(),
            outbound: Some(sender),
            published: Arc::clone(&self.published),
        };
        Ok(RealtimeConnection::new(channel, receiver, channel_id))
    }
}

impl RealtimeChannel for ScriptedChannel {
    fn publish(&self, event: &OutboundEvent) -> Result<(), RealtimeError> {
        let sender = self.outbound.as_ref().ok_or(RealtimeError::Closed)?;

        if let Ok(mut published) = self.published.lock() {
            published.push(event.clone());
        }

        let Some(steps) = self.script.reactions.get(event.name()) else {
            return Ok(());
        };

        for step in steps {
            match (&step.ok, &step.error) {
                (Some(message), None) => deliver(sender, message)?,
                (None, Some(kind)) => return Err(map_script_error(kind)),
                _ => {
                    return Err(RealtimeError::Script(
                        "reaction step must contain exactly one of: ok or error".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    fn close(&mut self) {
        self.outbound = None;
    }
}

fn deliver(sender: &Sender<RealtimeMessage>, message: &ScriptMessage) -> Result<(), RealtimeError> {
    sender
        .send(RealtimeMessage::new(message.name.clone(), message.data.clone()))
        .map_err(|_| RealtimeError::Closed)
}

fn map_script_error(kind: &str) -> RealtimeError {
    let normalized = kind.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "timeout" => RealtimeError::Io(io::Error::new(io::ErrorKind::TimedOut, kind)),
        "network_unreachable" | "internet_down" => {
            RealtimeError::Io(io::Error::new(io::ErrorKind::NetworkUnreachable, kind))
        }
        "connection_refused" => {
            RealtimeError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, kind))
        }
        "unauthorized" | "token_expired" => RealtimeError::Status {
            status: 401,
            body: kind.to_string(),
        },
        "closed" => RealtimeError::Closed,
        _ => RealtimeError::Script(format!("unknown scripted error kind: {kind}")),
    }
}
